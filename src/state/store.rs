//! Command-driven application state store.
//!
//! All mutation goes through [`AppCommand`]; every applied command is
//! persisted through the bridge before control returns, so a restart
//! resumes from the last transition. The storage and sync layers never
//! depend on this store's shape; they exchange plain records.

use crate::domain::{AppCommand, PersistedAppState};

use super::bridge::{BridgeError, StateBridge};

pub struct StateStore {
    state: PersistedAppState,
    bridge: StateBridge,
}

impl StateStore {
    /// Hydrate from the durable snapshot (default state on first run)
    pub async fn load(bridge: StateBridge) -> Result<Self, BridgeError> {
        bridge.initialize().await?;
        let mut state = bridge.load_persisted_state().await?;

        // A recording can never survive a restart
        state.recording = false;

        Ok(Self { state, bridge })
    }

    pub fn state(&self) -> &PersistedAppState {
        &self.state
    }

    /// Apply a command and persist the resulting state
    pub async fn apply(&mut self, command: AppCommand) -> Result<&PersistedAppState, BridgeError> {
        self.state.apply(command);
        self.bridge.save_persisted_state(&self.state).await?;
        Ok(&self.state)
    }

    /// Reset to defaults and drop the durable record ("reset app" path)
    pub async fn reset(&mut self) -> Result<(), BridgeError> {
        self.state = PersistedAppState::default();
        self.bridge.clear_persisted_state().await
    }
}
