//! State persistence: the durable bridge and the command-driven store.

pub mod bridge;
pub mod store;

pub use bridge::{BridgeError, StateBridge};
pub use store::StateStore;
