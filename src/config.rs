//! Configuration for murmur paths and the remote service.
//!
//! Sources (highest priority first):
//! 1. Environment variables (MURMUR_HOME, MURMUR_API_URL, MURMUR_API_KEY)
//! 2. Config file ($MURMUR_HOME/config.yaml)
//! 3. Defaults (~/.murmur, bundled service settings)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::sync::transport::RetryPolicy;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

/// Resolved configuration with defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the murmur home (all durable state lives here)
    pub home: PathBuf,

    /// Remote service settings
    pub api: ApiSettings,

    /// Retry policy for outbound calls
    pub retry: RetryPolicy,

    /// Path to the config file, if one was found
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.murmur.dev".to_string(),
            api_key: None,
            model: "scribe-1".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Load and parse a config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".murmur");

    let home = std::env::var("MURMUR_HOME")
        .map(PathBuf::from)
        .unwrap_or(default_home);

    let config_path = home.join("config.yaml");
    let (file, config_file) = if config_path.exists() {
        (load_config_file(&config_path)?, Some(config_path))
    } else {
        (ConfigFile::default(), None)
    };

    let mut api = ApiSettings::default();
    if let Some(api_file) = file.api {
        if let Some(base_url) = api_file.base_url {
            api.base_url = base_url;
        }
        if let Some(api_key) = api_file.api_key {
            api.api_key = Some(api_key);
        }
        if let Some(model) = api_file.model {
            api.model = model;
        }
        if let Some(seconds) = api_file.request_timeout_seconds {
            api.request_timeout = Duration::from_secs(seconds);
        }
    }

    // Env vars override the file
    if let Ok(url) = std::env::var("MURMUR_API_URL") {
        api.base_url = url;
    }
    if let Ok(key) = std::env::var("MURMUR_API_KEY") {
        api.api_key = Some(key);
    }

    let mut retry = RetryPolicy::default();
    if let Some(retry_file) = file.retry {
        if let Some(max_attempts) = retry_file.max_attempts {
            retry.max_attempts = max_attempts;
        }
        if let Some(ms) = retry_file.base_delay_ms {
            retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = retry_file.max_delay_ms {
            retry.max_delay = Duration::from_millis(ms);
        }
    }

    Ok(ResolvedConfig {
        home,
        api,
        retry,
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the murmur home directory
pub fn murmur_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = load_config().unwrap();
        assert!(!config.api.base_url.is_empty());
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
api:
  base_url: https://scribe.internal.example
  model: scribe-2
retry:
  max_attempts: 5
  base_delay_ms: 500
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        let api = parsed.api.unwrap();
        assert_eq!(
            api.base_url.as_deref(),
            Some("https://scribe.internal.example")
        );
        assert_eq!(api.model.as_deref(), Some("scribe-2"));
        assert_eq!(parsed.retry.unwrap().max_attempts, Some(5));
    }

    #[test]
    fn test_empty_config_file_is_valid() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yaml");
        std::fs::write(&config_path, "{}").unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert!(parsed.api.is_none());
        assert!(parsed.retry.is_none());
    }
}
