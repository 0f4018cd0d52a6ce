//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/codereflect/config.toml)
//! 3. Environment variables (CODEREFLECT_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::framer::DEFAULT_MAX_SNAPSHOT_BYTES;

/// Environment variable prefix
const ENV_PREFIX: &str = "CODEREFLECT";

/// Default receiver port
pub const DEFAULT_PORT: u16 = 3030;

/// Default quiet period before a snapshot is sent
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// What the sender does after a snapshot fails to send
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteErrorPolicy {
    /// Report the failure and keep the connection open
    #[default]
    Report,
    /// Report the failure and close the connection
    Disconnect,
}

impl std::str::FromStr for WriteErrorPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "report" => Ok(WriteErrorPolicy::Report),
            "disconnect" => Ok(WriteErrorPolicy::Disconnect),
            other => anyhow::bail!(
                "Invalid write error policy '{}'. Use 'report' or 'disconnect'.",
                other
            ),
        }
    }
}

impl std::fmt::Display for WriteErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteErrorPolicy::Report => write!(f, "report"),
            WriteErrorPolicy::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port the receiver listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address the receiver binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Quiet period after the last edit before a snapshot is sent
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long the sender waits for the receiver to accept
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Largest snapshot the receiver accepts
    #[serde(default = "default_max_snapshot_bytes")]
    pub max_snapshot_bytes: usize,

    /// Sender behavior after a failed write
    #[serde(default)]
    pub write_error_policy: WriteErrorPolicy,

    /// Log file (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            debounce_ms: default_debounce_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_snapshot_bytes: default_max_snapshot_bytes(),
            write_error_policy: WriteErrorPolicy::default(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (CODEREFLECT_PORT, CODEREFLECT_BIND_ADDRESS, ...)
    /// 2. Config file (~/.config/codereflect/config.toml or CODEREFLECT_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // CODEREFLECT_PORT
        if let Ok(val) = std::env::var(format!("{}_PORT", ENV_PREFIX)) {
            self.port = val
                .parse()
                .with_context(|| format!("Invalid {}_PORT: '{}'", ENV_PREFIX, val))?;
        }

        // CODEREFLECT_BIND_ADDRESS
        if let Ok(val) = std::env::var(format!("{}_BIND_ADDRESS", ENV_PREFIX)) {
            if !val.is_empty() {
                self.bind_address = val;
            }
        }

        // CODEREFLECT_DEBOUNCE_MS
        if let Ok(val) = std::env::var(format!("{}_DEBOUNCE_MS", ENV_PREFIX)) {
            self.debounce_ms = val
                .parse()
                .with_context(|| format!("Invalid {}_DEBOUNCE_MS: '{}'", ENV_PREFIX, val))?;
        }

        // CODEREFLECT_WRITE_ERROR_POLICY
        if let Ok(val) = std::env::var(format!("{}_WRITE_ERROR_POLICY", ENV_PREFIX)) {
            self.write_error_policy = val.parse()?;
        }

        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with CODEREFLECT_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("codereflect")
            .join("config.toml")
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_max_snapshot_bytes() -> usize {
    DEFAULT_MAX_SNAPSHOT_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            // Clear all the vars
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "CODEREFLECT_PORT",
        "CODEREFLECT_BIND_ADDRESS",
        "CODEREFLECT_DEBOUNCE_MS",
        "CODEREFLECT_WRITE_ERROR_POLICY",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3030);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.write_error_policy, WriteErrorPolicy::Report);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_env_override_port() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("CODEREFLECT_PORT", "4040");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.port, 4040);

        env::set_var("CODEREFLECT_PORT", "not-a-port");
        assert!(config.apply_env_overrides().is_err());
    }

    #[test]
    fn test_env_override_bind_address() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("CODEREFLECT_BIND_ADDRESS", "127.0.0.1");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.bind_address, "127.0.0.1");

        // Empty string keeps the current value
        env::set_var("CODEREFLECT_BIND_ADDRESS", "");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.bind_address, "127.0.0.1");
    }

    #[test]
    fn test_env_override_debounce_and_policy() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("CODEREFLECT_DEBOUNCE_MS", "120");
        env::set_var("CODEREFLECT_WRITE_ERROR_POLICY", "Disconnect");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.debounce_ms, 120);
        assert_eq!(config.write_error_policy, WriteErrorPolicy::Disconnect);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "report".parse::<WriteErrorPolicy>().unwrap(),
            WriteErrorPolicy::Report
        );
        assert!("retry".parse::<WriteErrorPolicy>().is_err());
        assert_eq!(WriteErrorPolicy::Disconnect.to_string(), "disconnect");
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            port: 9000,
            bind_address: "127.0.0.1".to_string(),
            debounce_ms: 250,
            connect_timeout_ms: 1000,
            max_snapshot_bytes: 1024,
            write_error_policy: WriteErrorPolicy::Disconnect,
            log_file: None,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("port = 9000"));
        assert!(toml_str.contains("write_error_policy = \"disconnect\""));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.port, config.port);
        assert_eq!(parsed.bind_address, config.bind_address);
        assert_eq!(parsed.write_error_policy, config.write_error_policy);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            port = 8080
            debounce_ms = 100
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.debounce_ms, 100);
        // Unset keys fall back to defaults
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.max_snapshot_bytes, DEFAULT_MAX_SNAPSHOT_BYTES);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            port: 5050,
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_with_cli_override(Some(&path)).unwrap();
        assert_eq!(loaded.port, 5050);
    }
}
