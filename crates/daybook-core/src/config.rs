//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/daybook/config.toml)
//! 3. Environment variables (DAYBOOK_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "DAYBOOK";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Default freshness bound for cached reads, in milliseconds
    #[serde(default = "default_max_age_ms")]
    pub default_max_age_ms: u64,

    /// How long a saving-guard token stays valid, in milliseconds
    #[serde(default = "default_guard_window_ms")]
    pub guard_window_ms: u64,

    /// Scope whose objects are settings values rather than records
    #[serde(default = "default_settings_scope")]
    pub settings_scope: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_max_age_ms: default_max_age_ms(),
            guard_window_ms: default_guard_window_ms(),
            settings_scope: default_settings_scope(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (DAYBOOK_MAX_AGE_MS, DAYBOOK_GUARD_WINDOW_MS,
    ///    DAYBOOK_SETTINGS_SCOPE)
    /// 2. Config file (~/.config/daybook/config.toml or DAYBOOK_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_MAX_AGE_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.default_max_age_ms = ms;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_GUARD_WINDOW_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.guard_window_ms = ms;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_SETTINGS_SCOPE", ENV_PREFIX)) {
            if !val.is_empty() {
                self.settings_scope = val;
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with DAYBOOK_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daybook")
            .join("config.toml")
    }

    /// Default freshness bound as a duration
    pub fn default_max_age(&self) -> Duration {
        Duration::from_millis(self.default_max_age_ms)
    }

    /// Saving-guard window as a duration
    pub fn guard_window(&self) -> Duration {
        Duration::from_millis(self.guard_window_ms)
    }
}

fn default_max_age_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_guard_window_ms() -> u64 {
    1_500
}

fn default_settings_scope() -> String {
    "ai-config".to_string()
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
            let lock = ENV_MUTEX.lock().unwrap();
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
        "DAYBOOK_MAX_AGE_MS",
        "DAYBOOK_GUARD_WINDOW_MS",
        "DAYBOOK_SETTINGS_SCOPE",
    ];

    #[test]
    fn test_default_config() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config::default();
        assert_eq!(config.default_max_age(), Duration::from_secs(86_400));
        assert_eq!(config.guard_window(), Duration::from_millis(1_500));
        assert_eq!(config.settings_scope, "ai-config");
    }

    #[test]
    fn test_env_override_max_age() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("DAYBOOK_MAX_AGE_MS", "5000");
        config.apply_env_overrides();
        assert_eq!(config.default_max_age(), Duration::from_secs(5));

        // Unparseable values are ignored
        env::set_var("DAYBOOK_MAX_AGE_MS", "soon");
        config.apply_env_overrides();
        assert_eq!(config.default_max_age(), Duration::from_secs(5));
    }

    #[test]
    fn test_env_override_guard_window() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("DAYBOOK_GUARD_WINDOW_MS", "250");
        config.apply_env_overrides();
        assert_eq!(config.guard_window(), Duration::from_millis(250));
    }

    #[test]
    fn test_env_override_settings_scope() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("DAYBOOK_SETTINGS_SCOPE", "prefs");
        config.apply_env_overrides();
        assert_eq!(config.settings_scope, "prefs");

        // Empty value keeps the current scope
        env::set_var("DAYBOOK_SETTINGS_SCOPE", "");
        config.apply_env_overrides();
        assert_eq!(config.settings_scope, "prefs");
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            default_max_age_ms = 60000
            guard_window_ms = 100
            settings_scope = "prefs"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.default_max_age(), Duration::from_secs(60));
        assert_eq!(config.guard_window(), Duration::from_millis(100));
        assert_eq!(config.settings_scope, "prefs");
    }

    #[test]
    fn test_load_from_str_partial_uses_defaults() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config::load_from_str("guard_window_ms = 42").unwrap();
        assert_eq!(config.guard_window(), Duration::from_millis(42));
        assert_eq!(config.default_max_age(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_path_reads_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "default_max_age_ms = 1000").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.default_max_age(), Duration::from_secs(1));
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = Config {
            default_max_age_ms: 1000,
            guard_window_ms: 200,
            settings_scope: "prefs".to_string(),
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }
}
