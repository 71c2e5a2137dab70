//! Configuration management for codeloop.
//!
//! Loads configuration from ${CODELOOP_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod paths {
    //! Path resolution for codeloop configuration.
    //!
    //! CODELOOP_HOME resolution order:
    //! 1. CODELOOP_HOME environment variable (if set)
    //! 2. ~/.config/codeloop (default)

    use std::path::PathBuf;

    /// Returns the codeloop home directory.
    ///
    /// Checks CODELOOP_HOME env var first, falls back to ~/.config/codeloop
    pub fn codeloop_home() -> PathBuf {
        if let Ok(home) = std::env::var("CODELOOP_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map(|h| h.join(".config").join("codeloop"))
            .expect("Could not determine home directory")
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        codeloop_home().join("config.toml")
    }
}

/// Provider configuration entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Optional API key (overrides environment variable).
    pub api_key: Option<String>,
    /// Optional API base URL (for proxies or alternate compatible endpoints).
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Returns the effective API key if set and non-empty.
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns the effective base URL if set and non-empty.
    pub fn effective_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Provider configuration (credentials, base URLs).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openrouter: ProviderConfig,
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model identifier sent to the backend.
    pub model: String,

    /// File the WRITE action persists to and the RUN action executes.
    pub working_file: String,

    /// Interpreter used to execute the working file (resolved on PATH).
    pub interpreter: String,

    /// Timeout for running the working file in seconds (0 disables).
    pub run_timeout_secs: u64,

    /// Provider configuration (base URLs, API keys).
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Config {
    const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
    const DEFAULT_WORKING_FILE: &str = "tmp.py";
    const DEFAULT_INTERPRETER: &str = "python3";
    const DEFAULT_RUN_TIMEOUT_SECS: u64 = 10;

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        if self.run_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.run_timeout_secs))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: Self::DEFAULT_MODEL.to_string(),
            working_file: Self::DEFAULT_WORKING_FILE.to_string(),
            interpreter: Self::DEFAULT_INTERPRETER.to_string(),
            run_timeout_secs: Self::DEFAULT_RUN_TIMEOUT_SECS,
            providers: ProvidersConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.model, "google/gemini-2.5-flash");
        assert_eq!(config.working_file, "tmp.py");
        assert_eq!(config.interpreter, "python3");
        assert_eq!(config.run_timeout_secs, 10);
    }

    #[test]
    fn test_load_from_file_overrides() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "model = \"qwen/qwen3-coder\"\nworking_file = \"scratch.py\"\nrun_timeout_secs = 30\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.model, "qwen/qwen3-coder");
        assert_eq!(config.working_file, "scratch.py");
        assert_eq!(config.run_timeout_secs, 30);
        // Untouched fields keep defaults
        assert_eq!(config.interpreter, "python3");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "model = [not toml").unwrap();

        assert!(Config::load_from(&config_path).is_err());
    }

    /// Timeout: zero disables the run timeout.
    #[test]
    fn test_run_timeout_zero_disables() {
        let config = Config {
            run_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.run_timeout(), None);
    }

    /// Base URL: loaded from config file.
    #[test]
    fn test_openrouter_base_url_loaded_from_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[providers.openrouter]\nbase_url = \"https://my-proxy.example.com\"\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(
            config.providers.openrouter.effective_base_url(),
            Some("https://my-proxy.example.com")
        );
    }

    /// Base URL: empty/whitespace treated as unset.
    #[test]
    fn test_openrouter_base_url_empty_is_none() {
        let config = Config {
            providers: ProvidersConfig {
                openrouter: ProviderConfig {
                    base_url: Some("   ".to_string()),
                    ..Default::default()
                },
            },
            ..Default::default()
        };
        assert_eq!(config.providers.openrouter.effective_base_url(), None);
    }
}
