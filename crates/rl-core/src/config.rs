use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR: &str = ".redline";
pub const CONFIG_FILE: &str = "config.toml";

/// Runtime settings, resolved as defaults < config file < environment < CLI flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory for the review document, relative to the repository root.
    pub storage_dir: PathBuf,
    pub document_name: String,
    /// Explicit diff base. Falls back to the merge-base, then `HEAD`.
    pub diff_ref: Option<String>,
    pub token: Option<String>,
    pub fetch_timeout_secs: u64,
    pub watch_debounce_ms: u64,
    /// Frames buffered per viewer before it is considered too slow.
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4821,
            storage_dir: PathBuf::from(CONFIG_DIR),
            document_name: "review.json".to_string(),
            diff_ref: None,
            token: None,
            fetch_timeout_secs: 10,
            watch_debounce_ms: 100,
            channel_capacity: 64,
        }
    }
}

impl Config {
    /// Read `<root>/.redline/config.toml` if present, then apply `REDLINE_*` variables.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_DIR).join(CONFIG_FILE);
        let config = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };
        config.with_env_overrides()
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        toml::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.display().to_string(),
            message: err.to_string(),
        })
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(host) = lookup("REDLINE_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("REDLINE_PORT") {
            self.port = parse_number("REDLINE_PORT", &port)?;
        }
        if let Some(dir) = lookup("REDLINE_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(diff_ref) = lookup("REDLINE_REF") {
            self.diff_ref = Some(diff_ref);
        }
        if let Some(token) = lookup("REDLINE_TOKEN") {
            self.token = Some(token);
        }
        if let Some(secs) = lookup("REDLINE_FETCH_TIMEOUT_SECS") {
            self.fetch_timeout_secs = parse_number("REDLINE_FETCH_TIMEOUT_SECS", &secs)?;
        }
        Ok(self)
    }

    pub fn document_path(&self, root: &Path) -> PathBuf {
        root.join(&self.storage_dir).join(&self.document_name)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        })
}
