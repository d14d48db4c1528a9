use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// One of the four recognized log verbosity levels. `log-level` is
/// optional; its default of INFO is not itself a selectable value, so it is
/// represented as `None` rather than a fifth variant.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Critical,
    Error,
    Warn,
    Debug,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Critical | LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Debug => "debug",
        }
    }
}

/// Top-level configuration, loaded from a TOML file at boot.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OttoEngineConfig {
    pub rest_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    pub remote_token: String,
    pub remote_tls: bool,
    pub default_tz: String,
    pub rules_directory: PathBuf,
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    #[serde(default)]
    pub test_server_port: Option<u16>,
    /// The auxiliary event type resubscribed to alongside `state_changed`
    /// on every (re)connect.
    #[serde(default)]
    pub aux_event_type: Option<String>,
}

impl OttoEngineConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn log_filter(&self) -> &'static str {
        self.log_level.map_or("info", LogLevel::as_filter)
    }
}
