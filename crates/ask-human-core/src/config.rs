//! Configuration — JSON config file + env var overrides + CLI flags.
//!
//! Precedence per setting: flag > env > file > default. Only the timeout has
//! a default; tokens and channel must come from somewhere.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

pub const CONFIG_DIR_NAME: &str = "ask-human-cli";
pub const CONFIG_FILE_NAME: &str = "config.json";

pub const ENV_BOT_TOKEN: &str = "SLACK_BOT_TOKEN";
pub const ENV_APP_TOKEN: &str = "SLACK_APP_TOKEN";
pub const ENV_CHANNEL: &str = "ASK_HUMAN_CHANNEL";
pub const ENV_TIMEOUT: &str = "ASK_HUMAN_TIMEOUT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create config directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("could not determine the home directory")]
    NoHomeDir,

    /// A required setting has no value anywhere.
    #[error("{what} not found. Please {hint}")]
    Missing {
        what: &'static str,
        hint: &'static str,
    },

    #[error("invalid value for {name}: '{value}' (expected whole seconds)")]
    InvalidTimeout { name: String, value: String },

    /// Flags that contradict each other or are malformed.
    #[error("{0}")]
    InvalidRequest(String),
}

/// Persisted record. Empty strings and a zero timeout mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub slack_token: String,

    /// App-level token (`xapp-...`) for Socket Mode.
    #[serde(default)]
    pub app_token: String,

    #[serde(default)]
    pub default_channel: String,

    /// Seconds; 0 falls through to the built-in default.
    #[serde(default)]
    pub default_timeout: u64,
}

/// `~/.config/ask-human-cli/config.json`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".config").join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl Config {
    /// Load from `path`. A missing file is an empty config, not an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::ReadFile {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write pretty JSON, owner read/write only. Creates the directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let data = serde_json::to_string_pretty(self)?;
        write_private(path, data.as_bytes()).map_err(|source| ConfigError::WriteFile {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation; tighten a pre-existing file too.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(data)
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, data)
}

// ── Effective settings ──

/// Values given on the command line for this invocation.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub channel: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Everything an `ask` needs, resolved once and never mutated.
#[derive(Clone)]
pub struct Settings {
    pub bot_token: String,
    pub app_token: String,
    pub channel: String,
    pub timeout: Duration,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("bot_token", &"<redacted>")
            .field("app_token", &"<redacted>")
            .field("channel", &self.channel)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Settings {
    /// Resolve against the process environment.
    pub fn resolve(config: &Config, overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::resolve_with(config, overrides, |name| std::env::var(name).ok())
    }

    /// Resolve with an injected environment lookup.
    pub fn resolve_with<F>(config: &Config, overrides: &Overrides, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = non_empty(env(ENV_BOT_TOKEN))
            .or_else(|| non_empty(Some(config.slack_token.clone())))
            .ok_or(ConfigError::Missing {
                what: "Slack token",
                hint: "set SLACK_BOT_TOKEN or configure slack_token in ~/.config/ask-human-cli/config.json",
            })?;

        let app_token = non_empty(env(ENV_APP_TOKEN))
            .or_else(|| non_empty(Some(config.app_token.clone())))
            .ok_or(ConfigError::Missing {
                what: "App token",
                hint: "set SLACK_APP_TOKEN or configure app_token in ~/.config/ask-human-cli/config.json",
            })?;

        let channel = non_empty(overrides.channel.clone())
            .or_else(|| non_empty(env(ENV_CHANNEL)))
            .or_else(|| non_empty(Some(config.default_channel.clone())))
            .ok_or(ConfigError::Missing {
                what: "Channel",
                hint: "provide --channel or configure default_channel in ~/.config/ask-human-cli/config.json",
            })?;

        let env_timeout = match non_empty(env(ENV_TIMEOUT)) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| ConfigError::InvalidTimeout {
                name: ENV_TIMEOUT.to_string(),
                value: raw.clone(),
            })?),
            None => None,
        };

        let timeout_secs = [overrides.timeout_secs, env_timeout, Some(config.default_timeout)]
            .into_iter()
            .flatten()
            .find(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            bot_token,
            app_token,
            channel,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
