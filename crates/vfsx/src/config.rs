//! Bridge configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bridge::Mode;
use crate::error::ConfigError;

/// Well-known socket path of the decision process.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/vfsx-socket";

/// Environment variable overriding [`BridgeConfig::socket_path`].
pub const ENV_SOCKET: &str = "VFSX_SOCKET";
/// Environment variable overriding [`BridgeConfig::mode`].
pub const ENV_MODE: &str = "VFSX_MODE";
/// Environment variable overriding [`BridgeConfig::diagnostic_log`].
pub const ENV_LOG: &str = "VFSX_LOG";

/// Settings for one bridge instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Unix socket the decision process listens on
    pub socket_path: PathBuf,
    /// Whether operations are checked before or reported after they run
    pub mode: Mode,
    /// Append-only file receiving every encoded message
    pub diagnostic_log: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            mode: Mode::Gate,
            diagnostic_log: None,
        }
    }
}

impl BridgeConfig {
    /// Defaults for the given mode.
    pub fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Apply `VFSX_SOCKET`, `VFSX_MODE` and `VFSX_LOG` from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(socket) = lookup(ENV_SOCKET).filter(|s| !s.is_empty()) {
            self.socket_path = PathBuf::from(socket);
        }
        if let Some(mode) = lookup(ENV_MODE).filter(|s| !s.is_empty()) {
            self.mode = mode.parse()?;
        }
        if let Some(log) = lookup(ENV_LOG).filter(|s| !s.is_empty()) {
            self.diagnostic_log = Some(PathBuf::from(log));
        }
        Ok(self)
    }
}
