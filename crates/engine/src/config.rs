// Configuration for the fixup engine.
//
// Global config: `~/.fixup/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bound applied to every collaborator round trip unless configured otherwise.
pub const DEFAULT_TIMEOUT_MS: u64 = 3_000;

/// Root directory for fixup state: `~/.fixup/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".fixup"))
}

/// Path to the global config file: `~/.fixup/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Engine configuration at `~/.fixup/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct FixupConfig {
    /// Bounds on collaborator round trips.
    pub timeouts: TimeoutConfig,
    /// Session behavior.
    pub session: SessionConfig,
}

impl FixupConfig {
    /// Load from `~/.fixup/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to `~/.fixup/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = global_config_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_ms)
    }

    pub fn anchor_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.anchor_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.notify_ms)
    }
}

/// Millisecond bounds for each kind of collaborator call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Edit request (`editCommands/*`).
    pub request_ms: u64,
    /// Folding-range refinement of the selection.
    pub anchor_ms: u64,
    /// Accept/cancel/undo notifications.
    pub notify_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: DEFAULT_TIMEOUT_MS,
            anchor_ms: DEFAULT_TIMEOUT_MS,
            notify_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Create files that a workspace edit targets but that do not exist yet.
    pub create_missing_files: bool,
    /// Buffered session events per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { create_missing_files: true, event_capacity: 64 }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[source] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[source] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[source] toml::ser::Error),
}
