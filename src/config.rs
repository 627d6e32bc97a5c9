//! Configuration surface: selectors, groups, auto-save, and WAL settings,
//! loadable from a TOML file or environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrSource {
    Meta,
    Type,
    Raw,
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsyncPolicy {
    Always,
    Interval,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutosaveStrategy {
    Time,
    Count,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorsConfig {
    pub attr_resolution: Vec<AttrSource>,
    pub class_matches_type: bool,
}

impl Default for SelectorsConfig {
    fn default() -> Self {
        Self {
            attr_resolution: vec![AttrSource::Meta, AttrSource::Type, AttrSource::Raw, AttrSource::Child],
            class_matches_type: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupsConfig {
    pub reactive_default: bool,
    pub debounce_ms: u64,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self { reactive_default: true, debounce_ms: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub batch_size: usize,
    pub strategy: AutosaveStrategy,
    pub count_threshold: usize,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
            batch_size: 64,
            strategy: AutosaveStrategy::Hybrid,
            count_threshold: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    pub fsync_policy: FsyncPolicy,
    pub fsync_interval_ms: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self { fsync_policy: FsyncPolicy::Always, fsync_interval_ms: 1_000 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FxdConfig {
    pub selectors: SelectorsConfig,
    pub groups: GroupsConfig,
    pub autosave: AutosaveConfig,
    pub wal: WalConfig,
}

impl FxdConfig {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// unset tables.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, crate::errors::FxdError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| crate::errors::FxdError::Config(e.to_string()))
    }

    /// Overlay environment variables (`FXD_AUTOSAVE_INTERVAL_MS`,
    /// `FXD_WAL_FSYNC_POLICY`, `FXD_GROUPS_DEBOUNCE_MS`) onto a base config.
    #[must_use]
    pub fn from_env_overlay(mut self) -> Self {
        if let Ok(v) = std::env::var("FXD_AUTOSAVE_INTERVAL_MS")
            && let Ok(ms) = v.parse()
        {
            self.autosave.interval_ms = ms;
        }
        if let Ok(v) = std::env::var("FXD_GROUPS_DEBOUNCE_MS")
            && let Ok(ms) = v.parse()
        {
            self.groups.debounce_ms = ms;
        }
        if let Ok(v) = std::env::var("FXD_WAL_FSYNC_POLICY") {
            self.wal.fsync_policy = match v.to_ascii_lowercase().as_str() {
                "never" => FsyncPolicy::Never,
                "interval" => FsyncPolicy::Interval,
                _ => FsyncPolicy::Always,
            };
        }
        self
    }

    /// The platform-appropriate default store directory (`<data dir>/fxd`)
    /// used when a caller opens [`crate::Fxd`] without naming an explicit
    /// path. Returns `None` if the platform's data directory cannot be
    /// determined (e.g. `$HOME` unset on Linux).
    #[must_use]
    pub fn default_data_dir() -> Option<PathBuf> {
        dirs_next::data_dir().map(|d| d.join("fxd"))
    }
}
