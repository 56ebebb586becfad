//! Engine configuration.
//!
//! - `loader`: config locations and JSON read/write helpers
//! - `manifest`: page manifests describing groups and toggles
//!
//! `EngineSettings` lives in `~/.config/biglinux-settings/engine.json`.
//! A missing or unreadable file is not an error: the engine starts with
//! defaults and logs a warning. The window size is kept next to it in
//! `window.json`; it is the only state carried between runs.

pub mod loader;
pub mod manifest;

use crate::error::ConfigError;
use crate::models::{DEFAULT_TOGGLE_TIMEOUT, PROBE_TIMEOUT};
use crate::sync::default_probe_concurrency;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use manifest::{register_manifest, GroupManifest, PageManifest, ToggleManifest};

/// Where the panel's scripts live when nothing else is configured.
pub const DEFAULT_SCRIPTS_DIR: &str = "/usr/share/biglinux/biglinux-settings";

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Root of the per-group script directories.
    pub scripts_base_dir: String,
    pub probe_timeout_secs: u64,
    pub default_toggle_timeout_secs: u64,
    /// 0 means twice the number of CPUs.
    pub max_concurrent_probes: usize,
    /// Wrapper for streaming scripts that need root.
    pub elevation_command: String,
    /// Empty means the platform data directory.
    pub log_dir: String,
    pub debug_logging: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            scripts_base_dir: DEFAULT_SCRIPTS_DIR.to_string(),
            probe_timeout_secs: PROBE_TIMEOUT.as_secs(),
            default_toggle_timeout_secs: DEFAULT_TOGGLE_TIMEOUT.as_secs(),
            max_concurrent_probes: 0,
            elevation_command: "pkexec".to_string(),
            log_dir: String::new(),
            debug_logging: false,
        }
    }
}

impl EngineSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn default_toggle_timeout(&self) -> Duration {
        Duration::from_secs(self.default_toggle_timeout_secs)
    }

    pub fn probe_concurrency(&self) -> usize {
        match self.max_concurrent_probes {
            0 => default_probe_concurrency(),
            n => n,
        }
    }

    pub fn scripts_dir(&self) -> PathBuf {
        PathBuf::from(&self.scripts_base_dir)
    }

    pub fn resolved_log_dir(&self) -> PathBuf {
        if self.log_dir.is_empty() {
            crate::log_collector::default_logs_path()
        } else {
            PathBuf::from(&self.log_dir)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "probe_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.default_toggle_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "default_toggle_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.elevation_command.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "elevation_command cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads and persists `EngineSettings`.
pub struct SettingsManager;

impl SettingsManager {
    /// Load from the global settings path, falling back to defaults.
    pub fn load() -> Result<EngineSettings, ConfigError> {
        let path = loader::get_global_settings_path()?;
        Self::load_from(&path)
    }

    /// Missing or unparseable files yield defaults; values that parse but
    /// fail validation are an error.
    pub fn load_from(path: &Path) -> Result<EngineSettings, ConfigError> {
        let settings = match loader::load_json::<EngineSettings>(path) {
            Ok(settings) => settings,
            Err(ConfigError::FileNotFound(_)) => {
                log::debug!("[Config] No settings at {}, using defaults", path.display());
                return Ok(EngineSettings::default());
            }
            Err(e) => {
                log::warn!(
                    "[Config] Failed to parse {}, falling back to defaults: {}",
                    path.display(),
                    e
                );
                return Ok(EngineSettings::default());
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(settings: &EngineSettings) -> Result<(), ConfigError> {
        let path = loader::get_global_settings_path()?;
        Self::save_to(settings, &path)
    }

    pub fn save_to(settings: &EngineSettings, path: &Path) -> Result<(), ConfigError> {
        settings.validate()?;
        loader::save_json(settings, path)?;
        log::info!("[Config] Settings saved to {}", path.display());
        Ok(())
    }
}

/// Last window size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WindowGeometry {
    pub width: i32,
    pub height: i32,
}

impl Default for WindowGeometry {
    fn default() -> Self {
        WindowGeometry {
            width: 900,
            height: 700,
        }
    }
}

impl WindowGeometry {
    pub fn load() -> Self {
        match loader::get_window_state_path() {
            Ok(path) => Self::load_from(&path),
            Err(e) => {
                log::debug!("[Config] No window state location: {}", e);
                Self::default()
            }
        }
    }

    /// Anything unreadable or non-positive gives the default size.
    pub fn load_from(path: &Path) -> Self {
        match loader::load_json::<WindowGeometry>(path) {
            Ok(geometry) if geometry.width > 0 && geometry.height > 0 => geometry,
            Ok(geometry) => {
                log::warn!("[Config] Ignoring window size {}x{}", geometry.width, geometry.height);
                Self::default()
            }
            Err(ConfigError::FileNotFound(_)) => Self::default(),
            Err(e) => {
                log::warn!("[Config] Failed to read window state: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&loader::get_window_state_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        loader::save_json(self, path)
    }
}
