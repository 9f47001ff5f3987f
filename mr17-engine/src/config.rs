//! Engine configuration
//!
//! Loaded from a JSON settings file. Every field has a default, so an empty
//! object (or no file at all) gives a working engine for the MR17 gateway.

use anyhow::{Context, Result};
use mr17_core::{ComposerConfig, ConfigError, FieldMask, SubsystemKind, SubsystemTable};
use mr17_link::{DeviceOpener, DeviceProbe, FileOpener, LinkSettings, SerialOpener};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const SETTINGS_FILE: &str = "settings.json";
const APP_DIR: &str = "mr17";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tick period of the driver loop
    pub tick_interval_ms: u64,
    /// Start in debug (simulated) mode
    pub debug: bool,
    /// Fixed ground-speed reading in km/h, used when no sensor is fitted
    pub ground_speed_kmh: Option<f64>,
    /// Comma-separated snapshot fields for the per-snapshot debug log
    pub log_fields: Option<String>,
    pub link: LinkConfig,
    pub subsystems: Vec<SubsystemEntry>,
    pub composer: ComposerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub device_prefixes: Vec<String>,
    /// Numeric suffixes tried per prefix
    pub attempts: u32,
    /// How candidate nodes are opened
    pub device: DeviceKind,
    pub baud: u32,
    pub read_timeout_ms: u64,
    pub max_line_len: usize,
    pub reattach_interval_ms: u64,
    /// Consecutive read timeouts before the engine degrades to simulation
    pub degrade_after_timeouts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Serial port, configured for `baud` on open
    #[default]
    Serial,
    /// Plain file or FIFO, e.g. a recorded capture
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemEntry {
    pub id: i64,
    pub kind: SubsystemKind,
}

/// Timing knobs for the tick driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    pub tick_interval: Duration,
    pub reattach_interval: Duration,
    pub degrade_after_timeouts: u32,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("tick_interval_ms must be greater than zero")]
    ZeroTickInterval,

    #[error("link.read_timeout_ms must be greater than zero")]
    ZeroReadTimeout,

    #[error("link.reattach_interval_ms must be greater than zero")]
    ZeroReattachInterval,

    #[error("link.baud must be greater than zero")]
    ZeroBaud,

    #[error("link.max_line_len must be greater than zero")]
    ZeroLineLength,

    #[error("link.degrade_after_timeouts must be greater than zero")]
    ZeroDegradeThreshold,

    #[error("composer.effective_radius_cm must be positive, got {0}")]
    NonPositiveRadius(f64),

    #[error("ground_speed_kmh must be finite, got {0}")]
    InvalidGroundSpeed(f64),

    #[error("invalid subsystem table: {0}")]
    Table(#[from] ConfigError),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            debug: false,
            ground_speed_kmh: None,
            log_fields: None,
            link: LinkConfig::default(),
            subsystems: SubsystemTable::mr17()
                .entries()
                .iter()
                .map(|&(id, kind)| SubsystemEntry { id, kind })
                .collect(),
            composer: ComposerConfig::default(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        let probe = DeviceProbe::default();
        let link = LinkSettings::default();
        Self {
            device_prefixes: probe.prefixes,
            attempts: probe.attempts,
            device: DeviceKind::default(),
            baud: link.baud,
            read_timeout_ms: link.read_timeout.as_millis() as u64,
            max_line_len: link.max_line_len,
            reattach_interval_ms: 1000,
            degrade_after_timeouts: 50,
        }
    }
}

impl EngineConfig {
    /// Read, parse and validate a settings file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(config)
    }

    /// Settings file to use: the explicit argument, then `./settings.json`,
    /// then `<config dir>/mr17/settings.json`. `None` means run on defaults.
    pub fn locate(arg: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = arg {
            return Some(path.to_path_buf());
        }

        let local = PathBuf::from(SETTINGS_FILE);
        if local.is_file() {
            return Some(local);
        }

        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
            .filter(|path| path.is_file())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.tick_interval_ms == 0 {
            return Err(SettingsError::ZeroTickInterval);
        }
        if self.link.read_timeout_ms == 0 {
            return Err(SettingsError::ZeroReadTimeout);
        }
        if self.link.reattach_interval_ms == 0 {
            return Err(SettingsError::ZeroReattachInterval);
        }
        if self.link.baud == 0 {
            return Err(SettingsError::ZeroBaud);
        }
        if self.link.max_line_len == 0 {
            return Err(SettingsError::ZeroLineLength);
        }
        if self.link.degrade_after_timeouts == 0 {
            return Err(SettingsError::ZeroDegradeThreshold);
        }
        let radius = self.composer.effective_radius_cm;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(SettingsError::NonPositiveRadius(radius));
        }
        if let Some(speed) = self.ground_speed_kmh.filter(|s| !s.is_finite()) {
            return Err(SettingsError::InvalidGroundSpeed(speed));
        }
        self.subsystem_table()?;
        Ok(())
    }

    pub fn subsystem_table(&self) -> Result<SubsystemTable, ConfigError> {
        SubsystemTable::new(self.subsystems.iter().map(|e| (e.id, e.kind)).collect())
    }

    pub fn probe(&self) -> DeviceProbe {
        DeviceProbe::new(self.link.device_prefixes.clone(), self.link.attempts)
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            read_timeout: Duration::from_millis(self.link.read_timeout_ms),
            max_line_len: self.link.max_line_len,
            baud: self.link.baud,
        }
    }

    pub fn opener(&self) -> Arc<dyn DeviceOpener> {
        match self.link.device {
            DeviceKind::Serial => Arc::new(SerialOpener),
            DeviceKind::File => Arc::new(FileOpener),
        }
    }

    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            reattach_interval: Duration::from_millis(self.link.reattach_interval_ms),
            degrade_after_timeouts: self.link.degrade_after_timeouts,
        }
    }

    /// Field mask for the snapshot debug log, if one was configured
    pub fn log_mask(&self) -> Option<FieldMask> {
        self.log_fields.as_deref().map(FieldMask::parse)
    }
}
