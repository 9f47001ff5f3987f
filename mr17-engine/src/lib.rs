//! MR17 Telemetry Engine
//!
//! Shared state container, tick driver and configuration. Exposed as a
//! library for the daemon binary and for integration testing.

pub mod config;
pub mod driver;
pub mod engine;

pub use config::{DeviceKind, DriverSettings, EngineConfig, SettingsError};
pub use driver::{TickDriver, TickOutcome};
pub use engine::{Engine, IngestStats, StatsSnapshot, TickResult};
