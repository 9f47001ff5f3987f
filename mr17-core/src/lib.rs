//! MR17 Telemetry Core Library
//!
//! This crate provides the pure engine logic for the MR17 gateway link:
//! decoding line-delimited JSON frames, verifying their checksums, merging
//! them into fixed-shape subsystem records and composing the unified
//! telemetry snapshot from those records.
//!
//! Nothing in here performs I/O. The serial link lives in `mr17-link` and the
//! shared state container plus tick driver live in `mr17-engine`.

pub mod checksum;
pub mod composer;
pub mod error;
pub mod frame;
pub mod ground_speed;
pub mod registry;
pub mod simulation;
pub mod snapshot;
pub mod subsystem;
pub mod units;

pub use composer::{ComposerConfig, GearTable, TelemetryComposer};
pub use error::{ConfigError, DecodeError, ErrorKind, UnknownIdError};
pub use frame::{FieldValue, Frame, Payload};
pub use ground_speed::{FixedGroundSpeed, GroundSpeedSource};
pub use registry::{AppliedId, RegistryView, SubsystemRegistry};
pub use simulation::Simulator;
pub use snapshot::{FieldMask, SlipStatus, SnapshotMode, TelemetrySnapshot};
pub use subsystem::{SubsystemKind, SubsystemRecord, SubsystemTable};
