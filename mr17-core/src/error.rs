//! Error taxonomy for the ingest pipeline

use crate::subsystem::SubsystemKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Flat classification of everything that can go wrong on one tick.
///
/// Used for counters and for the `reason` of a rejected ingest. None of these
/// are fatal; see [`ConfigError`] for the one fatal class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedJson,
    MissingPayload,
    MissingChecksum,
    MissingId,
    ChecksumMismatch,
    UnknownId,
    LinkError,
    LinkTimeout,
    /// Zero (or otherwise unusable) ground speed during slip computation
    DivisionEdgeCase,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::MalformedJson,
        ErrorKind::MissingPayload,
        ErrorKind::MissingChecksum,
        ErrorKind::MissingId,
        ErrorKind::ChecksumMismatch,
        ErrorKind::UnknownId,
        ErrorKind::LinkError,
        ErrorKind::LinkTimeout,
        ErrorKind::DivisionEdgeCase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedJson => "malformed_json",
            ErrorKind::MissingPayload => "missing_payload",
            ErrorKind::MissingChecksum => "missing_checksum",
            ErrorKind::MissingId => "missing_id",
            ErrorKind::ChecksumMismatch => "checksum_mismatch",
            ErrorKind::UnknownId => "unknown_id",
            ErrorKind::LinkError => "link_error",
            ErrorKind::LinkTimeout => "link_timeout",
            ErrorKind::DivisionEdgeCase => "division_edge_case",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw line could not be turned into a [`Frame`](crate::frame::Frame)
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("frame has no `data` object")]
    MissingPayload,

    #[error("frame has no integer `chksum`")]
    MissingChecksum,

    #[error("frame has no integer `id`")]
    MissingId,
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::MalformedJson(_) => ErrorKind::MalformedJson,
            DecodeError::MissingPayload => ErrorKind::MissingPayload,
            DecodeError::MissingChecksum => ErrorKind::MissingChecksum,
            DecodeError::MissingId => ErrorKind::MissingId,
        }
    }
}

/// A frame addressed a subsystem ID that is not in the configured table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown subsystem id {0}")]
pub struct UnknownIdError(pub i64);

/// The subsystem table handed to the registry is unusable.
///
/// This is the only error class that aborts construction instead of
/// degrading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("subsystem table is empty")]
    EmptyTable,

    #[error("subsystem id {0} is listed more than once")]
    DuplicateId(i64),

    #[error("subsystem {0} is mapped to more than one id")]
    DuplicateKind(SubsystemKind),

    #[error("subsystem {0} has no id in the table")]
    MissingKind(SubsystemKind),
}
