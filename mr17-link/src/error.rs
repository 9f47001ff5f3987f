//! Link error type

use mr17_core::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    /// No device was found during discovery, or the device was lost
    #[error("link is not attached")]
    Unattached,

    #[error("no gateway found after probing {tried} device path(s)")]
    NotFound { tried: usize },

    #[error("no complete line within {0:?}")]
    Timeout(Duration),

    #[error("device {0} closed the stream")]
    Closed(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Too many bytes without a newline; the partial line was dropped
    #[error("line exceeded {limit} bytes without a terminator")]
    Overflow { limit: usize },
}

impl LinkError {
    /// Pipeline classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::Timeout(_) => ErrorKind::LinkTimeout,
            _ => ErrorKind::LinkError,
        }
    }

    /// Whether the reader dropped its device because of this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::Unattached | LinkError::NotFound { .. } | LinkError::Closed(_) | LinkError::Io { .. }
        )
    }
}
