//! Line reader over the gateway byte stream

use crate::error::LinkError;
use crate::probe::{BoxedStream, DeviceOpener, DeviceProbe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{info, warn};

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5);
/// Matches the gateway's JSON output buffer
pub const DEFAULT_MAX_LINE_LEN: usize = 512;
pub const DEFAULT_BAUD: u32 = 9600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Upper bound for a single `read_line` call
    pub read_timeout: Duration,
    /// Longest line accepted, excluding the terminator
    pub max_line_len: usize,
    /// Serial line speed handed to the opener
    pub baud: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            baud: DEFAULT_BAUD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Attached(PathBuf),
    Unattached,
}

/// Owns the connection to the gateway.
///
/// Once the stream fails the reader stays unattached; getting a new device is
/// the caller's job (run discovery again and build a new reader).
pub struct LinkReader {
    device: Option<PathBuf>,
    stream: Option<BufReader<BoxedStream>>,
    /// Bytes of a line that is still incomplete
    pending: Vec<u8>,
    settings: LinkSettings,
}

impl LinkReader {
    /// Run discovery and attach to the first device found.
    ///
    /// Device opens happen on the blocking pool. Never fails: when nothing
    /// can be opened the reader is returned in the unattached state.
    pub async fn attach(
        probe: &DeviceProbe,
        opener: Arc<dyn DeviceOpener>,
        settings: LinkSettings,
    ) -> Self {
        let probe = probe.clone();
        let found =
            tokio::task::spawn_blocking(move || probe.discover(opener.as_ref(), &settings)).await;

        match found {
            Ok(Ok((path, stream))) => Self::from_stream(path, stream, settings),
            Ok(Err(e)) => {
                warn!("Gateway discovery failed: {}", e);
                Self::unattached(settings)
            }
            Err(e) => {
                warn!("Gateway discovery task failed: {}", e);
                Self::unattached(settings)
            }
        }
    }

    /// Wrap an already opened stream
    pub fn from_stream(path: impl Into<PathBuf>, stream: BoxedStream, settings: LinkSettings) -> Self {
        let path = path.into();
        info!("Link attached to {}", path.display());
        Self {
            device: Some(path),
            stream: Some(BufReader::new(stream)),
            pending: Vec::new(),
            settings,
        }
    }

    pub fn unattached(settings: LinkSettings) -> Self {
        Self {
            device: None,
            stream: None,
            pending: Vec::new(),
            settings,
        }
    }

    pub fn state(&self) -> LinkState {
        match (&self.device, &self.stream) {
            (Some(path), Some(_)) => LinkState::Attached(path.clone()),
            _ => LinkState::Unattached,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    pub fn device(&self) -> Option<&Path> {
        self.device.as_deref()
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Drop the stream and any partial line
    pub fn detach(&mut self) {
        if let Some(path) = self.device.take() {
            info!("Link detached from {}", path.display());
        }
        self.stream = None;
        self.pending.clear();
    }

    /// Read the next line, without its terminator.
    ///
    /// Returns within `read_timeout`. On timeout the bytes read so far are
    /// kept and the next call continues the same line. End of stream and
    /// I/O errors detach the reader.
    pub async fn read_line(&mut self) -> Result<Vec<u8>, LinkError> {
        let (Some(path), Some(stream)) = (self.device.clone(), self.stream.as_mut()) else {
            return Err(LinkError::Unattached);
        };

        let limit = self.settings.max_line_len;
        let remaining = (limit + 1).saturating_sub(self.pending.len()) as u64;
        let mut bounded = stream.take(remaining);
        let read = tokio::time::timeout(
            self.settings.read_timeout,
            bounded.read_until(b'\n', &mut self.pending),
        )
        .await;

        match read {
            Err(_) => Err(LinkError::Timeout(self.settings.read_timeout)),
            Ok(Err(source)) => {
                warn!("Read from {} failed: {}", path.display(), source);
                self.detach();
                Err(LinkError::Io { path, source })
            }
            Ok(Ok(_)) if self.pending.last() == Some(&b'\n') => {
                let mut line = std::mem::take(&mut self.pending);
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Ok(line)
            }
            Ok(Ok(_)) if self.pending.len() > limit => {
                self.pending.clear();
                Err(LinkError::Overflow { limit })
            }
            Ok(Ok(_)) => {
                warn!("Gateway at {} closed the stream", path.display());
                self.detach();
                Err(LinkError::Closed(path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn settings(timeout_ms: u64) -> LinkSettings {
        LinkSettings {
            read_timeout: Duration::from_millis(timeout_ms),
            max_line_len: 64,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reads_lines_in_order() {
        let data: &'static [u8] = b"{\"a\":1}\n{\"b\":2}\r\n";
        let mut reader = LinkReader::from_stream("/dev/test", Box::new(data), settings(50));
        assert_eq!(reader.read_line().await.unwrap(), b"{\"a\":1}".to_vec());
        assert_eq!(reader.read_line().await.unwrap(), b"{\"b\":2}".to_vec());
    }

    #[tokio::test]
    async fn test_eof_detaches() {
        let data: &'static [u8] = b"only\n";
        let mut reader = LinkReader::from_stream("/dev/test", Box::new(data), settings(50));
        reader.read_line().await.unwrap();
        let err = reader.read_line().await.unwrap_err();
        assert!(matches!(err, LinkError::Closed(_)));
        assert!(!reader.is_attached());
        assert_eq!(reader.state(), LinkState::Unattached);
        assert!(matches!(reader.read_line().await, Err(LinkError::Unattached)));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_line() {
        let (mut tx, rx) = tokio::io::duplex(256);
        let mut reader = LinkReader::from_stream("/dev/test", Box::new(rx), settings(20));

        tx.write_all(b"{\"id\":1").await.unwrap();
        let err = reader.read_line().await.unwrap_err();
        assert!(matches!(err, LinkError::Timeout(_)));
        assert!(reader.is_attached());

        tx.write_all(b"1}\n").await.unwrap();
        assert_eq!(reader.read_line().await.unwrap(), b"{\"id\":11}".to_vec());
    }

    #[tokio::test]
    async fn test_overlong_line_is_dropped() {
        let mut data = vec![b'x'; 100];
        data.push(b'\n');
        data.extend_from_slice(b"ok\n");
        let data: &'static [u8] = Box::leak(data.into_boxed_slice());
        let mut reader = LinkReader::from_stream("/dev/test", Box::new(data), settings(50));

        let err = reader.read_line().await.unwrap_err();
        assert!(matches!(err, LinkError::Overflow { limit: 64 }));
        // The tail of the long line arrives as its own (garbage) line
        assert_eq!(reader.read_line().await.unwrap(), vec![b'x'; 35]);
        assert_eq!(reader.read_line().await.unwrap(), b"ok".to_vec());
    }

    #[tokio::test]
    async fn test_unattached_reader() {
        let mut reader = LinkReader::unattached(LinkSettings::default());
        assert_eq!(reader.state(), LinkState::Unattached);
        assert!(reader.device().is_none());
        assert!(matches!(reader.read_line().await, Err(LinkError::Unattached)));
    }
}
