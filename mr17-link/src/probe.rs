//! Gateway discovery
//!
//! The gateway enumerates as a USB serial device whose node name depends on
//! the adapter chip and plug order, so discovery walks a bounded grid of
//! candidate paths:
//!
//! ```text
//! /dev/ttyUSB0, /dev/ttyACM0, /dev/ttyUSB1, /dev/ttyACM1, ...
//! ```
//!
//! The numeric suffix is the outer loop; the first node that opens wins.

use crate::error::LinkError;
use crate::reader::LinkSettings;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tracing::{debug, info};

pub const DEFAULT_PREFIXES: [&str; 2] = ["/dev/ttyUSB", "/dev/ttyACM"];
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Byte stream from an opened device
pub type BoxedStream = Box<dyn AsyncRead + Unpin + Send>;

/// Opens a device path as a byte stream.
///
/// `open` may block (a tty open can hang on carrier detect), so callers on the
/// runtime go through [`crate::LinkReader::attach`], which runs discovery on
/// the blocking pool.
pub trait DeviceOpener: Send + Sync {
    fn open(&self, path: &Path, settings: &LinkSettings) -> std::io::Result<BoxedStream>;
}

/// Opens the gateway as a serial port, 8N1 without flow control at the
/// configured baud rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

impl DeviceOpener for SerialOpener {
    fn open(&self, path: &Path, settings: &LinkSettings) -> std::io::Result<BoxedStream> {
        let port = tokio_serial::new(path.to_string_lossy(), settings.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()?;
        Ok(Box::new(port))
    }
}

/// Opens the path as a plain file: recorded captures, FIFOs, or a node whose
/// line settings were applied beforehand. The baud rate is not used.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOpener;

impl DeviceOpener for FileOpener {
    fn open(&self, path: &Path, _settings: &LinkSettings) -> std::io::Result<BoxedStream> {
        let file = std::fs::OpenOptions::new().read(true).open(path)?;
        Ok(Box::new(tokio::fs::File::from_std(file)))
    }
}

/// Bounded candidate grid of device paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProbe {
    pub prefixes: Vec<String>,
    pub attempts: u32,
}

impl DeviceProbe {
    pub fn new(prefixes: Vec<String>, attempts: u32) -> Self {
        Self { prefixes, attempts }
    }

    /// Every path discovery will try, in order
    pub fn candidates(&self) -> Vec<PathBuf> {
        (0..self.attempts)
            .flat_map(|suffix| {
                self.prefixes
                    .iter()
                    .map(move |prefix| PathBuf::from(format!("{}{}", prefix, suffix)))
            })
            .collect()
    }

    /// Open the first candidate that succeeds
    pub fn discover(
        &self,
        opener: &dyn DeviceOpener,
        settings: &LinkSettings,
    ) -> Result<(PathBuf, BoxedStream), LinkError> {
        let candidates = self.candidates();
        for path in &candidates {
            match opener.open(path, settings) {
                Ok(stream) => {
                    info!("Gateway found at {}", path.display());
                    return Ok((path.clone(), stream));
                }
                Err(e) => debug!("Probe {} failed: {}", path.display(), e),
            }
        }
        Err(LinkError::NotFound {
            tried: candidates.len(),
        })
    }
}

impl Default for DeviceProbe {
    fn default() -> Self {
        Self {
            prefixes: DEFAULT_PREFIXES.iter().map(|p| p.to_string()).collect(),
            attempts: DEFAULT_ATTEMPTS,
        }
    }
}
