//! Serial gateway link for the MR17 telemetry engine
//!
//! Finds the gateway by probing device nodes, then hands out one line per
//! `read_line` call with a hard per-read time limit. The link never retries
//! or reattaches on its own; that decision belongs to the tick driver.

pub mod error;
pub mod probe;
pub mod reader;

pub use error::LinkError;
pub use probe::{BoxedStream, DeviceOpener, DeviceProbe, FileOpener, SerialOpener};
pub use reader::{LinkReader, LinkSettings, LinkState};
