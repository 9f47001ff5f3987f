//! Ground-speed source trait definition

/// Something that can produce a ground-speed reading on demand
///
/// The MR17 measures true ground speed with a downward-facing camera. The
/// engine only needs the latest reading once per tick, so the contract is
/// kept to a single non-blocking call.
pub trait GroundSpeedSource: Send + Sync {
    /// Short name for logs (e.g. "vision", "fixed")
    fn name(&self) -> &str;

    /// Latest ground speed in km/h
    ///
    /// Returns `None` when no reading is available this tick. Must not block.
    fn sample(&mut self) -> Option<f64>;
}

/// Source that always reports the same speed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedGroundSpeed(pub f64);

impl GroundSpeedSource for FixedGroundSpeed {
    fn name(&self) -> &str {
        "fixed"
    }

    fn sample(&mut self) -> Option<f64> {
        Some(self.0)
    }
}
