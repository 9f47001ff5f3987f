//! Engine state container
//!
//! The engine owns the subsystem registry and publishes one
//! [`TelemetrySnapshot`] at a time. There is a single writer (the tick
//! driver) and any number of readers:
//!
//! ```text
//! ingest(line) ──► decode ──► checksum ──► registry.apply ──► compose ──► snapshot cell
//!                                                                             │
//!                    current_snapshot() / subscribe() / snapshot_stream() ◄───┘
//! ```
//!
//! The snapshot cell is a `watch` channel holding an `Arc`. Publishing
//! replaces the `Arc` in one step, so a reader sees either the previous or
//! the new snapshot, never a mix.

use crate::config::EngineConfig;
use mr17_core::{
    checksum, frame, ConfigError, ErrorKind, FixedGroundSpeed, GroundSpeedSource, RegistryView,
    Simulator, SlipStatus, SnapshotMode, SubsystemKind, SubsystemRecord, SubsystemRegistry,
    SubsystemTable, TelemetryComposer, TelemetrySnapshot, UnknownIdError,
};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// Result of feeding one raw line to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickResult {
    pub accepted: bool,
    /// Why the line was rejected
    pub reason: Option<ErrorKind>,
    /// Subsystem the frame was routed to
    pub subsystem: Option<SubsystemKind>,
}

impl TickResult {
    fn accepted(kind: SubsystemKind) -> Self {
        Self {
            accepted: true,
            reason: None,
            subsystem: Some(kind),
        }
    }

    fn rejected(reason: ErrorKind) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
            subsystem: None,
        }
    }
}

/// Running counters, one per [`ErrorKind`] plus accepted frames
#[derive(Debug, Default)]
pub struct IngestStats {
    accepted: AtomicU64,
    published: AtomicU64,
    errors: [AtomicU64; ErrorKind::ALL.len()],
}

impl IngestStats {
    fn slot(kind: ErrorKind) -> usize {
        ErrorKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default()
    }

    pub fn record(&self, kind: ErrorKind) {
        self.errors[Self::slot(kind)].fetch_add(1, Ordering::Relaxed);
    }

    fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            errors: ErrorKind::ALL
                .iter()
                .map(|kind| (*kind, self.errors[Self::slot(*kind)].load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub published: u64,
    pub errors: Vec<(ErrorKind, u64)>,
}

impl StatsSnapshot {
    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.errors
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn rejected(&self) -> u64 {
        self.errors
            .iter()
            .filter(|(kind, _)| {
                !matches!(
                    kind,
                    ErrorKind::LinkError | ErrorKind::LinkTimeout | ErrorKind::DivisionEdgeCase
                )
            })
            .map(|(_, n)| n)
            .sum()
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepted={} rejected={} published={}",
            self.accepted,
            self.rejected(),
            self.published
        )?;
        for (kind, count) in self.errors.iter().filter(|(_, n)| *n > 0) {
            write!(f, " {}={}", kind, count)?;
        }
        Ok(())
    }
}

/// Everything only the writer touches
struct WriterState {
    registry: SubsystemRegistry,
    composer: TelemetryComposer,
    ground_speed: Option<Box<dyn GroundSpeedSource>>,
    simulator: Simulator,
    sequence: u64,
}

/// Shared telemetry engine, used as `Arc<Engine>`
pub struct Engine {
    writer: Mutex<WriterState>,
    table: SubsystemTable,
    snapshot_tx: watch::Sender<Arc<TelemetrySnapshot>>,
    view_tx: watch::Sender<RegistryView>,
    debug_mode: AtomicBool,
    degraded: AtomicBool,
    stats: IngestStats,
}

impl Engine {
    /// Build an engine with zeroed records and publish the first snapshot.
    ///
    /// Fails only when the subsystem table is not a complete 1:1 mapping.
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        let table = config.subsystem_table()?;
        let registry = SubsystemRegistry::new(table.clone());
        let composer = TelemetryComposer::new(config.composer);
        let mut simulator = Simulator::from_clock();

        let initial = if config.debug {
            simulator.snapshot()
        } else {
            composer.compose(&registry.view(), None)
        };
        let (snapshot_tx, _) = watch::channel(Arc::new(initial));
        let (view_tx, _) = watch::channel(registry.view());

        let ground_speed = config
            .ground_speed_kmh
            .map(|kmh| Box::new(FixedGroundSpeed(kmh)) as Box<dyn GroundSpeedSource>);

        Ok(Self {
            writer: Mutex::new(WriterState {
                registry,
                composer,
                ground_speed,
                simulator,
                sequence: 0,
            }),
            table,
            snapshot_tx,
            view_tx,
            debug_mode: AtomicBool::new(config.debug),
            degraded: AtomicBool::new(false),
            stats: IngestStats::default(),
        })
    }

    /// Install a ground-speed source, replacing any configured fixed speed
    pub fn with_ground_speed(mut self, source: Box<dyn GroundSpeedSource>) -> Self {
        info!("Ground speed source: {}", source.name());
        self.writer.get_mut().ground_speed = Some(source);
        self
    }

    /// Use a deterministic simulator (tests, bench replays)
    pub fn with_simulator(mut self, simulator: Simulator) -> Self {
        self.writer.get_mut().simulator = simulator;
        self
    }

    /// Run one raw line through the pipeline.
    ///
    /// A rejected line changes nothing: records and the published snapshot
    /// stay as they were.
    pub async fn ingest(&self, line: &[u8]) -> TickResult {
        let frame = match frame::decode(line) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Rejected line: {}", e);
                return self.reject(e.kind());
            }
        };

        if !checksum::validate(&frame.data, frame.chksum) {
            debug!(
                "Checksum mismatch for id {}: declared {}, computed {}",
                frame.id,
                frame.chksum,
                checksum::compute(&frame.data)
            );
            return self.reject(ErrorKind::ChecksumMismatch);
        }

        let mut writer = self.writer.lock().await;
        let applied = match writer.registry.apply(frame.id, &frame.data) {
            Ok(applied) => applied,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                return self.reject(ErrorKind::UnknownId);
            }
        };
        if !applied.report.ignored.is_empty() {
            debug!(
                "Ignored fields for {} (id {}): {:?}",
                applied.kind, applied.id, applied.report.ignored
            );
        }

        self.view_tx.send_replace(writer.registry.view());
        self.publish(&mut writer);
        self.stats.record_accepted();
        TickResult::accepted(applied.kind)
    }

    /// Compose and publish a snapshot from the current records
    pub async fn refresh(&self) {
        let mut writer = self.writer.lock().await;
        self.publish(&mut writer);
    }

    /// Latest snapshot. Never blocks on the writer.
    pub fn current_snapshot(&self) -> Arc<TelemetrySnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Receiver that is notified on every publish
    pub fn subscribe(&self) -> watch::Receiver<Arc<TelemetrySnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Stream of snapshots, starting with the current one
    pub fn snapshot_stream(&self) -> WatchStream<Arc<TelemetrySnapshot>> {
        WatchStream::new(self.snapshot_tx.subscribe())
    }

    /// Copy of one subsystem's record, looked up by CAN id
    pub fn subsystem_snapshot(&self, id: i64) -> Result<SubsystemRecord, UnknownIdError> {
        let kind = self.table.kind_of(id).ok_or(UnknownIdError(id))?;
        Ok(self.view_tx.borrow().record(kind))
    }

    pub fn table(&self) -> &SubsystemTable {
        &self.table
    }

    /// Switch simulated composition on or off. Takes effect on the next
    /// publish.
    pub fn set_debug_mode(&self, on: bool) {
        if self.debug_mode.swap(on, Ordering::SeqCst) != on {
            info!("Debug mode {}", if on { "enabled" } else { "disabled" });
        }
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode.load(Ordering::SeqCst)
    }

    /// Mark the link as degraded (or recovered). Returns whether the flag
    /// changed.
    pub fn set_link_degraded(&self, degraded: bool) -> bool {
        let changed = self.degraded.swap(degraded, Ordering::SeqCst) != degraded;
        if changed {
            if degraded {
                warn!("Link degraded, composing simulated telemetry");
            } else {
                info!("Link recovered, composing live telemetry");
            }
        }
        changed
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Mode the next snapshot will be composed in
    pub fn composition_mode(&self) -> SnapshotMode {
        if self.debug_mode() || self.is_degraded() {
            SnapshotMode::Simulated
        } else {
            SnapshotMode::Live
        }
    }

    /// Count a failure reported by the link
    pub fn record_link_failure(&self, kind: ErrorKind) {
        self.stats.record(kind);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn reject(&self, reason: ErrorKind) -> TickResult {
        self.stats.record(reason);
        TickResult::rejected(reason)
    }

    fn publish(&self, writer: &mut WriterState) {
        let mut snapshot = match self.composition_mode() {
            SnapshotMode::Simulated => writer.simulator.snapshot(),
            SnapshotMode::Live => {
                let ground_speed = writer.ground_speed.as_mut().and_then(|s| s.sample());
                let snapshot = writer.composer.compose(&writer.registry.view(), ground_speed);
                if snapshot.slip_status == SlipStatus::ZeroGroundSpeed {
                    self.stats.record(ErrorKind::DivisionEdgeCase);
                }
                snapshot
            }
        };

        writer.sequence += 1;
        snapshot.sequence = writer.sequence;
        self.snapshot_tx.send_replace(Arc::new(snapshot));
        self.stats.record_published();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: wire line with a correct checksum
    fn line(id: i64, data: &str) -> Vec<u8> {
        let probe = format!(r#"{{"id":{},"data":{},"chksum":0}}"#, id, data);
        let chksum = checksum::compute(&frame::decode(probe.as_bytes()).unwrap().data);
        format!(r#"{{"id":{},"data":{},"chksum":{}}}"#, id, data, chksum).into_bytes()
    }

    fn engine() -> Engine {
        Engine::new(&EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_initial_snapshot_is_zeroed_live() {
        let engine = engine();
        let snapshot = engine.current_snapshot();
        assert_eq!(snapshot.sequence, 0);
        assert_eq!(snapshot.mode, SnapshotMode::Live);
        assert_eq!(snapshot.rpm.0, 0.0);
        assert_eq!(snapshot.slip_status, SlipStatus::NoGroundSpeed);
    }

    #[tokio::test]
    async fn test_accepted_frame_publishes() {
        let engine = engine();
        let result = engine
            .ingest(&line(11, r#"{"engine_rpm":3000,"shaft_rpm":100,"gear":1}"#))
            .await;

        assert!(result.accepted);
        assert_eq!(result.subsystem, Some(SubsystemKind::Transmission));
        let snapshot = engine.current_snapshot();
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.rpm.0, 3000.0);
        assert_eq!(snapshot.cvt_ratio, 30.0);
        assert_eq!(engine.stats().accepted, 1);
    }

    #[tokio::test]
    async fn test_rejects_do_not_publish() {
        let engine = engine();
        let mut rx = engine.subscribe();
        rx.borrow_and_update();

        let result = engine.ingest(b"{\"id\":11,\"data\":{},\"chksum\":0}").await;
        assert_eq!(result.reason, Some(ErrorKind::ChecksumMismatch));
        let result = engine.ingest(b"garbage").await;
        assert_eq!(result.reason, Some(ErrorKind::MalformedJson));

        assert!(!rx.has_changed().unwrap());
        let stats = engine.stats();
        assert_eq!(stats.count(ErrorKind::ChecksumMismatch), 1);
        assert_eq!(stats.count(ErrorKind::MalformedJson), 1);
        assert_eq!(stats.rejected(), 2);
        assert_eq!(stats.published, 0);
    }

    #[tokio::test]
    async fn test_zero_ground_speed_is_counted() {
        let engine = engine().with_ground_speed(Box::new(FixedGroundSpeed(0.0)));
        engine.ingest(&line(11, r#"{"shaft_rpm":500,"gear":2}"#)).await;

        let snapshot = engine.current_snapshot();
        assert_eq!(snapshot.slip_status, SlipStatus::ZeroGroundSpeed);
        assert_eq!(snapshot.slip, mr17_core::composer::SLIP_UNDEFINED);
        assert_eq!(engine.stats().count(ErrorKind::DivisionEdgeCase), 1);
    }

    #[tokio::test]
    async fn test_degraded_composes_simulated() {
        let engine = engine();
        assert!(engine.set_link_degraded(true));
        assert!(!engine.set_link_degraded(true));
        assert_eq!(engine.composition_mode(), SnapshotMode::Simulated);

        engine.refresh().await;
        assert_eq!(engine.current_snapshot().mode, SnapshotMode::Simulated);

        engine.set_link_degraded(false);
        engine.refresh().await;
        assert_eq!(engine.current_snapshot().mode, SnapshotMode::Live);
    }

    #[tokio::test]
    async fn test_stats_display_lists_nonzero_kinds() {
        let engine = engine();
        engine.ingest(b"{}").await;
        engine.record_link_failure(ErrorKind::LinkTimeout);
        let text = engine.stats().to_string();
        assert!(text.starts_with("accepted=0 rejected=1 published=0"));
        assert!(text.contains("missing_payload=1"));
        assert!(text.contains("link_timeout=1"));
        assert!(!text.contains("unknown_id"));
    }
}
