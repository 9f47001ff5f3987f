//! Tick driver
//!
//! Polls the link once per tick and feeds whatever arrives to the engine.
//! Every tick ends with a published snapshot: an accepted frame publishes
//! through `ingest`, anything else through `refresh`.
//!
//! Link health is tracked here, not in the link:
//! - a lost or missing device degrades the engine at once and discovery is
//!   retried every `reattach_interval`
//! - read timeouts degrade it only after `degrade_after_timeouts` in a row
//! - the first accepted frame clears the degraded flag

use crate::config::DriverSettings;
use crate::engine::{Engine, TickResult};
use mr17_core::ErrorKind;
use mr17_link::{DeviceOpener, DeviceProbe, LinkError, LinkReader};
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What happened on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A complete line was read and run through the pipeline
    Line(TickResult),
    /// No complete line within the read timeout
    Idle,
    /// The link failed, has no device, or dropped an overlong line
    LinkFault(ErrorKind),
}

pub struct TickDriver {
    engine: Arc<Engine>,
    link: LinkReader,
    probe: DeviceProbe,
    opener: Arc<dyn DeviceOpener>,
    settings: DriverSettings,
    consecutive_timeouts: u32,
    last_attach: Instant,
}

impl TickDriver {
    /// The link is expected to have gone through discovery already; the
    /// next attempt waits a full `reattach_interval`.
    pub fn new(
        engine: Arc<Engine>,
        link: LinkReader,
        probe: DeviceProbe,
        opener: Arc<dyn DeviceOpener>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            engine,
            link,
            probe,
            opener,
            settings,
            consecutive_timeouts: 0,
            last_attach: Instant::now(),
        }
    }

    pub fn link(&self) -> &LinkReader {
        &self.link
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    /// Run until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Tick driver started ({:?} per tick)", self.settings.tick_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Tick driver stopped");
    }

    /// One poll of the link
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.link.is_attached() {
            self.try_reattach().await;
        }

        match self.link.read_line().await {
            Ok(line) => {
                self.consecutive_timeouts = 0;
                let result = self.engine.ingest(&line).await;
                if result.accepted {
                    if self.engine.set_link_degraded(false) {
                        self.engine.refresh().await;
                    }
                } else {
                    self.engine.refresh().await;
                }
                TickOutcome::Line(result)
            }
            Err(LinkError::Timeout(_)) => {
                self.consecutive_timeouts = self.consecutive_timeouts.saturating_add(1);
                self.engine.record_link_failure(ErrorKind::LinkTimeout);
                if self.consecutive_timeouts == self.settings.degrade_after_timeouts {
                    warn!("No data from the gateway for {} ticks", self.consecutive_timeouts);
                }
                if self.consecutive_timeouts >= self.settings.degrade_after_timeouts {
                    self.engine.set_link_degraded(true);
                }
                self.engine.refresh().await;
                TickOutcome::Idle
            }
            Err(e) => {
                let kind = e.kind();
                self.engine.record_link_failure(kind);
                if e.is_fatal() {
                    self.engine.set_link_degraded(true);
                } else {
                    debug!("Dropped line: {}", e);
                }
                self.engine.refresh().await;
                TickOutcome::LinkFault(kind)
            }
        }
    }

    async fn try_reattach(&mut self) {
        if self.last_attach.elapsed() < self.settings.reattach_interval {
            return;
        }
        self.last_attach = Instant::now();

        let link = LinkReader::attach(&self.probe, self.opener.clone(), *self.link.settings()).await;
        if link.is_attached() {
            self.link = link;
            self.consecutive_timeouts = 0;
        }
    }
}
