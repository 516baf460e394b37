//! Periodic statistics logging.

use crate::events::SessionEvent;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

/// Running totals for the current connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub last_frame_id: u32,
    pub updates_applied: u64,
}

/// Folds session events into per-connection totals.
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    connected: bool,
    totals: StatsSnapshot,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Connected { .. } => {
                self.connected = true;
                self.totals.frames = 0;
                self.totals.updates_applied = 0;
            }
            SessionEvent::Disconnected { .. } => {
                self.connected = false;
            }
            SessionEvent::FrameApplied {
                frame_id,
                updates_applied,
                ..
            } => {
                self.totals.frames += 1;
                self.totals.last_frame_id = *frame_id;
                self.totals.updates_applied += updates_applied;
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns the totals to report, or `None` while no client is connected.
    pub fn report(&self) -> Option<StatsSnapshot> {
        self.connected.then_some(self.totals)
    }
}

/// Logs frame statistics on a fixed period and the waiting indicator on
/// disconnect.
#[derive(Debug, Clone, Copy)]
pub struct StatsReporter {
    interval: Option<Duration>,
}

impl StatsReporter {
    /// Creates a reporter. A zero interval disables periodic lines.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: (!interval.is_zero()).then_some(interval),
        }
    }

    /// Runs until shutdown is signalled or the event channel closes.
    pub async fn run(
        self,
        mut events: broadcast::Receiver<SessionEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = self.interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut acc = StatsAccumulator::new();

        info!("Waiting for connection...");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        acc.observe(&event);
                        if let SessionEvent::Disconnected { .. } = event {
                            info!("Waiting for connection...");
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Statistics missed {} events", missed);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = next_tick(&mut ticker) => {
                    if let Some(stats) = acc.report() {
                        info!(
                            "Frames: {}, last frame id: {}, updates applied: {}",
                            stats.frames, stats.last_frame_id, stats.updates_applied
                        );
                    }
                }
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
