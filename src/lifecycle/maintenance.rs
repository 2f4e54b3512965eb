//! Periodic housekeeping.
//!
//! Deactivates lapsed list entries and drops idle counters. Purely
//! hygienic: expiry is already honored at read time, so a delayed or
//! skipped pass changes no decision.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::pipeline::SecurityPipeline;

pub struct MaintenanceTask {
    pipeline: Arc<SecurityPipeline>,
    interval: Duration,
}

impl MaintenanceTask {
    pub fn new(pipeline: Arc<SecurityPipeline>, interval: Duration) -> Self {
        Self { pipeline, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Maintenance task starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // The first tick fires immediately; nothing to sweep yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.pipeline.sweep();
                    tracing::debug!(
                        expired_entries = report.expired_entries,
                        idle_counters = report.idle_counters,
                        idle_strikes = report.idle_strikes,
                        "Maintenance sweep complete"
                    );
                }
                _ = shutdown.recv() => {
                    tracing::info!("Maintenance task received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
