//! Counting content violations per address for automatic blocking.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy)]
struct Strikes {
    window_start: Instant,
    count: u32,
}

/// Fixed-window violation counter; reports when an address hits the
/// threshold and starts it over.
#[derive(Debug)]
pub struct ViolationTracker {
    strikes: DashMap<IpAddr, Strikes>,
    threshold: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl ViolationTracker {
    pub fn new(threshold: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            strikes: DashMap::new(),
            threshold: threshold.max(1),
            window,
            clock,
        }
    }

    /// Count one violation. `true` exactly when this one reaches the
    /// threshold.
    pub fn record(&self, address: IpAddr) -> bool {
        let now = self.clock.instant();
        let mut entry = self.strikes.entry(address).or_insert(Strikes {
            window_start: now,
            count: 0,
        });

        if now.saturating_duration_since(entry.window_start) >= self.window {
            *entry = Strikes {
                window_start: now,
                count: 0,
            };
        }

        entry.count += 1;
        if entry.count >= self.threshold {
            entry.count = 0;
            entry.window_start = now;
            true
        } else {
            false
        }
    }

    pub fn evict_idle(&self) -> usize {
        let now = self.clock.instant();
        let before = self.strikes.len();
        self.strikes
            .retain(|_, s| now.saturating_duration_since(s.window_start) < self.window);
        before.saturating_sub(self.strikes.len())
    }
}
