//! Time source abstraction.
//!
//! Rate limiting works on monotonic instants; list expiry and audit timestamps
//! work on wall-clock UTC. Both come from the same [`Clock`] so tests can move
//! them together.

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::time::Instant;

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    /// Monotonic now, used for window arithmetic.
    fn instant(&self) -> Instant;

    /// Wall-clock now, used for expiry and audit timestamps.
    fn utc(&self) -> DateTime<Utc>;
}

/// Production clock backed by the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn instant(&self) -> Instant {
        Instant::now()
    }

    fn utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub use mock::MockClock;


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock::new();
        let t1 = clock.instant();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.instant() > t1);
    }

    #[test]
    fn test_mock_clock_advances_both_sources() {
        let clock = MockClock::new();
        let i0 = clock.instant();
        let u0 = clock.utc();

        let shared = clock.clone();
        shared.advance(Duration::from_secs(90));

        assert_eq!(clock.instant(), i0 + Duration::from_secs(90));
        assert_eq!(clock.utc(), u0 + chrono::Duration::seconds(90));
    }
}
