//! Time source for event timestamps.

use chrono::{DateTime, Utc};

/// Supplies the `occurred_at` timestamp of newly produced events, so that
/// command handling can be replayed against a pinned time in tests.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time source used by the running service.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
