//! Timestamp source for registry records.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Produces Unix epoch millisecond timestamps.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;

    /// Tells the clock about a timestamp read back from storage.
    fn observe(&self, _timestamp_ms: i64) {}
}

/// Wall clock that never repeats or goes backwards.
///
/// Two calls in the same millisecond yield `t` and `t + 1`, so records touched
/// in sequence always order strictly.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(previous.saturating_add(1));
            match self.last.compare_exchange_weak(
                previous,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => previous = actual,
            }
        }
    }

    fn observe(&self, timestamp_ms: i64) {
        self.last.fetch_max(timestamp_ms, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, MonotonicClock};

    #[test]
    fn successive_reads_strictly_increase() {
        let clock = MonotonicClock::new();
        let mut previous = clock.now_ms();
        for _ in 0..1_000 {
            let next = clock.now_ms();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn observed_future_timestamp_is_never_undercut() {
        let clock = MonotonicClock::new();
        let far_future = clock.now_ms() + 60_000;
        clock.observe(far_future);
        assert!(clock.now_ms() > far_future);
    }
}
