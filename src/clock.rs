//! Clock abstractions used throughout the bootstrap/lifecycle protocol.
//!
//! Every timeout computation in this crate goes through one of these two
//! traits rather than calling [`std::time::SystemTime`] or [`std::time::Instant`]
//! directly, so tests can substitute a deterministic clock instead of racing
//! real wall-clock time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A source of epoch-millisecond timestamps. Used for anything measured
/// against wall-clock time the driver also reports (heartbeats, CnC
/// metadata timestamps).
pub trait EpochClock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn time_ms(&self) -> i64;
}

/// A source of nanosecond timestamps from a monotonic clock. Used for
/// interval measurements (inter-service timeout, keepalive cadence) where
/// wall-clock adjustments must not cause spurious timeouts.
pub trait NanoClock: Send + Sync {
    /// Nanoseconds since an arbitrary, monotonic, process-local epoch.
    fn time_ns(&self) -> i64;
}

/// [`EpochClock`] backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEpochClock;

impl EpochClock for SystemEpochClock {
    fn time_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_millis() as i64
    }
}

/// [`NanoClock`] backed by a process-wide monotonic [`std::time::Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemNanoClock;

impl Default for SystemNanoClock {
    fn default() -> Self {
        SystemNanoClock
    }
}

impl NanoClock for SystemNanoClock {
    fn time_ns(&self) -> i64 {
        monotonic_origin().elapsed().as_nanos() as i64
    }
}

fn monotonic_origin() -> &'static Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now)
}

/// A clock whose reading can be set by the caller. Used by tests that need
/// to deterministically drive timeout logic without sleeping.
#[derive(Debug, Default)]
pub struct ManualClock {
    value: AtomicI64,
}

impl ManualClock {
    /// Construct a manual clock starting at `initial`.
    pub fn new(initial: i64) -> Self {
        ManualClock {
            value: AtomicI64::new(initial),
        }
    }

    /// Overwrite the clock's current reading.
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Advance the clock's current reading by `delta`.
    pub fn advance(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::SeqCst);
    }
}

impl EpochClock for ManualClock {
    fn time_ms(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }
}

impl NanoClock for ManualClock {
    fn time_ns(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.time_ms(), 100);
        clock.advance(50);
        assert_eq!(clock.time_ms(), 150);
        clock.set(0);
        assert_eq!(clock.time_ns(), 0);
    }

    #[test]
    fn system_clocks_move_forward() {
        let epoch = SystemEpochClock;
        let nano = SystemNanoClock;
        let t0 = epoch.time_ms();
        let n0 = nano.time_ns();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(epoch.time_ms() >= t0);
        assert!(nano.time_ns() > n0);
    }
}
