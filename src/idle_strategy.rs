//! Park/spin/sleep policies invoked by an [`crate::agent::AgentRunner`] when
//! its duty cycle reports no work done.

use std::thread;
use std::time::Duration;

/// A policy for what a duty-cycle harness should do when a tick reports
/// zero units of work performed.
pub trait IdleStrategy: Send {
    /// Called once per tick with the work count from that tick. An
    /// implementation that alternates between spinning and sleeping keeps
    /// its own state across calls; `idle` takes `&mut self` for that
    /// reason.
    fn idle(&mut self, work_count: usize);

    /// Convenience for callers that already know the tick was idle.
    fn idle_empty(&mut self) {
        self.idle(0)
    }
}

impl IdleStrategy for Box<dyn IdleStrategy> {
    fn idle(&mut self, work_count: usize) {
        (**self).idle(work_count)
    }
}

/// Default idle strategy: sleep a fixed duration whenever a tick performs
/// no work. Cheap on CPU, adds up to the sleep duration of extra latency
/// before the next tick.
#[derive(Debug, Clone, Copy)]
pub struct SleepingIdleStrategy {
    sleep_duration: Duration,
}

impl SleepingIdleStrategy {
    /// Build a strategy that sleeps `sleep_duration` on every idle tick.
    pub fn new(sleep_duration: Duration) -> Self {
        SleepingIdleStrategy { sleep_duration }
    }
}

impl Default for SleepingIdleStrategy {
    /// 16 ms, matching the spec's default duty-cycle idle sleep.
    fn default() -> Self {
        SleepingIdleStrategy::new(Duration::from_millis(16))
    }
}

impl IdleStrategy for SleepingIdleStrategy {
    fn idle(&mut self, work_count: usize) {
        if work_count == 0 {
            thread::sleep(self.sleep_duration);
        }
    }
}

/// Never sleeps or yields; spins the CPU continuously. Lowest latency,
/// highest CPU cost. Useful in tests that want the conductor to observe a
/// driver response as fast as possible.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinIdleStrategy;

impl IdleStrategy for BusySpinIdleStrategy {
    fn idle(&mut self, _work_count: usize) {}
}

/// Yields the OS scheduler quantum on an idle tick instead of sleeping a
/// fixed duration. A middle ground between [`BusySpinIdleStrategy`] and
/// [`SleepingIdleStrategy`].
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldingIdleStrategy;

impl IdleStrategy for YieldingIdleStrategy {
    fn idle(&mut self, work_count: usize) {
        if work_count == 0 {
            thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn sleeping_strategy_only_sleeps_when_idle() {
        let mut strategy = SleepingIdleStrategy::new(Duration::from_millis(5));
        let start = Instant::now();
        strategy.idle(1);
        assert!(start.elapsed() < Duration::from_millis(5));

        let start = Instant::now();
        strategy.idle(0);
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn busy_spin_never_blocks() {
        let mut strategy = BusySpinIdleStrategy;
        let start = Instant::now();
        strategy.idle_empty();
        assert!(start.elapsed() < Duration::from_millis(1));
    }
}
