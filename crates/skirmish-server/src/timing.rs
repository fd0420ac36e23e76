//! Fixed-step tick pacing.
//!
//! Accumulates wall-clock time and reports how many fixed simulation steps
//! are due, capping catch-up so a stalled host does not spiral.

use std::time::{Duration, Instant};

/// Maximum steps run in one frame before the backlog is dropped.
const MAX_CATCH_UP: u32 = 10;

/// Fixed timestep clock.
#[derive(Debug)]
pub struct TickClock {
    /// Length of one simulation step
    step: Duration,
    /// Time of the last poll
    last: Instant,
    /// Unconsumed time
    accumulator: Duration,
    /// Steps dropped because the host fell behind
    dropped: u64,
}

impl TickClock {
    /// Create a clock with the given step length in milliseconds.
    #[must_use]
    pub fn new(step_ms: u64) -> Self {
        Self {
            step: Duration::from_millis(step_ms.max(1)),
            last: Instant::now(),
            accumulator: Duration::ZERO,
            dropped: 0,
        }
    }

    /// Step length in milliseconds.
    #[must_use]
    pub fn step_ms(&self) -> u64 {
        self.step.as_millis() as u64
    }

    /// Total steps dropped so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Accumulates elapsed time and returns the number of steps to run now.
    pub fn due_steps(&mut self) -> u32 {
        let now = Instant::now();
        self.accumulate(now - self.last);
        self.last = now;

        let mut count = 0;
        while self.accumulator >= self.step && count < MAX_CATCH_UP {
            self.accumulator -= self.step;
            count += 1;
        }

        // Still behind: drop the backlog
        if self.accumulator > self.step * 2 {
            self.dropped += (self.accumulator.as_millis() / self.step.as_millis().max(1)) as u64;
            self.accumulator = Duration::ZERO;
        }
        count
    }

    fn accumulate(&mut self, elapsed: Duration) {
        self.accumulator += elapsed;
    }

    /// Sleeps until the next step is due.
    pub fn wait(&self) {
        let remaining = self.step.saturating_sub(self.accumulator + self.last.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_whole_steps() {
        let mut clock = TickClock::new(50);
        clock.accumulate(Duration::from_millis(120));
        clock.last = Instant::now();
        let steps = clock.due_steps();
        assert_eq!(steps, 2);
        assert_eq!(clock.dropped(), 0);
    }

    #[test]
    fn test_backlog_is_capped() {
        let mut clock = TickClock::new(50);
        clock.accumulate(Duration::from_millis(5000));
        clock.last = Instant::now();
        assert_eq!(clock.due_steps(), MAX_CATCH_UP);
        assert!(clock.dropped() > 0);
        assert_eq!(clock.due_steps(), 0);
    }

    #[test]
    fn test_zero_step_is_clamped() {
        assert_eq!(TickClock::new(0).step_ms(), 1);
    }
}
