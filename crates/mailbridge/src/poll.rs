//! Adaptive wait schedule for bounded reads.
//!
//! A bounded read tries once immediately, then sleeps a fixed interval
//! between attempts. The last sleep is shortened by the average time the
//! previous attempts spent reading so the final attempt ends close to the
//! deadline instead of past it.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{Error, Result};

/// Interval between read attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Schedule state for one bounded read.
#[derive(Debug, Clone)]
pub struct PollState {
    start: Instant,
    deadline: Instant,
    interval: Duration,
    attempts: u32,
    max_attempts: u32,
}

impl PollState {
    /// Starts a schedule at `start` that may run for `max_wait`.
    #[must_use]
    pub fn new(start: Instant, max_wait: Duration, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let max_attempts = u32::try_from(max_wait.as_millis() / interval.as_millis())
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        Self {
            start,
            deadline: start.checked_add(max_wait).unwrap_or_else(|| start + FAR_FUTURE),
            interval,
            attempts: 0,
            max_attempts,
        }
    }

    /// Attempts scheduled so far, not counting the immediate one.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// How long to sleep before the next attempt, or `None` when the
    /// schedule is exhausted.
    pub fn next_wait(&mut self, now: Instant) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        let remaining = self.deadline.saturating_duration_since(now);
        if remaining.is_zero() {
            return None;
        }

        let wait = if self.attempts + 1 < self.max_attempts && remaining > self.interval {
            self.interval
        } else {
            let elapsed = now.saturating_duration_since(self.start);
            let sleeping = self.interval * self.attempts;
            let estimate = elapsed.saturating_sub(sleeping) / (self.attempts + 1);
            let last = remaining.saturating_sub(estimate);
            if last.is_zero() {
                return None;
            }
            last
        };

        self.attempts += 1;
        Some(wait)
    }
}

/// Sleeps for `wait` unless `cancel` fires first.
///
/// # Errors
///
/// Returns [`Error::PollInterrupted`] if the token is cancelled.
pub async fn sleep_or_cancel(wait: Duration, cancel: &CancellationToken) -> Result<()> {
    trace!(wait_ms = wait.as_millis(), "poll wait");
    tokio::select! {
        () = cancel.cancelled() => Err(Error::PollInterrupted),
        () = tokio::time::sleep(wait) => Ok(()),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(state: &mut PollState, start: Instant, read_cost: Duration) -> (u32, Duration) {
        let mut now = start + read_cost;
        let mut reads = 1;
        while let Some(wait) = state.next_wait(now) {
            now += wait + read_cost;
            reads += 1;
        }
        (reads, now - start)
    }

    #[test]
    fn zero_wait_schedules_nothing() {
        let start = Instant::now();
        let mut state = PollState::new(start, Duration::ZERO, POLL_INTERVAL);
        assert_eq!(state.next_wait(start), None);
    }

    #[test]
    fn free_reads_fill_the_window_exactly() {
        let start = Instant::now();
        let mut state = PollState::new(start, Duration::from_secs(2), POLL_INTERVAL);
        let (reads, total) = drain(&mut state, start, Duration::ZERO);
        assert_eq!(reads, 21);
        assert_eq!(total, Duration::from_secs(2));
    }

    #[test]
    fn last_wait_subtracts_average_read_time() {
        let start = Instant::now();
        let mut state = PollState::new(start, Duration::from_millis(300), POLL_INTERVAL);
        let cost = Duration::from_millis(20);

        let mut now = start + cost;
        assert_eq!(state.next_wait(now), Some(POLL_INTERVAL));
        now += POLL_INTERVAL + cost;
        assert_eq!(state.next_wait(now), Some(POLL_INTERVAL));
        now += POLL_INTERVAL + cost;
        // 40 ms left and reads average 20 ms.
        assert_eq!(state.next_wait(now), Some(Duration::from_millis(20)));
    }

    #[test]
    fn stops_when_past_deadline() {
        let start = Instant::now();
        let mut state = PollState::new(start, Duration::from_millis(500), POLL_INTERVAL);
        assert_eq!(state.next_wait(start + Duration::from_secs(1)), None);
    }

    proptest! {
        #[test]
        fn never_overshoots_much(wait_ms in 0u64..5_000, cost_ms in 0u64..150) {
            let start = Instant::now();
            let max_wait = Duration::from_millis(wait_ms);
            let cost = Duration::from_millis(cost_ms);
            let mut state = PollState::new(start, max_wait, POLL_INTERVAL);
            let (_, total) = drain(&mut state, start, cost);
            prop_assert!(total <= max_wait + cost * 2 + POLL_INTERVAL);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes() {
        let cancel = CancellationToken::new();
        let before = Instant::now();
        sleep_or_cancel(Duration::from_millis(250), &cancel).await.unwrap();
        assert_eq!(before.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_sleep_is_interrupted() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = sleep_or_cancel(Duration::from_secs(60), &cancel).await.unwrap_err();
        assert_eq!(err, Error::PollInterrupted);
    }
}
