//! Loop pacing to a target frame interval.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Paces the control loop to one iteration per configured interval.
///
/// `synchronize` sleeps until the stored deadline and then advances it
/// by one interval. When the loop overran its budget, the deadline is
/// re-anchored at `now + interval` instead of accumulating debt, so a
/// slow stretch never produces a burst of back-to-back iterations.
pub struct Pacer {
    interval: Duration,
    deadline: Instant,
}

impl Pacer {
    /// Set the pacing interval. Called once at startup.
    pub fn arm(interval: Duration) -> Self {
        Self {
            interval,
            deadline: Instant::now() + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the interval since the previous call has elapsed.
    /// Returns immediately if it already has.
    pub async fn synchronize(&mut self) {
        let now = Instant::now();
        if now < self.deadline {
            sleep_until(self.deadline).await;
            self.deadline += self.interval;
        } else {
            self.deadline = now + self.interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn waits_out_the_interval() {
        let mut pacer = Pacer::arm(Duration::from_millis(40));
        let started = Instant::now();
        pacer.synchronize().await;
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_returns_are_at_least_one_interval_apart() {
        let mut pacer = Pacer::arm(Duration::from_millis(25));
        pacer.synchronize().await;
        let mark = Instant::now();
        pacer.synchronize().await;
        assert!(mark.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test(start_paused = true)]
    async fn overrun_returns_immediately_without_burst() {
        let mut pacer = Pacer::arm(Duration::from_millis(10));

        // Simulate an iteration that blew well past its budget.
        tokio::time::advance(Duration::from_millis(100)).await;

        let mark = Instant::now();
        pacer.synchronize().await;
        // No sleep owed for the overrun...
        assert!(mark.elapsed() < Duration::from_millis(1));

        // ...and no catch-up: the next call waits a full fresh interval.
        let mark = Instant::now();
        pacer.synchronize().await;
        assert!(mark.elapsed() >= Duration::from_millis(10));
    }
}
