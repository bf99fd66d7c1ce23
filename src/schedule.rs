/// Cancellable ticker driving the ingestion loop.
///
/// Fires immediately on the first wait. After that the next fire time is
/// measured from when the caller reports the cycle finished, not from the
/// previous fire time, so execution time accumulates as drift.

use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Stand-in for "never" when a delay does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Fire,
    Stop,
}

#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    backoff: Duration,
    next_fire: Instant,
}

impl Ticker {
    pub fn new(interval: Duration, backoff: Duration) -> Self {
        Self {
            interval,
            backoff,
            next_fire: Instant::now(),
        }
    }

    pub fn next_fire(&self) -> Instant {
        self.next_fire
    }

    /// Time left until the next fire.
    pub fn remaining(&self) -> Duration {
        self.next_fire.saturating_duration_since(Instant::now())
    }

    /// Waits for the next fire time or for `shutdown`, whichever is first.
    /// A cancelled token always wins.
    pub async fn wait(&self, shutdown: &CancellationToken) -> Tick {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Tick::Stop,
            _ = sleep_until(self.next_fire) => Tick::Fire,
        }
    }

    /// Schedules the next fire one interval from now.
    pub fn completed(&mut self) {
        self.next_fire = after(self.interval);
    }

    /// Schedules the next fire one backoff period from now.
    pub fn failed(&mut self) {
        self.next_fire = after(self.backoff);
    }
}

fn after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or(now + FAR_FUTURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(600);
    const BACKOFF: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_is_immediate() {
        let ticker = Ticker::new(INTERVAL, BACKOFF);
        let start = Instant::now();

        assert_eq!(ticker.wait(&CancellationToken::new()).await, Tick::Fire);
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_tick_measured_from_completion() {
        let mut ticker = Ticker::new(INTERVAL, BACKOFF);
        let token = CancellationToken::new();
        ticker.wait(&token).await;

        // A cycle that takes 90 seconds pushes the schedule by 90 seconds.
        tokio::time::advance(Duration::from_secs(90)).await;
        let completed_at = Instant::now();
        ticker.completed();

        assert_eq!(ticker.next_fire(), completed_at + INTERVAL);
        assert_eq!(ticker.wait(&token).await, Tick::Fire);
        assert!(Instant::now() >= completed_at + INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_uses_backoff() {
        let mut ticker = Ticker::new(INTERVAL, BACKOFF);
        let start = Instant::now();
        ticker.failed();

        assert_eq!(ticker.next_fire(), start + BACKOFF);
        assert_eq!(ticker.remaining(), BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_wait() {
        let mut ticker = Ticker::new(INTERVAL, BACKOFF);
        ticker.completed();
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        assert_eq!(ticker.wait(&token).await, Tick::Stop);
        assert!(Instant::now() - start < INTERVAL, "must not wait out the interval");
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_delays_saturate() {
        let mut ticker = Ticker::new(Duration::MAX, Duration::MAX);
        let start = Instant::now();

        ticker.completed();
        assert_eq!(ticker.next_fire(), start + FAR_FUTURE);
        ticker.failed();
        assert_eq!(ticker.next_fire(), start + FAR_FUTURE);

        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(ticker.wait(&token).await, Tick::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_wins_over_due_tick() {
        let ticker = Ticker::new(INTERVAL, BACKOFF);
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(ticker.wait(&token).await, Tick::Stop);
    }
}
