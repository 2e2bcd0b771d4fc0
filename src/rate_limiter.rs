//! Global rate limiter (C4): a single minimum-interval gate shared by every
//! outbound Steam request across all sessions. FIFO fairness, 429-driven
//! backoff inflation that decays back toward the base interval.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("rate limiter wait was cancelled")]
pub struct Cancelled;

struct State {
    /// Earliest instant the next request may start.
    next_allowed: Instant,
    /// Current minimum interval, inflated by 429s and decayed by successes.
    interval: Duration,
}

/// Single-tenant (process-wide) gate over all outbound Steam traffic.
pub struct RateLimiter {
    base_interval: Duration,
    max_interval: Duration,
    state: Mutex<State>,
    notify: Notify,
}

impl RateLimiter {
    pub fn new(base_interval_ms: u64) -> Self {
        let base = Duration::from_millis(base_interval_ms);
        RateLimiter {
            base_interval: base,
            max_interval: Duration::from_secs(60),
            state: Mutex::new(State {
                next_allowed: Instant::now(),
                interval: base,
            }),
            notify: Notify::new(),
        }
    }

    /// Suspend the caller until it is allowed to proceed, or until `cancel`
    /// is triggered. FIFO is approximated by always sleeping until the
    /// current `next_allowed` deadline and re-checking on wake — contending
    /// callers converge on the same deadline in the order they observe it.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                if now >= state.next_allowed {
                    state.next_allowed = now + state.interval;
                    None
                } else {
                    Some(state.next_allowed - now)
                }
            };

            let Some(wait) = wait else {
                return Ok(());
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => continue,
                _ = cancel.cancelled() => return Err(Cancelled),
            }
        }
    }

    /// Called after a 429: doubles the interval, capped at `max_interval`.
    pub fn report_rate_limited(&self) {
        let mut state = self.state.lock().unwrap();
        state.interval = (state.interval * 2).min(self.max_interval);
        self.notify.notify_waiters();
    }

    /// Called after a successful request: decays the interval halfway back
    /// toward the base interval.
    pub fn report_success(&self) {
        let mut state = self.state.lock().unwrap();
        if state.interval > self.base_interval {
            let gap = state.interval - self.base_interval;
            state.interval = self.base_interval + gap / 2;
        }
    }

    #[cfg(test)]
    pub fn current_interval(&self) -> Duration {
        self.state.lock().unwrap().interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_respects_minimum_interval() {
        let limiter = RateLimiter::new(50);
        let cancel = CancellationToken::new();
        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn acquire_is_cancelled_promptly() {
        let limiter = RateLimiter::new(5_000);
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap(); // consume the immediate slot

        cancel.cancel();
        let result = limiter.acquire(&cancel).await;
        assert!(result.is_err());
    }

    #[test]
    fn backoff_inflates_and_decays() {
        let limiter = RateLimiter::new(1000);
        assert_eq!(limiter.current_interval(), Duration::from_millis(1000));
        limiter.report_rate_limited();
        assert_eq!(limiter.current_interval(), Duration::from_millis(2000));
        limiter.report_success();
        assert_eq!(limiter.current_interval(), Duration::from_millis(1500));
    }

    #[test]
    fn backoff_caps_at_60_seconds() {
        let limiter = RateLimiter::new(50_000);
        for _ in 0..5 {
            limiter.report_rate_limited();
        }
        assert_eq!(limiter.current_interval(), Duration::from_secs(60));
    }
}
