//! Outbound request throttling
//!
//! Sliding-window limiter: at most `max_requests` acquisitions in any rolling
//! `window`. Callers over the limit wait for the oldest request to age out;
//! they never fail. Waiters are served in arrival order because the window
//! lock is a fair tokio mutex held across the wait.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    recent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// A limit of zero disables throttling
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            recent: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests as usize, Duration::from_secs(60))
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Wait until one more request fits in the window, then record it
    pub async fn acquire(&self) {
        if self.max_requests == 0 {
            return;
        }

        let mut recent = self.recent.lock().await;
        loop {
            let now = Instant::now();
            while recent
                .front()
                .is_some_and(|&at| now.duration_since(at) >= self.window)
            {
                recent.pop_front();
            }

            if recent.len() < self.max_requests {
                recent.push_back(now);
                return;
            }

            if let Some(&oldest) = recent.front() {
                let ready_at = oldest + self.window;
                debug!(
                    wait_ms = ready_at.duration_since(now).as_millis() as u64,
                    "Rate limit reached, waiting"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
    }

    /// Requests recorded in the current window
    pub async fn in_window(&self) -> usize {
        let now = Instant::now();
        self.recent
            .lock()
            .await
            .iter()
            .filter(|&&at| now.duration_since(at) < self.window)
            .count()
    }
}
