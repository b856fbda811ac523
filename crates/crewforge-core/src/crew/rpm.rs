//! Requests-per-minute cap shared by every agent in a crew

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute window over model calls
#[derive(Debug)]
pub struct RpmLimiter {
    max_rpm: u32,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RpmLimiter {
    pub fn new(max_rpm: u32) -> Self {
        Self::with_window(max_rpm, WINDOW)
    }

    fn with_window(max_rpm: u32, window: Duration) -> Self {
        Self {
            max_rpm: max_rpm.max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    pub fn max_rpm(&self) -> u32 {
        self.max_rpm
    }

    /// Wait until another call fits in the window, then record it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    calls.pop_front();
                }

                if calls.len() < self.max_rpm as usize {
                    calls.push_back(now);
                    return;
                }

                match calls.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            debug!("RPM limit of {} reached, waiting {:?}", self.max_rpm, wait);
            tokio::time::sleep(wait).await;
        }
    }
}
