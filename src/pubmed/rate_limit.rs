//! Fixed-interval throttle for NCBI requests
//!
//! NCBI allows ~3 requests/second without an API key and 10/second with one.
//! The gate spaces consecutive calls by a minimum interval; it is shared
//! process-wide so concurrent pipeline invocations serialize through it.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Process-wide fixed-interval rate gate.
pub struct RateGate {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Block until at least `min_interval` has passed since the previous
    /// call. The lock is held across the sleep so concurrent callers queue.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
