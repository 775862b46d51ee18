//! Process-wide request pacing
//!
//! Every outbound request, retries included, passes through one shared
//! [`RateLimiter`]. Callers queue on a fair (FIFO) async mutex, so permits are
//! granted strictly one at a time, in arrival order, and never closer together
//! than the configured interval, whatever the size of the worker pool.

use crate::ConfigError;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between granted request permits
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter granting at most one permit per `interval`
    ///
    /// A zero interval disables throttling.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    /// Creates a limiter from a configured interval in milliseconds
    ///
    /// # Returns
    ///
    /// * `Ok(RateLimiter)` - For any interval >= 0
    /// * `Err(ConfigError::Validation)` - For a negative interval
    pub fn from_millis(interval_ms: i64) -> Result<Self, ConfigError> {
        let millis = u64::try_from(interval_ms).map_err(|_| {
            ConfigError::Validation(format!(
                "request interval must be >= 0ms, got {}ms",
                interval_ms
            ))
        })?;
        Ok(Self::new(Duration::from_millis(millis)))
    }

    /// Configured minimum interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until it is safe to issue the next request
    ///
    /// Returns the instant the permit was granted. Dropping the future before
    /// it completes grants nothing.
    pub async fn acquire(&self) -> Instant {
        if self.interval.is_zero() {
            return Instant::now();
        }

        // Held across the sleep: later callers queue behind this one
        let mut last_grant = self.last_grant.lock().await;

        if let Some(previous) = *last_grant {
            let ready_at = previous + self.interval;
            let now = Instant::now();
            if ready_at > now {
                tracing::trace!("Throttling request for {:?}", ready_at - now);
                tokio::time::sleep_until(ready_at).await;
            }
        }

        let granted = Instant::now();
        *last_grant = Some(granted);
        granted
    }
}
