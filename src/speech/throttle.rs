//! Minimum spacing between external synthesis calls

use std::time::Duration;

use tokio::time::Instant;

/// Default minimum gap between the end of one call and the start of the next
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(1000);

/// Enforces a minimum interval between consecutive calls
///
/// The interval is measured from the end of the previous call, as recorded
/// by [`Throttle::record`], to the start of the next one. Each scheduler owns
/// its own throttle, so separate sessions never delay each other.
#[derive(Debug, Clone)]
pub struct Throttle {
    /// Minimum gap between calls
    interval: Duration,
    /// When the previous call finished
    last_call: Option<Instant>,
}

impl Throttle {
    /// Create a throttle with the given minimum interval
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: None,
        }
    }

    /// Configured minimum interval
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// How long a call starting at `now` would still have to wait
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.last_call.map_or(Duration::ZERO, |last| {
            self.interval
                .saturating_sub(now.saturating_duration_since(last))
        })
    }

    /// Wait until the next call is allowed to start
    pub async fn ready(&self) {
        let wait = self.remaining(Instant::now());
        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis(), "throttling synthesis call");
            tokio::time::sleep(wait).await;
        }
    }

    /// Mark the end of a call
    pub fn record(&mut self) {
        self.last_call = Some(Instant::now());
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_INTERVAL)
    }
}
