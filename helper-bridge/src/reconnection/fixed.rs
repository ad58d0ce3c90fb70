//! Fixed delay reconnection strategy.

use super::traits::{ReopenHistory, ReconnectionStrategy};
use crate::transport::TransportError;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Waits the same delay before every connection attempt.
///
/// # Examples
///
/// ```
/// use helper_bridge::reconnection::FixedDelay;
/// use std::time::Duration;
///
/// // Retry every 5 seconds, forever
/// let strategy = FixedDelay::new(Duration::from_secs(5));
///
/// // One immediate attempt, then give up
/// let strategy = FixedDelay::single_attempt();
/// ```
#[derive(Debug)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
    history: Mutex<ReopenHistory>,
}

impl FixedDelay {
    /// Unbounded attempts separated by `delay`.
    pub fn new(delay: Duration) -> Self {
        Self::builder().delay(delay).build()
    }

    /// One immediate attempt per maneuver. This is the bridge default.
    pub fn single_attempt() -> Self {
        Self::builder()
            .delay(Duration::ZERO)
            .max_attempts(Some(1))
            .build()
    }

    /// Create a builder.
    pub fn builder() -> FixedDelayBuilder {
        FixedDelayBuilder::default()
    }

    /// Delay between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Attempt limit per maneuver, if any.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// A copy of the attempt history.
    pub fn history(&self) -> ReopenHistory {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        FixedDelayBuilder::default().build()
    }
}

#[async_trait]
impl ReconnectionStrategy for FixedDelay {
    async fn should_reconnect(&self, attempt: u32, _last_error: &TransportError) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }

    async fn next_delay(&self, _attempt: u32) -> Duration {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_attempt();
        self.delay
    }

    fn on_connected(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_reopened();
    }

    fn on_disconnected(&self, error: &TransportError) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_failed(error);
    }

    fn reset(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn name(&self) -> &str {
        "FixedDelay"
    }
}

/// Builder for [`FixedDelay`].
#[derive(Debug)]
pub struct FixedDelayBuilder {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl Default for FixedDelayBuilder {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

impl FixedDelayBuilder {
    /// Set the delay between attempts.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the attempt limit per maneuver (`None` for unlimited).
    pub fn max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Build the strategy.
    pub fn build(self) -> FixedDelay {
        FixedDelay {
            delay: self.delay,
            max_attempts: self.max_attempts,
            history: Mutex::new(ReopenHistory::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let strategy = FixedDelay::default();
        assert_eq!(strategy.delay(), Duration::from_secs(1));
        assert_eq!(strategy.max_attempts(), None);
    }

    #[tokio::test]
    async fn test_single_attempt() {
        let strategy = FixedDelay::single_attempt();
        let error = TransportError::NotConnected;

        assert!(strategy.should_reconnect(0, &error).await);
        assert!(!strategy.should_reconnect(1, &error).await);
        assert_eq!(strategy.next_delay(0).await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_unbounded_attempts() {
        let strategy = FixedDelay::new(Duration::from_millis(50));
        let error = TransportError::connection_failed("ws://localhost:8888/api");

        assert!(strategy.should_reconnect(0, &error).await);
        assert!(strategy.should_reconnect(10_000, &error).await);
        assert_eq!(strategy.next_delay(7).await, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_history_tracking() {
        let strategy = FixedDelay::builder().max_attempts(Some(3)).build();
        let error = TransportError::connection_failed("ws://localhost:8888/api");

        strategy.next_delay(0).await;
        strategy.on_disconnected(&error);
        strategy.next_delay(1).await;
        strategy.on_connected();

        let history = strategy.history();
        assert_eq!(history.attempts, 2);
        assert_eq!(history.failed, 1);
        assert_eq!(history.reopened, 1);
        assert_eq!(history.failure_streak, 0);

        strategy.reset();
        assert_eq!(strategy.history().attempts, 0);
    }
}
