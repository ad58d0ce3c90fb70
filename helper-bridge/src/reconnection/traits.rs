//! The reconnect policy seam.

use crate::transport::TransportError;
use async_trait::async_trait;
use std::time::Duration;

/// Governs the reconnect maneuver a request runs when it finds the helper
/// connection down.
///
/// The connection task drives the maneuver: it asks [`should_reconnect`]
/// before every attempt, sleeps for [`next_delay`], and reports the outcome
/// through [`on_connected`] or [`on_disconnected`]. A successful explicit
/// open calls [`reset`].
///
/// [`should_reconnect`]: ReconnectionStrategy::should_reconnect
/// [`next_delay`]: ReconnectionStrategy::next_delay
/// [`on_connected`]: ReconnectionStrategy::on_connected
/// [`on_disconnected`]: ReconnectionStrategy::on_disconnected
/// [`reset`]: ReconnectionStrategy::reset
///
/// # Examples
///
/// ```
/// use helper_bridge::reconnection::{FixedDelay, ReconnectionStrategy};
/// use std::sync::Arc;
///
/// let strategy: Arc<dyn ReconnectionStrategy> = Arc::new(FixedDelay::single_attempt());
/// assert_eq!(strategy.name(), "FixedDelay");
/// ```
#[async_trait]
pub trait ReconnectionStrategy: Send + Sync {
    /// Whether to make attempt number `attempt` (0-indexed) of the current
    /// maneuver. `last_error` is why the previous attempt failed, or
    /// [`TransportError::NotConnected`] before the first.
    async fn should_reconnect(&self, attempt: u32, last_error: &TransportError) -> bool;

    /// How long to wait before attempt number `attempt`.
    async fn next_delay(&self, attempt: u32) -> Duration;

    /// The helper accepted a reconnect attempt.
    fn on_connected(&self);

    /// A reconnect attempt failed with `error`.
    fn on_disconnected(&self, error: &TransportError);

    /// Forget all history; the connection was opened explicitly.
    fn reset(&self);

    /// Name used in log fields.
    fn name(&self) -> &str;
}

/// What a strategy has seen since it was last reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReopenHistory {
    /// Attempts started
    pub attempts: u64,
    /// Attempts the helper accepted
    pub reopened: u64,
    /// Attempts that failed
    pub failed: u64,
    /// Failures since the last accepted attempt
    pub failure_streak: u32,
    /// Display text of the most recent failure
    pub last_failure: Option<String>,
}

impl ReopenHistory {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a started attempt.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Count an accepted attempt and end the failure streak.
    pub fn record_reopened(&mut self) {
        self.reopened += 1;
        self.failure_streak = 0;
        self.last_failure = None;
    }

    /// Count a failed attempt.
    pub fn record_failed(&mut self, error: &TransportError) {
        self.failed += 1;
        self.failure_streak += 1;
        self.last_failure = Some(error.to_string());
    }

    /// Back to empty.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
