//! No reconnection strategy.
//!
//! The bridge never reopens the helper connection on its own; only an explicit
//! `open` does.

use super::traits::ReconnectionStrategy;
use crate::transport::TransportError;
use async_trait::async_trait;
use std::time::Duration;

/// Never attempts to reconnect.
///
/// Requests made while the connection is down fail (sync) or time out
/// (fire-and-forget classes) until the application calls `open` again.
/// No attempt is ever made, so there is no history to keep.
///
/// # Examples
///
/// ```
/// use helper_bridge::reconnection::NoReconnect;
///
/// let strategy = NoReconnect::new();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl NoReconnect {
    /// Create a new no-reconnect strategy.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReconnectionStrategy for NoReconnect {
    async fn should_reconnect(&self, _attempt: u32, _last_error: &TransportError) -> bool {
        false
    }

    async fn next_delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }

    fn on_connected(&self) {}

    fn on_disconnected(&self, _error: &TransportError) {}

    fn reset(&self) {}

    fn name(&self) -> &str {
        "NoReconnect"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_never_reconnect() {
        let strategy = NoReconnect::new();
        let error = TransportError::connection_failed("ws://localhost:8888/api");

        assert!(!strategy.should_reconnect(0, &error).await);
        assert!(!strategy.should_reconnect(100, &error).await);
        assert!(!strategy.should_reconnect(0, &TransportError::NotConnected).await);
        assert_eq!(strategy.next_delay(0).await, Duration::ZERO);
    }
}
