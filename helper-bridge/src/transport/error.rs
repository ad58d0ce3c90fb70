//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Transport layer error types.
//!
//! Transport errors are the lowest level of the bridge's error hierarchy. They
//! describe failures of the socket to the helper process: it could not be
//! reached, it went away, it never became ready, or it was used while closed.
//!
//! # Recovery
//!
//! A transport error drops the affected socket and moves the connection to
//! `Closed`. The next request runs the reconnect maneuver.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur talking to the helper socket.
///
/// # Examples
///
/// ```rust
/// use helper_bridge::transport::TransportError;
/// use std::io;
///
/// let error = TransportError::ConnectionFailed {
///     address: "ws://localhost:8888/api".to_string(),
///     source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
/// };
///
/// if error.is_recoverable() {
///     println!("helper may come back");
/// }
/// ```
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to establish a connection to the helper.
    #[error("failed to connect to {address}: {source}")]
    ConnectionFailed {
        /// The endpoint that failed to connect
        address: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// An established connection was lost.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// Description of why the connection was lost
        reason: String,
        /// The underlying I/O error, if available
        #[source]
        source: Option<io::Error>,
    },

    /// The connection did not become ready in time.
    #[error("operation timed out after {duration:?}")]
    Timeout {
        /// The duration that was exceeded
        duration: Duration,
    },

    /// Invalid bridge or transport configuration.
    ///
    /// Not recoverable; indicates a programming error.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the configuration error
        reason: String,
    },

    /// The transport was explicitly closed.
    #[error("transport is closed")]
    Closed,

    /// A frame was sent while the connection was not open.
    #[error("transport is not connected")]
    NotConnected,

    /// An unexpected I/O error occurred.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// WebSocket protocol or handshake error.
    #[cfg(feature = "websocket")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl TransportError {
    /// Returns `true` if a later reconnect could plausibly succeed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use helper_bridge::transport::TransportError;
    ///
    /// assert!(TransportError::NotConnected.is_recoverable());
    /// assert!(!TransportError::Closed.is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        match self {
            TransportError::ConnectionFailed { .. }
            | TransportError::ConnectionLost { .. }
            | TransportError::Timeout { .. }
            | TransportError::NotConnected => true,

            TransportError::Io { source } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),

            #[cfg(feature = "websocket")]
            TransportError::WebSocket(e) => {
                use tokio_tungstenite::tungstenite::Error as WsError;
                matches!(
                    e,
                    WsError::Io(_) | WsError::ConnectionClosed | WsError::AlreadyClosed
                )
            }

            TransportError::InvalidConfiguration { .. } | TransportError::Closed => false,
        }
    }

    /// Shorthand for a `ConnectionLost` without an I/O source.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        TransportError::ConnectionLost {
            reason: reason.into(),
            source: None,
        }
    }

    /// Shorthand for an `InvalidConfiguration` error.
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        TransportError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create a connection refused error for testing.
    #[cfg(test)]
    pub(crate) fn connection_failed(address: impl Into<String>) -> Self {
        TransportError::ConnectionFailed {
            address: address.into(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        TransportError::Io { source: error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failed_is_recoverable() {
        let error = TransportError::connection_failed("ws://localhost:8888/api");
        assert!(error.is_recoverable());
        assert!(error.to_string().contains("ws://localhost:8888/api"));
    }

    #[test]
    fn test_timeout_is_recoverable() {
        let error = TransportError::Timeout {
            duration: Duration::from_millis(5000),
        };
        assert!(error.is_recoverable());
        assert_eq!(error.to_string(), "operation timed out after 5s");
    }

    #[test]
    fn test_invalid_configuration_not_recoverable() {
        let error = TransportError::invalid_configuration("port must be non-zero");
        assert!(!error.is_recoverable());
        assert_eq!(
            error.to_string(),
            "invalid configuration: port must be non-zero"
        );
    }

    #[test]
    fn test_closed_not_recoverable() {
        assert!(!TransportError::Closed.is_recoverable());
    }

    #[test]
    fn test_io_error_transience() {
        let transient: TransportError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        let fatal: TransportError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(transient.is_recoverable());
        assert!(!fatal.is_recoverable());
    }

    #[test]
    fn test_connection_lost_has_no_source() {
        let error = TransportError::connection_lost("helper exited");
        assert!(matches!(
            error,
            TransportError::ConnectionLost { source: None, .. }
        ));
    }
}
