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

//! Top-level error types for the bridge.
//!
//! The hierarchy has two layers below [`BridgeError`]:
//!
//! - [`TransportError`]: the socket to the helper failed
//! - [`ProtocolError`]: a frame could not be encoded or understood
//!
//! A timed-out request is not an error. [`Bridge::request`](crate::Bridge::request)
//! reports it as `Ok(None)`.

use crate::codec::CallId;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors in the frame protocol spoken with the helper.
///
/// Inbound protocol errors never reach callers; the connection logs them and
/// discards the frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An inbound frame was not a valid reply object.
    #[error("malformed reply frame {frame:?}: {source}")]
    Malformed {
        /// The JSON parse failure
        #[source]
        source: serde_json::Error,
        /// The offending frame text
        frame: String,
    },

    /// A broadcast frame did not name its key.
    #[error("broadcast frame is missing its key")]
    MissingBroadcastKey,

    /// An outbound frame did not have the expected field layout.
    #[error("malformed call frame {frame:?}: {reason}")]
    MalformedOutbound {
        /// The offending frame text
        frame: String,
        /// What was wrong with it
        reason: String,
    },

    /// A call class name that is not one of `sync`, `async`, `broadcast`, `status`.
    #[error("unknown call class {0:?}")]
    UnknownClass(String),

    /// A call id that is not a signed integer.
    #[error("invalid call id {0:?}")]
    InvalidCallId(String),
}

/// Errors returned by [`Bridge`](crate::Bridge) operations.
///
/// # Examples
///
/// ```rust
/// use helper_bridge::{BridgeError, TransportError};
///
/// let error: BridgeError = TransportError::NotConnected.into();
/// assert!(error.is_transport_error());
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The helper socket failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The caller abandoned the call before a reply arrived.
    #[error("call {call_id} was cancelled")]
    Cancelled {
        /// Id of the abandoned call
        call_id: CallId,
    },

    /// The connection task has stopped.
    #[error("bridge has shut down")]
    Shutdown,
}

impl BridgeError {
    /// Returns `true` if this is a transport-layer failure.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, BridgeError::Transport(_))
    }

    /// Returns `true` if retrying the operation later could succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            BridgeError::Transport(e) => e.is_recoverable(),
            BridgeError::Cancelled { .. } => true,
            BridgeError::Protocol(_) | BridgeError::Shutdown => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_conversion() {
        let error: BridgeError = TransportError::Closed.into();
        assert!(error.is_transport_error());
        assert!(!error.is_recoverable());
        assert_eq!(error.to_string(), "transport error: transport is closed");
    }

    #[test]
    fn test_protocol_conversion() {
        let error: BridgeError = ProtocolError::UnknownClass("later".into()).into();
        assert!(!error.is_transport_error());
        assert!(!error.is_recoverable());
        assert_eq!(
            error.to_string(),
            "protocol error: unknown call class \"later\""
        );
    }

    #[test]
    fn test_cancelled_is_recoverable() {
        let error = BridgeError::Cancelled { call_id: 12 };
        assert!(error.is_recoverable());
        assert_eq!(error.to_string(), "call 12 was cancelled");
    }

    #[test]
    fn test_malformed_keeps_frame() {
        let source = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let error = ProtocolError::Malformed {
            source,
            frame: "{oops".to_string(),
        };
        assert!(error.to_string().starts_with("malformed reply frame \"{oops\""));
    }
}
