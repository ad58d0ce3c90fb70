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

//! Frame codec for the helper wire protocol.
//!
//! Outbound calls are a single colon-separated text frame:
//!
//! ```text
//! <callId>:<target>:<class>:<payload>    (FrameLayout::Targeted)
//! <callId>:<class>:<payload>             (FrameLayout::Untargeted)
//! ```
//!
//! Inbound frames are JSON objects `{"commID", "result", "message", "key"?}`.
//! The call id selects how a frame is handled:
//!
//! | `commID` | `message`     | Meaning                                  |
//! |----------|---------------|------------------------------------------|
//! | `-1`     | `"broadcast"` | [`Inbound::Broadcast`], routed by `key`  |
//! | `0`      | any           | [`Inbound::Notification`], dropped       |
//! | other    | any           | [`Inbound::Reply`], correlated by id     |

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signed call identifier carried as `commID`.
pub type CallId = i64;

/// Reserved id marking an inbound broadcast.
pub const BROADCAST_CALL_ID: CallId = -1;

/// Reserved id marking an unsolicited helper notification.
pub const NOTIFICATION_CALL_ID: CallId = 0;

/// `message` value that, with [`BROADCAST_CALL_ID`], marks a broadcast.
pub const BROADCAST_MESSAGE: &str = "broadcast";

/// How the helper should treat a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallClass {
    /// Wait for a reply.
    #[default]
    Sync,
    /// Fire and forget.
    Async,
    /// Announce a named broadcast to the helper.
    #[serde(rename = "broadcast")]
    BroadcastSend,
    /// Read a status value; answered almost immediately.
    Status,
}

impl CallClass {
    /// Wire name of the class.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallClass::Sync => "sync",
            CallClass::Async => "async",
            CallClass::BroadcastSend => "broadcast",
            CallClass::Status => "status",
        }
    }

    /// Whether a caller of this class is shielded from transport failures.
    ///
    /// Everything except [`CallClass::Sync`] resolves to the timeout sentinel
    /// when the frame cannot be sent.
    pub fn is_fire_and_forget(&self) -> bool {
        !matches!(self, CallClass::Sync)
    }
}

impl fmt::Display for CallClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallClass {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(CallClass::Sync),
            "async" => Ok(CallClass::Async),
            "broadcast" => Ok(CallClass::BroadcastSend),
            "status" => Ok(CallClass::Status),
            other => Err(ProtocolError::UnknownClass(other.to_string())),
        }
    }
}

/// Field layout of outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameLayout {
    /// `<callId>:<target>:<class>:<payload>`
    #[default]
    Targeted,
    /// `<callId>:<class>:<payload>`
    Untargeted,
}

/// A call as it travels to the helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Correlation id
    pub call_id: CallId,
    /// Device the helper should address
    pub target: Option<String>,
    /// Call class
    pub class: CallClass,
    /// Opaque command text; may contain `:`
    pub payload: String,
}

impl OutboundFrame {
    /// Render the frame as wire text.
    ///
    /// Under [`FrameLayout::Targeted`] a missing target is written as an
    /// empty field. Under [`FrameLayout::Untargeted`] the target is ignored.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use helper_bridge::codec::{CallClass, FrameLayout, OutboundFrame};
    ///
    /// let frame = OutboundFrame {
    ///     call_id: 42,
    ///     target: Some("tello".to_string()),
    ///     class: CallClass::Sync,
    ///     payload: "battery?".to_string(),
    /// };
    /// assert_eq!(frame.encode(FrameLayout::Targeted), "42:tello:sync:battery?");
    /// assert_eq!(frame.encode(FrameLayout::Untargeted), "42:sync:battery?");
    /// ```
    pub fn encode(&self, layout: FrameLayout) -> String {
        match layout {
            FrameLayout::Targeted => format!(
                "{}:{}:{}:{}",
                self.call_id,
                self.target.as_deref().unwrap_or_default(),
                self.class,
                self.payload
            ),
            FrameLayout::Untargeted => {
                format!("{}:{}:{}", self.call_id, self.class, self.payload)
            }
        }
    }

    /// Parse wire text back into a frame. This is the helper's side of the
    /// protocol and is used by fakes and test helpers.
    pub fn decode(text: &str, layout: FrameLayout) -> Result<Self, ProtocolError> {
        let fields = match layout {
            FrameLayout::Targeted => 4,
            FrameLayout::Untargeted => 3,
        };
        let parts: Vec<&str> = text.splitn(fields, ':').collect();
        if parts.len() != fields {
            return Err(ProtocolError::MalformedOutbound {
                frame: text.to_string(),
                reason: format!("expected {fields} fields, found {}", parts.len()),
            });
        }

        let call_id = parts[0]
            .parse::<CallId>()
            .map_err(|_| ProtocolError::InvalidCallId(parts[0].to_string()))?;

        let (target, class, payload) = match layout {
            FrameLayout::Targeted => {
                let target = (!parts[1].is_empty()).then(|| parts[1].to_string());
                (target, parts[2], parts[3])
            }
            FrameLayout::Untargeted => (None, parts[1], parts[2]),
        };

        Ok(Self {
            call_id,
            target,
            class: class.parse()?,
            payload: payload.to_string(),
        })
    }
}

/// A JSON reply frame from the helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Correlation id, or one of the reserved ids
    #[serde(rename = "commID")]
    pub call_id: CallId,
    /// Whether the helper considered the call successful
    #[serde(default)]
    pub result: bool,
    /// Reply payload
    #[serde(default)]
    pub message: String,
    /// Broadcast key; only meaningful on broadcast frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Reply {
    /// A reply to `call_id`.
    pub fn new(call_id: CallId, result: bool, message: impl Into<String>) -> Self {
        Self {
            call_id,
            result,
            message: message.into(),
            key: None,
        }
    }

    /// A broadcast frame for `key`.
    pub fn broadcast(key: impl Into<String>) -> Self {
        Self {
            call_id: BROADCAST_CALL_ID,
            result: true,
            message: BROADCAST_MESSAGE.to_string(),
            key: Some(key.into()),
        }
    }

    /// An unsolicited notification.
    pub fn notification(message: impl Into<String>) -> Self {
        Self::new(NOTIFICATION_CALL_ID, true, message)
    }

    /// Serialize as wire JSON.
    pub fn to_json(&self) -> String {
        // Plain string/bool/int fields cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Result of classifying one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Out-of-band broadcast for the router
    Broadcast {
        /// Broadcast name
        key: String,
    },
    /// Unsolicited helper message; never delivered to callers
    Notification(Reply),
    /// A reply that correlates with a call
    Reply(Reply),
}

/// Parse and classify an inbound text frame.
///
/// # Examples
///
/// ```rust
/// use helper_bridge::codec::{classify, Inbound};
///
/// let frame = r#"{"commID":-1,"result":true,"message":"broadcast","key":"takeoff"}"#;
/// assert_eq!(classify(frame).unwrap(), Inbound::Broadcast { key: "takeoff".into() });
/// ```
pub fn classify(text: &str) -> Result<Inbound, ProtocolError> {
    let reply: Reply = serde_json::from_str(text).map_err(|source| ProtocolError::Malformed {
        source,
        frame: text.to_string(),
    })?;

    match reply.call_id {
        BROADCAST_CALL_ID if reply.message == BROADCAST_MESSAGE => match reply.key {
            Some(key) => Ok(Inbound::Broadcast { key }),
            None => Err(ProtocolError::MissingBroadcastKey),
        },
        NOTIFICATION_CALL_ID => Ok(Inbound::Notification(reply)),
        _ => Ok(Inbound::Reply(reply)),
    }
}
