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

//! Bridge activity counters.
//!
//! [`BridgeMetrics`] is shared between a [`Bridge`](crate::Bridge) and its
//! connection task. Counters are always kept as atomics. With the
//! `observability` feature each increment is also reported through the
//! [`metrics`](https://docs.rs/metrics) facade under `helper_bridge.*` names.
//!
//! # Example
//!
//! ```rust
//! use helper_bridge::observability::BridgeMetrics;
//!
//! let metrics = BridgeMetrics::new();
//! metrics.record_frame_sent();
//! metrics.record_timeout();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.frames_sent, 1);
//! assert_eq!(snapshot.timeouts, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! counters {
    ($( $(#[$doc:meta])* $field:ident => $record:ident, $name:literal; )*) => {
        /// Atomic counters describing bridge activity.
        #[derive(Debug, Default)]
        pub struct BridgeMetrics {
            $( $field: AtomicU64, )*
        }

        /// Point-in-time copy of [`BridgeMetrics`].
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct MetricsSnapshot {
            $( $(#[$doc])* pub $field: u64, )*
        }

        impl BridgeMetrics {
            $(
                #[doc = concat!("Increment `", stringify!($field), "`.")]
                pub fn $record(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                    #[cfg(feature = "observability")]
                    metrics::counter!($name).increment(1);
                }
            )*

            /// Copy every counter.
            pub fn snapshot(&self) -> MetricsSnapshot {
                MetricsSnapshot {
                    $( $field: self.$field.load(Ordering::Relaxed), )*
                }
            }

            /// Zero every counter.
            pub fn reset(&self) {
                $( self.$field.store(0, Ordering::Relaxed); )*
            }
        }
    };
}

counters! {
    /// Call frames written to the helper
    frames_sent => record_frame_sent, "helper_bridge.frames.sent";
    /// Call frames that could not be written
    send_failures => record_send_failure, "helper_bridge.frames.send_failures";
    /// Correlatable replies received
    replies_received => record_reply_received, "helper_bridge.replies.received";
    /// Replies handed to a waiting caller
    replies_delivered => record_reply_delivered, "helper_bridge.replies.delivered";
    /// Calls that ran out of budget
    timeouts => record_timeout, "helper_bridge.calls.timeouts";
    /// Notifications received and dropped
    notifications => record_notification, "helper_bridge.notifications";
    /// Broadcasts a handler accepted
    broadcasts_routed => record_broadcast_routed, "helper_bridge.broadcasts.routed";
    /// Broadcasts with no registered handler
    broadcasts_unhandled => record_broadcast_unhandled, "helper_bridge.broadcasts.unhandled";
    /// Inbound frames that failed to parse
    malformed_frames => record_malformed_frame, "helper_bridge.frames.malformed";
    /// Connections that became ready
    connections_opened => record_connection_opened, "helper_bridge.connections.opened";
    /// Connections closed or lost
    connections_closed => record_connection_closed, "helper_bridge.connections.closed";
    /// Reconnect maneuvers started
    reconnect_attempts => record_reconnect_attempt, "helper_bridge.reconnects.attempted";
    /// Reconnect maneuvers that gave up
    reconnect_failures => record_reconnect_failure, "helper_bridge.reconnects.failed";
}

impl BridgeMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSnapshot {
    /// Connections opened minus connections closed.
    pub fn active_connections(&self) -> u64 {
        self.connections_opened
            .saturating_sub(self.connections_closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        assert_eq!(BridgeMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_and_reset() {
        let metrics = BridgeMetrics::new();
        metrics.record_reply_received();
        metrics.record_reply_received();
        metrics.record_reply_delivered();
        metrics.record_malformed_frame();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.replies_received, 2);
        assert_eq!(snapshot.replies_delivered, 1);
        assert_eq!(snapshot.malformed_frames, 1);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_active_connections() {
        let metrics = BridgeMetrics::new();
        metrics.record_connection_opened();
        metrics.record_connection_opened();
        metrics.record_connection_closed();
        assert_eq!(metrics.snapshot().active_connections(), 1);
    }
}
