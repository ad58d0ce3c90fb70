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

#![doc = include_str!("../../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! ## Architecture
//!
//! - **[`codec`]**: outbound call frames and inbound reply classification
//! - **[`correlation`]**: the ordered table of unclaimed replies
//! - **[`connection`]**: the task that owns the socket and all call state
//! - **[`dispatcher`]**: the [`Bridge`] handle, requests and timeouts
//! - **[`broadcast`]**: delivery of helper broadcasts to application handlers
//! - **[`transport`]**: WebSocket and in-memory connections to the helper
//! - **[`reconnection`]**: how a dropped connection is reopened
//! - **[`observability`]**: activity counters
//! - **[`config`]**: endpoints, budgets and intervals
//! - **[`error`]**: the error hierarchy
//!
//! ## Logging
//!
//! The crate logs through [`tracing`] and never installs a subscriber. Sends,
//! resolutions and connection changes are logged at `info`; malformed frames,
//! transport failures and reconnects at `warn`; state transitions and
//! suppressed errors at `debug`.

pub mod broadcast;
pub mod codec;
pub mod config;
pub mod connection;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod observability;
pub mod reconnection;
pub mod transport;

pub use broadcast::{EventDispatch, HandlerRegistry};
pub use codec::{CallClass, CallId, FrameLayout, Reply};
pub use config::{BridgeConfig, ConnectionParams, OpenParams, TimeoutPolicy};
pub use connection::ConnectionState;
pub use dispatcher::{Bridge, BridgeBuilder, Request};
pub use error::{BridgeError, ProtocolError};
pub use observability::{BridgeMetrics, MetricsSnapshot};
pub use transport::TransportError;
