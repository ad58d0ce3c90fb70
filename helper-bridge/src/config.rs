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

//! Bridge configuration.
//!
//! [`BridgeConfig`] collects everything the bridge needs before it connects:
//! where the helper listens, how frames are laid out, the per-class timeout
//! budgets and the intervals that shape waiting.
//!
//! # Examples
//!
//! ```rust
//! use helper_bridge::config::{BridgeConfig, ConnectionParams};
//! use helper_bridge::codec::FrameLayout;
//! use std::time::Duration;
//!
//! let config = BridgeConfig::new()
//!     .with_connection(ConnectionParams::new("localhost", 9000, "api"))
//!     .with_layout(FrameLayout::Untargeted)
//!     .with_readiness_timeout(Duration::from_secs(2));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.connection.url(), "ws://localhost:9000/api");
//! ```

use crate::codec::{CallClass, FrameLayout};
use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default helper host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default helper port.
pub const DEFAULT_PORT: u16 = 8888;

/// Default helper endpoint path.
pub const DEFAULT_ENDPOINT: &str = "api";

/// Target used for targeted calls that do not name one.
pub const DEFAULT_TARGET: &str = "module";

/// Where the helper listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Path segment after the port, without the leading `/`
    pub endpoint: String,
}

impl ConnectionParams {
    /// Creates connection parameters.
    pub fn new(host: impl Into<String>, port: u16, endpoint: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    /// WebSocket URL for these parameters.
    pub fn url(&self) -> String {
        format!(
            "ws://{}:{}/{}",
            self.host,
            self.port,
            self.endpoint.trim_start_matches('/')
        )
    }

    /// Overwrite the fields `overrides` provides; keep the rest.
    pub fn apply(&mut self, overrides: &OpenParams) {
        if let Some(host) = &overrides.host {
            self.host.clone_from(host);
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(endpoint) = &overrides.endpoint {
            self.endpoint.clone_from(endpoint);
        }
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, DEFAULT_ENDPOINT)
    }
}

/// Partial connection parameters passed to [`Bridge::open`](crate::Bridge::open).
///
/// Omitted fields fall back to the last parameters the bridge used.
///
/// ```rust
/// use helper_bridge::config::{ConnectionParams, OpenParams};
///
/// let mut params = ConnectionParams::default();
/// params.apply(&OpenParams::new().with_port(9001));
/// assert_eq!(params.url(), "ws://localhost:9001/api");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenParams {
    /// Host override
    pub host: Option<String>,
    /// Port override
    pub port: Option<u16>,
    /// Endpoint override
    pub endpoint: Option<String>,
}

impl OpenParams {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Override the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Override the endpoint path.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

impl From<ConnectionParams> for OpenParams {
    fn from(params: ConnectionParams) -> Self {
        Self {
            host: Some(params.host),
            port: Some(params.port),
            endpoint: Some(params.endpoint),
        }
    }
}

/// Per-class reply budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Budget for [`CallClass::Sync`]
    pub sync: Duration,
    /// Budget for [`CallClass::Async`]
    pub asynchronous: Duration,
    /// Budget for [`CallClass::BroadcastSend`]
    pub broadcast: Duration,
    /// Budget for [`CallClass::Status`]
    pub status: Duration,
}

impl TimeoutPolicy {
    /// Budget for a call of `class`.
    pub fn budget_for(&self, class: CallClass) -> Duration {
        match class {
            CallClass::Sync => self.sync,
            CallClass::Async => self.asynchronous,
            CallClass::BroadcastSend => self.broadcast,
            CallClass::Status => self.status,
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            sync: Duration::from_millis(10_000),
            asynchronous: Duration::from_millis(1),
            broadcast: Duration::from_millis(1),
            status: Duration::from_millis(1),
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Initial connection parameters
    pub connection: ConnectionParams,
    /// Outbound frame layout
    pub layout: FrameLayout,
    /// Target written into targeted frames that do not name one
    pub default_target: Option<String>,
    /// Per-class reply budgets
    pub timeouts: TimeoutPolicy,
    /// Granularity of the timeout schedule
    pub poll_interval: Duration,
    /// How long `open` waits for the connection to become ready
    pub readiness_timeout: Duration,
    /// Capacity of the command channel into the connection task
    pub command_buffer: usize,
}

impl BridgeConfig {
    /// Defaults: `ws://localhost:8888/api`, targeted frames, target `module`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial connection parameters.
    pub fn with_connection(mut self, connection: ConnectionParams) -> Self {
        self.connection = connection;
        self
    }

    /// Set the outbound frame layout.
    pub fn with_layout(mut self, layout: FrameLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set or clear the default target.
    pub fn with_default_target(mut self, target: Option<String>) -> Self {
        self.default_target = target;
        self
    }

    /// Set the timeout policy.
    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the timeout schedule granularity.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the readiness timeout for `open`.
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Set the command channel capacity.
    pub fn with_command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity;
        self
    }

    /// Check the configuration for values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.connection.host.is_empty() {
            return Err(TransportError::invalid_configuration("host must not be empty"));
        }
        if self.connection.port == 0 {
            return Err(TransportError::invalid_configuration("port must be non-zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(TransportError::invalid_configuration(
                "poll interval must be non-zero",
            ));
        }
        if self.readiness_timeout.is_zero() {
            return Err(TransportError::invalid_configuration(
                "readiness timeout must be non-zero",
            ));
        }
        if self.command_buffer == 0 {
            return Err(TransportError::invalid_configuration(
                "command buffer must hold at least one command",
            ));
        }
        Ok(())
    }

    /// How long a call of `class` waits, given an optional explicit budget.
    pub fn wait_window_for(&self, class: CallClass, budget: Option<Duration>) -> Duration {
        let budget = budget.unwrap_or_else(|| self.timeouts.budget_for(class));
        wait_window(budget, self.poll_interval)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionParams::default(),
            layout: FrameLayout::default(),
            default_target: Some(DEFAULT_TARGET.to_string()),
            timeouts: TimeoutPolicy::default(),
            poll_interval: Duration::from_millis(5),
            readiness_timeout: Duration::from_millis(5_000),
            command_buffer: 64,
        }
    }
}

/// Length of the wait for a reply with `budget`, checked every `interval`.
///
/// The call gives up at the first tick where the budget, reduced by one
/// interval per tick, drops below zero. That is one tick past the last
/// whole interval that fits in the budget.
///
/// ```rust
/// use helper_bridge::config::wait_window;
/// use std::time::Duration;
///
/// let tick = Duration::from_millis(5);
/// assert_eq!(wait_window(Duration::from_millis(10_000), tick), Duration::from_millis(10_005));
/// assert_eq!(wait_window(Duration::from_millis(1), tick), Duration::from_millis(5));
/// ```
pub fn wait_window(budget: Duration, interval: Duration) -> Duration {
    if interval.is_zero() {
        return budget;
    }
    let ticks = budget.as_nanos() / interval.as_nanos() + 1;
    interval.saturating_mul(u32::try_from(ticks).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.connection.url(), "ws://localhost:8888/api");
        assert_eq!(config.default_target.as_deref(), Some("module"));
        assert_eq!(config.layout, FrameLayout::Targeted);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.readiness_timeout, Duration::from_millis(5000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_policy_defaults() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.budget_for(CallClass::Sync), Duration::from_millis(10_000));
        assert_eq!(policy.budget_for(CallClass::Async), Duration::from_millis(1));
        assert_eq!(policy.budget_for(CallClass::BroadcastSend), Duration::from_millis(1));
        assert_eq!(policy.budget_for(CallClass::Status), Duration::from_millis(1));
    }

    #[test]
    fn test_apply_partial_overrides() {
        let mut params = ConnectionParams::default();
        params.apply(&OpenParams::new().with_host("10.0.0.2"));
        assert_eq!(params.url(), "ws://10.0.0.2:8888/api");

        params.apply(&OpenParams::new().with_endpoint("/mesh").with_port(7000));
        assert_eq!(params.url(), "ws://10.0.0.2:7000/mesh");

        params.apply(&OpenParams::new());
        assert_eq!(params.url(), "ws://10.0.0.2:7000/mesh");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(BridgeConfig::new()
            .with_poll_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(BridgeConfig::new()
            .with_command_buffer(0)
            .validate()
            .is_err());
        assert!(BridgeConfig::new()
            .with_connection(ConnectionParams::new("", 1, "api"))
            .validate()
            .is_err());
        assert!(BridgeConfig::new()
            .with_connection(ConnectionParams::new("h", 0, "api"))
            .validate()
            .is_err());
    }

    #[test]
    fn test_wait_window() {
        let tick = Duration::from_millis(5);
        assert_eq!(wait_window(Duration::ZERO, tick), tick);
        assert_eq!(wait_window(Duration::from_millis(5), tick), Duration::from_millis(10));
        assert_eq!(wait_window(Duration::from_millis(7), tick), Duration::from_millis(10));
        assert_eq!(wait_window(Duration::from_millis(3), Duration::ZERO), Duration::from_millis(3));
    }

    #[test]
    fn test_wait_window_for_explicit_budget() {
        let config = BridgeConfig::new();
        assert_eq!(
            config.wait_window_for(CallClass::Async, Some(Duration::from_millis(1000))),
            Duration::from_millis(1005)
        );
        assert_eq!(
            config.wait_window_for(CallClass::Sync, None),
            Duration::from_millis(10_005)
        );
    }

    #[test]
    fn test_connection_params_serde() {
        let params: ConnectionParams =
            serde_json::from_str(r#"{"host":"h","port":1,"endpoint":"e"}"#).unwrap();
        assert_eq!(params.url(), "ws://h:1/e");
    }
}
