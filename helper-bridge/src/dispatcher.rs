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

//! The request dispatcher.
//!
//! [`Bridge`] is the public handle. It is cheap to clone; every clone talks
//! to the same connection task. A request is sent by the task, which hands
//! back a waiter; the calling task then waits on that waiter for at most the
//! call's wait window.
//!
//! # Timeouts
//!
//! A call that runs out of budget resolves to `Ok(None)`. The budget comes
//! from the request or, by default, from the class:
//!
//! | Class       | Budget    | Wait window |
//! |-------------|-----------|-------------|
//! | `sync`      | 10 000 ms | 10 005 ms   |
//! | `async`     | 1 ms      | 5 ms        |
//! | `broadcast` | 1 ms      | 5 ms        |
//! | `status`    | 1 ms      | 5 ms        |
//!
//! See [`wait_window`](crate::config::wait_window) for how the window follows
//! from the budget.

use crate::broadcast::{BroadcastRouter, EventDispatch, NoDispatch};
use crate::codec::{CallClass, CallId, Reply};
use crate::config::{BridgeConfig, OpenParams};
use crate::connection::{Command, Connection, ConnectionState};
use crate::error::BridgeError;
use crate::observability::BridgeMetrics;
use crate::reconnection::{FixedDelay, ReconnectionStrategy};
use crate::transport::{Connector, TransportError};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// One call to the helper.
///
/// # Examples
///
/// ```rust
/// use helper_bridge::{CallClass, Request};
/// use std::time::Duration;
///
/// let request = Request::new("reset")
///     .with_target("module")
///     .with_class(CallClass::Async)
///     .with_timeout(Duration::from_millis(1000));
/// assert_eq!(request.class, CallClass::Async);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Opaque command text
    pub payload: String,
    /// Device to address; the configured default target if `None`
    pub target: Option<String>,
    /// Call class
    pub class: CallClass,
    /// Budget override; the class budget if `None`
    pub timeout: Option<Duration>,
}

impl Request {
    /// A [`CallClass::Sync`] call with default target and budget.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            target: None,
            class: CallClass::Sync,
            timeout: None,
        }
    }

    /// A [`CallClass::Status`] call.
    pub fn status(payload: impl Into<String>) -> Self {
        Self::new(payload).with_class(CallClass::Status)
    }

    /// Address `target`.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the call class.
    pub fn with_class(mut self, class: CallClass) -> Self {
        self.class = class;
        self
    }

    /// Override the budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A sent call the current task is waiting on.
///
/// Dropping it before it settles deregisters the waiter.
pub(crate) struct PendingCall {
    call_id: CallId,
    class: CallClass,
    target: Option<String>,
    window: Duration,
    waiter: oneshot::Receiver<Reply>,
    commands: mpsc::Sender<Command>,
    settled: bool,
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.settled
            && self
                .commands
                .try_send(Command::Cancel {
                    call_id: self.call_id,
                })
                .is_err()
        {
            // The next submit prunes the waiter instead.
            tracing::debug!(call_id = self.call_id, "cancel not queued for dropped call");
        }
    }
}

/// Handle to a bridge connection.
///
/// # Examples
///
/// ```rust,no_run
/// use helper_bridge::{Bridge, Request};
/// use helper_bridge::config::OpenParams;
///
/// # async fn example() -> Result<(), helper_bridge::BridgeError> {
/// let bridge = Bridge::builder().build()?;
/// if bridge.open(OpenParams::new().with_port(8888)).await? {
///     match bridge.request(Request::new("battery?").with_target("tello")).await? {
///         Some(reply) => println!("battery: {}", reply.message),
///         None => println!("no answer"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Bridge {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    config: Arc<BridgeConfig>,
    metrics: Arc<BridgeMetrics>,
    last_reply: Arc<Mutex<Option<Reply>>>,
}

impl Bridge {
    /// Start configuring a bridge.
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Open the helper connection.
    ///
    /// Fields missing from `params` keep the values last used. Any existing
    /// connection is closed first. Returns whether the connection became
    /// ready within the readiness timeout.
    pub async fn open(&self, params: OpenParams) -> Result<bool, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Open { params, reply }).await?;
        rx.await.map_err(|_| BridgeError::Shutdown)
    }

    /// Whether the connection is currently open.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<(), BridgeError> {
        let mut rx = self.state.clone();
        rx.wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| BridgeError::Shutdown)
    }

    /// Send `request` and wait for its reply.
    ///
    /// Returns `Ok(None)` if the budget runs out. If the connection is not
    /// open, a reconnect is attempted first.
    ///
    /// # Errors
    ///
    /// A [`CallClass::Sync`] call whose frame cannot be sent fails with
    /// [`BridgeError::Transport`]. Other classes resolve to `Ok(None)`
    /// instead.
    pub async fn request(&self, request: Request) -> Result<Option<Reply>, BridgeError> {
        match self.submit(request).await? {
            Some(call) => self.await_reply(call).await,
            None => Ok(None),
        }
    }

    /// Like [`request`](Self::request), but gives up with
    /// [`BridgeError::Cancelled`] as soon as `cancel` completes.
    pub async fn request_until<F>(
        &self,
        request: Request,
        cancel: F,
    ) -> Result<Option<Reply>, BridgeError>
    where
        F: Future<Output = ()>,
    {
        let Some(mut call) = self.submit(request).await? else {
            return Ok(None);
        };
        let call_id = call.call_id;

        tokio::select! {
            result = self.await_reply_ref(&mut call) => return result,
            () = cancel => {}
        }

        // The reply may have been handed over just before cancellation won.
        call.waiter.close();
        call.settled = true;
        if let Ok(reply) = call.waiter.try_recv() {
            return Ok(Some(self.resolved(&call, reply)));
        }

        self.cancel(call_id).await;
        tracing::info!(call_id, "call cancelled");
        Err(BridgeError::Cancelled { call_id })
    }

    /// Tell the helper a named broadcast happened.
    pub async fn announce_broadcast(
        &self,
        name: impl Into<String>,
    ) -> Result<Option<Reply>, BridgeError> {
        self.request(Request::new(name).with_class(CallClass::BroadcastSend))
            .await
    }

    /// Close the connection. Closing twice is harmless.
    pub async fn close(&self) -> Result<(), BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Close { reply }).await?;
        rx.await.map_err(|_| BridgeError::Shutdown)
    }

    /// Take a reply for `call_id` that arrived after its caller stopped
    /// waiting.
    pub async fn claim_unclaimed(&self, call_id: CallId) -> Result<Option<Reply>, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Claim { call_id, reply }).await?;
        let claimed = rx.await.map_err(|_| BridgeError::Shutdown)?;
        Ok(claimed.into_iter().next())
    }

    /// Number of replies nobody has claimed.
    pub async fn unclaimed_len(&self) -> Result<usize, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Unclaimed { reply }).await?;
        rx.await.map_err(|_| BridgeError::Shutdown)
    }

    /// The most recent reply returned to any caller.
    pub fn last_reply(&self) -> Option<Reply> {
        self.last_reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Activity counters.
    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    /// The configuration this bridge was built with.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    async fn command(&self, command: Command) -> Result<(), BridgeError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BridgeError::Shutdown)
    }

    async fn cancel(&self, call_id: CallId) {
        let _ = self.commands.send(Command::Cancel { call_id }).await;
    }

    async fn submit(&self, request: Request) -> Result<Option<PendingCall>, BridgeError> {
        let class = request.class;
        let window = self.config.wait_window_for(class, request.timeout);

        let (reply, rx) = oneshot::channel();
        self.command(Command::Submit { request, reply }).await?;

        match rx.await.map_err(|_| BridgeError::Shutdown)? {
            Ok(submitted) => Ok(Some(PendingCall {
                call_id: submitted.call_id,
                class,
                target: submitted.target,
                window,
                waiter: submitted.waiter,
                commands: self.commands.clone(),
                settled: false,
            })),
            Err(e) if class.is_fire_and_forget() => {
                self.metrics.record_timeout();
                tracing::warn!(class = %class, error = %e, "call not sent, resolving as timed out");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn await_reply(&self, mut call: PendingCall) -> Result<Option<Reply>, BridgeError> {
        self.await_reply_ref(&mut call).await
    }

    async fn await_reply_ref(
        &self,
        call: &mut PendingCall,
    ) -> Result<Option<Reply>, BridgeError> {
        let outcome = match tokio::time::timeout(call.window, &mut call.waiter).await {
            Ok(received) => received.map(Some),
            Err(_) => {
                // Replies sent from here on are buffered for claiming instead.
                call.waiter.close();
                Ok(call.waiter.try_recv().ok())
            }
        };
        call.settled = true;

        match outcome {
            Ok(Some(reply)) => Ok(Some(self.resolved(call, reply))),
            Err(_) => Err(BridgeError::Shutdown),
            Ok(None) => {
                self.cancel(call.call_id).await;
                self.metrics.record_timeout();
                tracing::info!(
                    call_id = call.call_id,
                    class = %call.class,
                    target = call.target.as_deref().unwrap_or_default(),
                    window = ?call.window,
                    "call timed out"
                );
                Ok(None)
            }
        }
    }

    fn resolved(&self, call: &PendingCall, reply: Reply) -> Reply {
        tracing::info!(
            call_id = call.call_id,
            class = %call.class,
            target = call.target.as_deref().unwrap_or_default(),
            result = reply.result,
            "call resolved"
        );
        *self
            .last_reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reply.clone());
        reply
    }
}

/// Builds a [`Bridge`] and starts its connection task.
///
/// # Examples
///
/// ```rust
/// use helper_bridge::{Bridge, BridgeConfig};
/// use helper_bridge::broadcast::HandlerRegistry;
/// use helper_bridge::reconnection::NoReconnect;
/// use helper_bridge::transport::MemoryConnector;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), helper_bridge::BridgeError> {
/// let (connector, _listener) = MemoryConnector::new();
/// let bridge = Bridge::builder()
///     .with_config(BridgeConfig::new())
///     .with_connector(connector)
///     .with_dispatch(HandlerRegistry::new())
///     .with_reconnection(Arc::new(NoReconnect::new()))
///     .build()?;
/// assert!(!bridge.is_open());
/// # Ok(())
/// # }
/// ```
pub struct BridgeBuilder {
    config: BridgeConfig,
    connector: Option<Arc<dyn Connector>>,
    dispatch: Arc<dyn EventDispatch>,
    reconnection: Arc<dyn ReconnectionStrategy>,
}

impl BridgeBuilder {
    /// Default configuration, WebSocket connector, no broadcast handlers and
    /// one reconnect attempt per request.
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            connector: None,
            dispatch: Arc::new(NoDispatch),
            reconnection: Arc::new(FixedDelay::single_attempt()),
        }
    }

    /// Use `config`.
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Connect through `connector` instead of the WebSocket connector.
    pub fn with_connector<C>(mut self, connector: C) -> Self
    where
        C: Connector + 'static,
    {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Deliver broadcasts to `dispatch`.
    pub fn with_dispatch<D>(mut self, dispatch: D) -> Self
    where
        D: EventDispatch + 'static,
    {
        self.dispatch = Arc::new(dispatch);
        self
    }

    /// Govern reconnects with `strategy`.
    pub fn with_reconnection(mut self, strategy: Arc<dyn ReconnectionStrategy>) -> Self {
        self.reconnection = strategy;
        self
    }

    /// Validate the configuration and spawn the connection task.
    ///
    /// # Errors
    ///
    /// Fails with [`TransportError::InvalidConfiguration`] if the
    /// configuration is invalid, no connector is available, or there is no
    /// Tokio runtime to spawn on.
    pub fn build(self) -> Result<Bridge, BridgeError> {
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            TransportError::invalid_configuration("a bridge must be built inside a Tokio runtime")
        })?;
        let connector = match self.connector {
            Some(connector) => connector,
            None => default_connector()?,
        };

        let config = Arc::new(self.config);
        let metrics = Arc::new(BridgeMetrics::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (commands, command_rx) = mpsc::channel(config.command_buffer);

        let connection = Connection::new(
            config.clone(),
            connector,
            self.reconnection,
            BroadcastRouter::new(self.dispatch),
            metrics.clone(),
            state_tx,
        );
        runtime.spawn(connection.run(command_rx));

        tracing::debug!(url = %config.connection.url(), "bridge started");
        Ok(Bridge {
            commands,
            state: state_rx,
            config,
            metrics,
            last_reply: Arc::new(Mutex::new(None)),
        })
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "websocket")]
fn default_connector() -> Result<Arc<dyn Connector>, TransportError> {
    Ok(Arc::new(crate::transport::WebSocketConnector::default()))
}

#[cfg(not(feature = "websocket"))]
fn default_connector() -> Result<Arc<dyn Connector>, TransportError> {
    Err(TransportError::invalid_configuration(
        "no connector configured and the websocket feature is disabled",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameLayout;
    use crate::transport::{MemoryConnector, MemoryListener, MemoryPeer};

    async fn open_bridge() -> (Bridge, MemoryListener, MemoryPeer) {
        let (connector, mut listener) = MemoryConnector::new();
        let bridge = Bridge::builder().with_connector(connector).build().unwrap();
        assert!(bridge.open(OpenParams::new()).await.unwrap());
        let peer = listener.accept().await.unwrap();
        (bridge, listener, peer)
    }

    #[test]
    fn test_request_builders() {
        let request = Request::status("battery?").with_target("tello");
        assert_eq!(request.class, CallClass::Status);
        assert_eq!(request.target.as_deref(), Some("tello"));
        assert_eq!(request.timeout, None);
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let (connector, _listener) = MemoryConnector::new();
        let result = Bridge::builder().with_connector(connector).build();
        assert!(matches!(
            result,
            Err(BridgeError::Transport(TransportError::InvalidConfiguration { .. }))
        ));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let (connector, _listener) = MemoryConnector::new();
        let result = Bridge::builder()
            .with_config(BridgeConfig::new().with_poll_interval(Duration::ZERO))
            .with_connector(connector)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_request_records_last_reply() {
        let (bridge, _listener, mut peer) = open_bridge().await;
        assert!(bridge.last_reply().is_none());

        let responder = tokio::spawn(async move {
            let call = peer.recv_call(FrameLayout::Targeted).await.unwrap().unwrap();
            peer.answer(&call, "ok");
            peer
        });

        let reply = bridge.request(Request::new("ping")).await.unwrap().unwrap();
        assert_eq!(reply.message, "ok");
        assert_eq!(bridge.last_reply(), Some(reply));
        drop(responder.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_request_deregisters_waiter() {
        let (bridge, _listener, mut peer) = open_bridge().await;

        let pending = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.request(Request::new("slow")).await }
        });
        let call = peer.recv_call(FrameLayout::Targeted).await.unwrap().unwrap();
        pending.abort();
        let _ = pending.await;

        // The reply now lands in the table instead of a dead waiter.
        peer.answer(&call, "late");
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(bridge.unclaimed_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_state() {
        let (bridge, _listener, _peer) = open_bridge().await;
        bridge.wait_for_state(ConnectionState::Open).await.unwrap();
        bridge.close().await.unwrap();
        bridge.wait_for_state(ConnectionState::Closed).await.unwrap();
        assert!(!bridge.is_open());
    }
}
