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

//! The connection task.
//!
//! One task per bridge owns the helper socket and everything that changes
//! with it: lifecycle state, the call-id counter, the correlation table and
//! the waiters of outstanding calls. [`Bridge`](crate::Bridge) handles talk
//! to it over a command channel; inbound frames are read in the same
//! `select!` loop, so no state is ever shared behind a lock.
//!
//! Commands are handled one at a time. A reconnect started by one request
//! therefore finishes before any other command is looked at, and concurrent
//! callers observe its outcome instead of starting their own.

use crate::broadcast::BroadcastRouter;
use crate::codec::{CallId, FrameLayout, Inbound, OutboundFrame, Reply, classify};
use crate::config::{BridgeConfig, ConnectionParams, OpenParams};
use crate::correlation::{CorrelationTable, PendingCalls};
use crate::dispatcher::Request;
use crate::observability::BridgeMetrics;
use crate::reconnection::ReconnectionStrategy;
use crate::transport::{Connector, FrameTransport, TransportError};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Lifecycle of the helper connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Never opened.
    #[default]
    Idle,
    /// Waiting for the helper to accept.
    Connecting,
    /// Ready to carry frames.
    Open,
    /// Shutting down.
    Closing,
    /// Closed, refused or lost.
    Closed,
}

impl ConnectionState {
    /// Lowercase name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }

    /// Whether frames may be sent.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call the connection task has sent and is waiting on.
#[derive(Debug)]
pub(crate) struct Submitted {
    pub(crate) call_id: CallId,
    pub(crate) target: Option<String>,
    pub(crate) waiter: oneshot::Receiver<Reply>,
}

/// Requests from [`Bridge`](crate::Bridge) handles.
#[derive(Debug)]
pub(crate) enum Command {
    Open {
        params: OpenParams,
        reply: oneshot::Sender<bool>,
    },
    Submit {
        request: Request,
        reply: oneshot::Sender<Result<Submitted, TransportError>>,
    },
    Cancel {
        call_id: CallId,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    Claim {
        call_id: CallId,
        reply: oneshot::Sender<Vec<Reply>>,
    },
    Unclaimed {
        reply: oneshot::Sender<usize>,
    },
}

pub(crate) struct Connection {
    config: Arc<BridgeConfig>,
    params: ConnectionParams,
    connector: Arc<dyn Connector>,
    strategy: Arc<dyn ReconnectionStrategy>,
    router: BroadcastRouter,
    metrics: Arc<BridgeMetrics>,
    state: watch::Sender<ConnectionState>,
    transport: Option<Box<dyn FrameTransport>>,
    table: CorrelationTable,
    pending: PendingCalls,
    next_call_id: CallId,
}

impl Connection {
    pub(crate) fn new(
        config: Arc<BridgeConfig>,
        connector: Arc<dyn Connector>,
        strategy: Arc<dyn ReconnectionStrategy>,
        router: BroadcastRouter,
        metrics: Arc<BridgeMetrics>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            params: config.connection.clone(),
            config,
            connector,
            strategy,
            router,
            metrics,
            state,
            transport: None,
            table: CorrelationTable::new(),
            pending: PendingCalls::new(),
            next_call_id: 0,
        }
    }

    /// Serve commands and inbound frames until every handle is dropped.
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                frame = next_frame(&mut self.transport) => self.on_frame(frame),
            }
        }

        self.close().await;
        tracing::debug!(pending = self.pending.len(), "connection task stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Open { params, reply } => {
                let opened = self.open(&params).await;
                let _ = reply.send(opened);
            }
            Command::Submit { request, reply } => {
                let result = self.submit(request).await;
                if let Err(Ok(submitted)) = reply.send(result) {
                    // The caller went away while we were sending.
                    self.pending.cancel(submitted.call_id);
                }
            }
            Command::Cancel { call_id } => {
                self.pending.cancel(call_id);
            }
            Command::Close { reply } => {
                self.close().await;
                let _ = reply.send(());
            }
            Command::Claim { call_id, reply } => {
                let _ = reply.send(self.table.claim(call_id));
            }
            Command::Unclaimed { reply } => {
                let _ = reply.send(self.table.len());
            }
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "connection state changed");
        }
    }

    async fn open(&mut self, overrides: &OpenParams) -> bool {
        self.params.apply(overrides);
        self.close().await;

        match self.establish().await {
            Ok(()) => {
                self.strategy.reset();
                true
            }
            Err(e) => {
                tracing::warn!(url = %self.params.url(), error = %e, "failed to open helper connection");
                false
            }
        }
    }

    async fn establish(&mut self) -> Result<(), TransportError> {
        self.set_state(ConnectionState::Connecting);

        let budget = self.config.readiness_timeout;
        let connected =
            match tokio::time::timeout(budget, self.connector.connect(&self.params)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout { duration: budget }),
            };

        match connected {
            Ok(transport) => {
                tracing::info!(
                    url = %self.params.url(),
                    kind = transport.kind(),
                    "helper connection open"
                );
                self.transport = Some(transport);
                self.metrics.record_connection_opened();
                self.set_state(ConnectionState::Open);
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Closed);
                Err(e)
            }
        }
    }

    /// Shut the transport down. Errors are logged and otherwise ignored.
    async fn close(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            if self.current_state() != ConnectionState::Idle {
                self.set_state(ConnectionState::Closed);
            }
            return;
        };

        self.set_state(ConnectionState::Closing);
        if let Err(e) = transport.close().await {
            tracing::debug!(error = %e, "suppressed error while closing helper connection");
        }
        self.metrics.record_connection_closed();
        self.set_state(ConnectionState::Closed);
        tracing::info!(url = %self.params.url(), "helper connection closed");
    }

    /// Forget a transport that failed underneath us.
    fn drop_transport(&mut self) {
        if self.transport.take().is_some() {
            self.metrics.record_connection_closed();
        }
        self.set_state(ConnectionState::Closed);
    }

    /// Close, then reopen with the last-known parameters for as long as the
    /// strategy allows. Unclaimed replies are discarded if it gives up.
    async fn reconnect(&mut self) -> bool {
        self.metrics.record_reconnect_attempt();
        tracing::warn!(
            url = %self.params.url(),
            strategy = self.strategy.name(),
            "helper connection not open, reconnecting"
        );
        self.close().await;

        let mut last_error = TransportError::NotConnected;
        let mut attempt = 0;
        while self.strategy.should_reconnect(attempt, &last_error).await {
            let delay = self.strategy.next_delay(attempt).await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;

            match self.establish().await {
                Ok(()) => {
                    self.strategy.on_connected();
                    return true;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "reconnect attempt failed");
                    self.strategy.on_disconnected(&e);
                    last_error = e;
                }
            }
        }

        self.metrics.record_reconnect_failure();
        let discarded = self.table.len();
        self.table.clear();
        tracing::warn!(attempts = attempt, discarded, "giving up on helper connection");
        false
    }

    async fn submit(&mut self, request: Request) -> Result<Submitted, TransportError> {
        if !self.current_state().is_open() {
            self.reconnect().await;
        }

        self.next_call_id += 1;
        let call_id = self.next_call_id;

        let layout = self.config.layout;
        let target = match layout {
            FrameLayout::Targeted => request
                .target
                .or_else(|| self.config.default_target.clone()),
            FrameLayout::Untargeted => None,
        };
        let frame = OutboundFrame {
            call_id,
            target,
            class: request.class,
            payload: request.payload,
        };

        let pruned = self.pending.prune_closed();
        if pruned > 0 {
            tracing::debug!(pruned, "dropped waiters of abandoned calls");
        }

        let waiter = self.pending.register(call_id);
        match self.send(&frame.encode(layout)).await {
            Ok(()) => {
                self.metrics.record_frame_sent();
                tracing::info!(
                    call_id,
                    class = %frame.class,
                    target = frame.target.as_deref().unwrap_or_default(),
                    "call sent"
                );
                // A reply for this id may already be waiting in the table.
                if self.table.contains(call_id) {
                    self.deliver_buffered(call_id);
                }
                Ok(Submitted {
                    call_id,
                    target: frame.target,
                    waiter,
                })
            }
            Err(e) => {
                self.pending.cancel(call_id);
                self.metrics.record_send_failure();
                tracing::warn!(call_id, class = %frame.class, error = %e, "call could not be sent");
                Err(e)
            }
        }
    }

    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        let transport = match (self.current_state(), self.transport.as_mut()) {
            (ConnectionState::Open, Some(transport)) => transport,
            _ => return Err(TransportError::NotConnected),
        };

        let sent = transport.send(text).await;
        if sent.is_err() {
            self.drop_transport();
        }
        sent
    }

    fn on_frame(&mut self, frame: Option<Result<String, TransportError>>) {
        match frame {
            Some(Ok(text)) => self.dispatch_frame(&text),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "helper connection failed");
                self.drop_transport();
            }
            None => {
                tracing::info!(url = %self.params.url(), "helper closed the connection");
                self.drop_transport();
            }
        }
    }

    fn dispatch_frame(&mut self, text: &str) {
        match classify(text) {
            Ok(Inbound::Reply(reply)) => self.accept_reply(reply),
            Ok(Inbound::Broadcast { key }) => {
                if self.router.route(&key) {
                    self.metrics.record_broadcast_routed();
                } else {
                    self.metrics.record_broadcast_unhandled();
                }
            }
            Ok(Inbound::Notification(reply)) => {
                self.metrics.record_notification();
                tracing::debug!(message = %reply.message, "helper notification dropped");
            }
            Err(e) => {
                self.metrics.record_malformed_frame();
                tracing::warn!(error = %e, "discarding malformed helper frame");
            }
        }
    }

    fn accept_reply(&mut self, reply: Reply) {
        self.metrics.record_reply_received();
        let call_id = reply.call_id;
        self.table.push(reply);

        if !self.pending.contains(call_id) {
            tracing::debug!(call_id, unclaimed = self.table.len(), "reply buffered");
            return;
        }
        self.deliver_buffered(call_id);
    }

    /// Hand the first buffered reply for `call_id` to its waiter and discard
    /// the rest.
    fn deliver_buffered(&mut self, call_id: CallId) {
        let mut claimed = self.table.claim(call_id).into_iter();
        let Some(first) = claimed.next() else {
            return;
        };
        let duplicates = claimed.count();
        if duplicates > 0 {
            tracing::debug!(call_id, duplicates, "duplicate replies discarded");
        }

        match self.pending.complete(first) {
            Ok(()) => self.metrics.record_reply_delivered(),
            Err(reply) => {
                tracing::debug!(call_id, "caller gone, reply kept for claiming");
                self.table.push(reply);
            }
        }
    }
}

/// Next inbound frame, or never if there is no transport.
async fn next_frame(
    transport: &mut Option<Box<dyn FrameTransport>>,
) -> Option<Result<String, TransportError>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::NoDispatch;
    use crate::codec::CallClass;
    use crate::reconnection::FixedDelay;
    use crate::transport::{ConnectMode, MemoryConnector, MemoryListener};

    fn connection() -> (Connection, MemoryConnector, MemoryListener, watch::Receiver<ConnectionState>) {
        let (connector, listener) = MemoryConnector::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let connection = Connection::new(
            Arc::new(BridgeConfig::default()),
            Arc::new(connector.clone()),
            Arc::new(FixedDelay::single_attempt()),
            BroadcastRouter::new(Arc::new(NoDispatch)),
            Arc::new(BridgeMetrics::new()),
            state_tx,
        );
        (connection, connector, listener, state_rx)
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Idle.to_string(), "idle");
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Connecting.is_open());
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let (mut connection, _connector, _listener, state) = connection();

        assert!(connection.open(&OpenParams::new()).await);
        assert_eq!(*state.borrow(), ConnectionState::Open);

        connection.close().await;
        assert_eq!(*state.borrow(), ConnectionState::Closed);
        connection.close().await;
        assert_eq!(*state.borrow(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_close_before_open_stays_idle() {
        let (mut connection, _connector, _listener, state) = connection();
        connection.close().await;
        assert_eq!(*state.borrow(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_submit_encodes_default_target() {
        let (mut connection, _connector, mut listener, _state) = connection();
        assert!(connection.open(&OpenParams::new()).await);
        let mut peer = listener.accept().await.unwrap();

        let submitted = connection.submit(Request::new("reset")).await.unwrap();
        assert_eq!(submitted.call_id, 1);
        assert_eq!(peer.recv_frame().await.unwrap(), "1:module:sync:reset");
    }

    #[tokio::test]
    async fn test_send_failure_marks_closed() {
        let (mut connection, _connector, mut listener, state) = connection();
        assert!(connection.open(&OpenParams::new()).await);
        drop(listener.accept().await.unwrap());

        let result = connection
            .submit(Request::new("x").with_class(CallClass::Async))
            .await;
        assert!(result.is_err());
        assert_eq!(*state.borrow(), ConnectionState::Closed);
        assert_eq!(connection.pending.len(), 0);
    }

    #[tokio::test]
    async fn test_reply_without_waiter_is_buffered() {
        let (mut connection, _connector, _listener, _state) = connection();
        connection.dispatch_frame(r#"{"commID":5,"result":true,"message":"late"}"#);
        assert_eq!(connection.table.len(), 1);
        assert_eq!(connection.table.claim(5)[0].message, "late");
    }

    #[tokio::test]
    async fn test_reply_with_waiter_is_delivered() {
        let (mut connection, _connector, _listener, _state) = connection();
        let waiter = connection.pending.register(3);

        connection.dispatch_frame(r#"{"commID":3,"result":true,"message":"a"}"#);
        assert_eq!(waiter.await.unwrap().message, "a");
        assert!(connection.table.is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_failure_clears_table() {
        let (mut connection, connector, _listener, state) = connection();
        connection.dispatch_frame(r#"{"commID":9,"result":true,"message":"old"}"#);
        connector.set_mode(ConnectMode::Refuse);

        assert!(!connection.reconnect().await);
        assert!(connection.table.is_empty());
        assert_eq!(*state.borrow(), ConnectionState::Closed);
        assert_eq!(connection.metrics.snapshot().reconnect_failures, 1);
    }

    #[tokio::test]
    async fn test_notifications_and_malformed_are_dropped() {
        let (mut connection, _connector, _listener, _state) = connection();
        connection.dispatch_frame(r#"{"commID":0,"result":true,"message":"hi"}"#);
        connection.dispatch_frame("{{{");
        assert!(connection.table.is_empty());

        let snapshot = connection.metrics.snapshot();
        assert_eq!(snapshot.notifications, 1);
        assert_eq!(snapshot.malformed_frames, 1);
    }

    #[tokio::test]
    async fn test_submit_claims_reply_already_buffered() {
        let (mut connection, _connector, mut listener, _state) = connection();
        assert!(connection.open(&OpenParams::new()).await);
        let _peer = listener.accept().await.unwrap();
        connection.dispatch_frame(r#"{"commID":1,"result":true,"message":"early"}"#);
        connection.dispatch_frame(r#"{"commID":1,"result":true,"message":"echo"}"#);

        let submitted = connection.submit(Request::status("battery?")).await.unwrap();
        assert_eq!(submitted.call_id, 1);
        assert_eq!(submitted.waiter.await.unwrap().message, "early");
        assert!(connection.table.is_empty());
        assert_eq!(connection.pending.len(), 0);
    }

    #[tokio::test]
    async fn test_submit_prunes_abandoned_waiters() {
        let (mut connection, _connector, mut listener, _state) = connection();
        assert!(connection.open(&OpenParams::new()).await);
        let _peer = listener.accept().await.unwrap();

        drop(connection.submit(Request::new("a")).await.unwrap());
        drop(connection.submit(Request::new("b")).await.unwrap());
        assert_eq!(connection.pending.len(), 2);

        let _live = connection.submit(Request::new("c")).await.unwrap();
        assert_eq!(connection.pending.len(), 1);
        assert!(connection.pending.contains(3));
    }
}
