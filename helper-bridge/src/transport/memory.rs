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

//! In-memory transport for testing.
//!
//! [`MemoryConnector`] stands in for the helper process. Every accepted
//! connection produces a [`MemoryTransport`] for the bridge and a matching
//! [`MemoryPeer`] that the test drives from the helper's side.
//!
//! # Examples
//!
//! ```rust
//! use helper_bridge::codec::{FrameLayout, Reply};
//! use helper_bridge::config::ConnectionParams;
//! use helper_bridge::transport::{Connector, FrameTransport, MemoryConnector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (connector, mut listener) = MemoryConnector::new();
//! let mut transport = connector.connect(&ConnectionParams::default()).await?;
//! let mut peer = listener.accept().await.expect("peer");
//!
//! transport.send("1:module:status:ping").await?;
//! let call = peer.recv_call(FrameLayout::Targeted).await.expect("frame")?;
//! peer.send_reply(&Reply::new(call.call_id, true, "pong"));
//!
//! let frame = transport.recv().await.expect("open")?;
//! assert!(frame.contains("pong"));
//! # Ok(())
//! # }
//! ```

use crate::codec::{FrameLayout, OutboundFrame, Reply};
use crate::config::ConnectionParams;
use crate::error::ProtocolError;
use crate::transport::{Connector, FrameTransport, TransportError};
use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// How a [`MemoryConnector`] answers connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectMode {
    /// Accept and hand a peer to the listener.
    #[default]
    Accept,
    /// Fail immediately with a refused connection.
    Refuse,
    /// Never become ready.
    Stall,
}

#[derive(Debug)]
struct ConnectorState {
    mode: Mutex<ConnectMode>,
    last_params: Mutex<Option<ConnectionParams>>,
    attempts: AtomicU64,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Connector that plays the helper inside the test process.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    state: Arc<ConnectorState>,
}

impl MemoryConnector {
    /// A connector in [`ConnectMode::Accept`] and the listener that receives
    /// its peers.
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(ConnectorState {
                mode: Mutex::new(ConnectMode::default()),
                last_params: Mutex::new(None),
                attempts: AtomicU64::new(0),
                peers: tx,
            }),
        };
        (connector, MemoryListener { peers: rx })
    }

    /// Change how later connection attempts are answered.
    pub fn set_mode(&self, mode: ConnectMode) {
        *self.state.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    /// Number of connection attempts so far.
    pub fn connection_attempts(&self) -> u64 {
        self.state.attempts.load(Ordering::Relaxed)
    }

    /// Parameters of the most recent connection attempt.
    pub fn last_params(&self) -> Option<ConnectionParams> {
        self.state
            .last_params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        params: &ConnectionParams,
    ) -> Result<Box<dyn FrameTransport>, TransportError> {
        self.state.attempts.fetch_add(1, Ordering::Relaxed);
        *self
            .state
            .last_params
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(params.clone());

        let mode = *self.state.mode.lock().unwrap_or_else(PoisonError::into_inner);
        match mode {
            ConnectMode::Accept => {
                let (transport, peer) = MemoryTransport::pair();
                self.state
                    .peers
                    .send(peer)
                    .map_err(|_| TransportError::ConnectionFailed {
                        address: params.url(),
                        source: io::Error::new(io::ErrorKind::NotConnected, "listener dropped"),
                    })?;
                Ok(Box::new(transport))
            }
            ConnectMode::Refuse => Err(TransportError::ConnectionFailed {
                address: params.url(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            }),
            ConnectMode::Stall => std::future::pending().await,
        }
    }
}

/// Receives the helper side of every accepted connection.
#[derive(Debug)]
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next accepted connection.
    ///
    /// Returns `None` once every connector clone has been dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }
}

/// Bridge side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    outbound: Option<mpsc::UnboundedSender<String>>,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl MemoryTransport {
    /// A connected transport and its helper-side peer.
    pub fn pair() -> (Self, MemoryPeer) {
        let (to_peer, from_bridge) = mpsc::unbounded_channel();
        let (to_bridge, from_peer) = mpsc::unbounded_channel();
        (
            Self {
                outbound: Some(to_peer),
                inbound: from_peer,
            },
            MemoryPeer {
                inbound: from_bridge,
                outbound: to_bridge,
            },
        )
    }
}

#[async_trait]
impl FrameTransport for MemoryTransport {
    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound
            .send(frame.to_string())
            .map_err(|_| TransportError::connection_lost("peer dropped"))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outbound = None;
        self.inbound.close();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// Helper side of an in-memory connection.
///
/// Dropping the peer closes the connection from the helper's side.
#[derive(Debug)]
pub struct MemoryPeer {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl MemoryPeer {
    /// Next raw frame from the bridge, or `None` once the bridge closed.
    pub async fn recv_frame(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Next frame from the bridge, decoded as a call.
    pub async fn recv_call(
        &mut self,
        layout: FrameLayout,
    ) -> Option<Result<OutboundFrame, ProtocolError>> {
        let frame = self.recv_frame().await?;
        Some(OutboundFrame::decode(&frame, layout))
    }

    /// Push a raw text frame to the bridge. Returns `false` if it is gone.
    pub fn send_frame(&self, frame: impl Into<String>) -> bool {
        self.outbound.send(frame.into()).is_ok()
    }

    /// Push a reply frame to the bridge.
    pub fn send_reply(&self, reply: &Reply) -> bool {
        self.send_frame(reply.to_json())
    }

    /// Answer `call` with a successful reply carrying `message`.
    pub fn answer(&self, call: &OutboundFrame, message: impl Into<String>) -> bool {
        self.send_reply(&Reply::new(call.call_id, true, message))
    }
}
