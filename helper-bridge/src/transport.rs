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

//! Transport layer for the helper socket.
//!
//! The bridge speaks to the helper through two traits:
//!
//! - [`Connector`] opens a connection for a set of [`ConnectionParams`]
//! - [`FrameTransport`] moves whole text frames over that connection
//!
//! Two implementations are provided:
//!
//! - [`WebSocketConnector`]: the real helper socket (feature `websocket`)
//! - [`MemoryConnector`]: an in-process helper for tests and demos

use crate::config::ConnectionParams;
use async_trait::async_trait;

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{ConnectMode, MemoryConnector, MemoryListener, MemoryPeer, MemoryTransport};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnector, WebSocketTransport};

/// A connected, frame-oriented duplex channel to the helper.
#[async_trait]
pub trait FrameTransport: Send {
    /// Send one text frame.
    async fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// Returns `None` once the peer has closed the connection. Must be cancel
    /// safe: the connection task races it against incoming commands.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Shut the connection down. Calling it twice is harmless.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Short name of the transport kind for logging.
    fn kind(&self) -> &'static str;
}

/// Opens [`FrameTransport`]s to the helper.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the helper described by `params`.
    ///
    /// Resolves once the connection is ready to carry frames.
    async fn connect(
        &self,
        params: &ConnectionParams,
    ) -> Result<Box<dyn FrameTransport>, TransportError>;
}
