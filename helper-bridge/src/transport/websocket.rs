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

//! WebSocket transport to the helper process.
//!
//! Frames travel as WebSocket text messages. Binary messages from the helper
//! are accepted and decoded as UTF-8. Control frames are handled by
//! tungstenite and never surface as bridge frames.
//!
//! # Example
//!
//! ```rust,no_run
//! use helper_bridge::config::ConnectionParams;
//! use helper_bridge::transport::{Connector, WebSocketConfig, WebSocketConnector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = WebSocketConnector::new(WebSocketConfig::default());
//! let transport = connector.connect(&ConnectionParams::default()).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::ConnectionParams;
use crate::transport::{Connector, FrameTransport, TransportError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig as TungsteniteConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};

/// Limits applied to the helper WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// Maximum size of a single WebSocket frame (default: 16 MB)
    pub max_frame_size: usize,

    /// Maximum size of a complete message (default: 64 MB)
    pub max_message_size: usize,

    /// Disable Nagle's algorithm on the TCP socket (default: true)
    pub disable_nagle: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            disable_nagle: true,
        }
    }
}

impl WebSocketConfig {
    fn to_tungstenite(&self) -> TungsteniteConfig {
        let mut config = TungsteniteConfig::default();
        config.max_frame_size = Some(self.max_frame_size);
        config.max_message_size = Some(self.max_message_size);
        config
    }
}

/// Opens [`WebSocketTransport`]s to `ws://<host>:<port>/<endpoint>`.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    /// Creates a connector with the given limits.
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// The limits applied to new connections.
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        params: &ConnectionParams,
    ) -> Result<Box<dyn FrameTransport>, TransportError> {
        let transport = WebSocketTransport::connect(&params.url(), &self.config).await?;
        Ok(Box::new(transport))
    }
}

/// A connected helper WebSocket.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketTransport {
    /// Connect and complete the WebSocket handshake.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if the TCP connection is
    /// refused and [`TransportError::WebSocket`] if the handshake fails.
    pub async fn connect(url: &str, config: &WebSocketConfig) -> Result<Self, TransportError> {
        let (stream, _) =
            connect_async_with_config(url, Some(config.to_tungstenite()), config.disable_nagle)
                .await
                .map_err(|e| match e {
                    WsError::Io(source) => TransportError::ConnectionFailed {
                        address: url.to_string(),
                        source,
                    },
                    other => TransportError::WebSocket(other),
                })?;

        tracing::debug!(url, "helper websocket handshake complete");
        Ok(Self { stream })
    }
}

#[async_trait]
impl FrameTransport for WebSocketTransport {
    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(TransportError::WebSocket)
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                Some(Ok(Message::Binary(data))) => {
                    return Some(Ok(String::from_utf8_lossy(&data).into_owned()));
                }
                // Pongs are queued by tungstenite and flushed on the next read.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "helper sent close frame");
                    return None;
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return None;
                }
                Some(Err(e)) => return Some(Err(TransportError::WebSocket(e))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::WebSocket(e)),
        }
    }

    fn kind(&self) -> &'static str {
        "websocket"
    }
}
