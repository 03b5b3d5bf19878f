//! Audio connection and pipeline engine seams

use async_trait::async_trait;

use crate::session::StreamContext;

/// One inbound frame from a bidirectional audio connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Transport failure on an audio connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("connection error: {0}")]
pub struct ConnectionError(pub String);

/// Bidirectional audio-streaming connection
///
/// Implemented over the axum WebSocket in the server crate and by channel
/// fakes in tests. `recv` returns `None` once the peer has closed.
#[async_trait]
pub trait AudioConnection: Send + 'static {
    /// Next inbound frame; ping/pong frames are handled by the transport
    async fn recv(&mut self) -> Option<Result<ConnectionMessage, ConnectionError>>;

    /// Send a text frame to the peer
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError>;

    /// Close with a code and reason; errors are swallowed
    async fn close(&mut self, code: u16, reason: &str);
}

/// Voice pipeline entry point
///
/// Takes ownership of the connection once the handshake reached `Streaming`.
#[async_trait]
pub trait PipelineEngine: Send + Sync + 'static {
    async fn run_pipeline(&self, connection: Box<dyn AudioConnection>, context: StreamContext);
}
