//! WebSocket Handler
//!
//! Vendor audio streams arrive as WebSockets. The socket is wrapped as an
//! [`AudioConnection`] and handed to the provider's handshake.

use std::borrow::Cow;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;

use voice_agent_core::{AudioConnection, ConnectionError, ConnectionMessage, SessionRoute};

use crate::http::Path;
use crate::metrics::record_handshake;
use crate::state::AppState;
use crate::ServerError;

/// [`AudioConnection`] over an axum WebSocket
pub struct AxumAudioConnection {
    socket: WebSocket,
}

impl AxumAudioConnection {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl AudioConnection for AxumAudioConnection {
    async fn recv(&mut self) -> Option<Result<ConnectionMessage, ConnectionError>> {
        loop {
            let message = match self.socket.recv().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(ConnectionError(e.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(ConnectionMessage::Text(text))),
                Message::Binary(data) => return Some(Ok(ConnectionMessage::Binary(data))),
                // Pongs are queued by the transport
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(frame) => {
                    tracing::debug!(?frame, "Peer closed audio stream");
                    return None;
                },
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| ConnectionError(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        };
        if let Err(e) = self.socket.send(Message::Close(Some(frame))).await {
            tracing::debug!(error = %e, "Close frame not delivered");
        }
    }
}

/// `GET /api/v1/telephony/:provider/ws/:workflow_id/:user_id/:workflow_run_id`
pub async fn audio_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path((provider, workflow_id, user_id, workflow_run_id)): Path<(String, i64, i64, i64)>,
) -> Result<Response, ServerError> {
    // Reject unknown providers before upgrading
    let name = state.registry.get(&provider)?.name();
    let route = SessionRoute {
        workflow_id,
        user_id,
        workflow_run_id,
    };
    tracing::debug!(provider = name, workflow_run_id, "Audio stream upgrade");

    Ok(ws.on_upgrade(move |socket| async move {
        let adapter = match state.registry.get(name) {
            Ok(adapter) => adapter,
            Err(e) => {
                tracing::error!(error = %e, "Provider disappeared during upgrade");
                return;
            },
        };
        let connection = Box::new(AxumAudioConnection::new(socket));
        let outcome = adapter.handle_audio_session(connection, route).await;
        record_handshake(name, &outcome);
    }))
}
