//! Audio connection handshake
//!
//! Vendors open the media stream with two JSON control messages:
//!
//! ```text
//! {"event": "connected", ...}
//! {"event": "start", "start": {"streamSid": "...", "callSid": "..."}, ...}
//! ```
//!
//! Only after both arrive in that order is the connection handed to the
//! pipeline engine. Every failure ends in `Closed(reason)` and a clean
//! return; nothing propagates past the connection boundary.

use std::time::Duration;

use serde_json::Value;

use voice_agent_core::{
    AudioConnection, CloseReason, ConnectionMessage, HandshakeState, PipelineEngine,
    SessionRoute, StreamContext, PROTOCOL_VIOLATION_CLOSE_CODE,
};

/// Close code when a control message does not arrive in time
pub const HANDSHAKE_TIMEOUT_CLOSE_CODE: u16 = 4408;

const STREAM_ID_KEYS: [&str; 2] = ["streamSid", "stream_sid"];
const CALL_ID_KEYS: [&str; 2] = ["callSid", "call_sid"];

/// Handshake driver for one audio connection
///
/// Owned by the connection task; never shared.
#[derive(Debug)]
pub struct CallSession {
    provider: &'static str,
    route: SessionRoute,
    message_timeout: Duration,
    state: HandshakeState,
}

impl CallSession {
    pub fn new(provider: &'static str, route: SessionRoute, message_timeout: Duration) -> Self {
        Self {
            provider,
            route,
            message_timeout,
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Drive the handshake to completion.
    ///
    /// Returns `Streaming` once the pipeline engine has been invoked (and has
    /// returned), or `Closed(reason)`.
    pub async fn run(
        mut self,
        mut connection: Box<dyn AudioConnection>,
        engine: &dyn PipelineEngine,
    ) -> HandshakeState {
        self.transition(HandshakeState::AwaitingConnected);

        let connected = match self.next_event(connection.as_mut()).await {
            Ok(event) => event,
            Err(reason) => return self.close(connection, reason).await,
        };
        if event_name(&connected) != Some("connected") {
            tracing::error!(
                provider = self.provider,
                workflow_run_id = self.route.workflow_run_id,
                event = ?event_name(&connected),
                "Expected 'connected' event"
            );
            return self
                .close(connection, CloseReason::UnexpectedFirstEvent)
                .await;
        }
        tracing::debug!(
            provider = self.provider,
            workflow_run_id = self.route.workflow_run_id,
            "Audio stream connected"
        );
        self.transition(HandshakeState::AwaitingStart);

        let start = match self.next_event(connection.as_mut()).await {
            Ok(event) => event,
            Err(reason) => return self.close(connection, reason).await,
        };
        if event_name(&start) != Some("start") {
            tracing::error!(
                provider = self.provider,
                workflow_run_id = self.route.workflow_run_id,
                event = ?event_name(&start),
                "Expected 'start' event second"
            );
            return self
                .close(connection, CloseReason::UnexpectedSecondEvent)
                .await;
        }

        let (stream_id, call_id) = match extract_identifiers(&start) {
            Some(ids) => ids,
            None => {
                tracing::error!(
                    provider = self.provider,
                    workflow_run_id = self.route.workflow_run_id,
                    "Missing streamSid or callSid in start message"
                );
                return self
                    .close(connection, CloseReason::MissingIdentifiers)
                    .await;
            },
        };

        self.transition(HandshakeState::Streaming);
        let context = StreamContext {
            provider: self.provider.to_string(),
            stream_id,
            call_id,
            workflow_id: self.route.workflow_id,
            workflow_run_id: self.route.workflow_run_id,
            user_id: self.route.user_id,
        };
        tracing::info!(
            provider = self.provider,
            stream_id = %context.stream_id,
            call_id = %context.call_id,
            workflow_run_id = context.workflow_run_id,
            "Handshake complete, starting pipeline"
        );

        engine.run_pipeline(connection, context).await;
        HandshakeState::Streaming
    }

    fn transition(&mut self, next: HandshakeState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid handshake transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Wait for the next control message and decode it as a JSON object
    async fn next_event(
        &self,
        connection: &mut dyn AudioConnection,
    ) -> Result<Value, CloseReason> {
        let message = match tokio::time::timeout(self.message_timeout, connection.recv()).await {
            Err(_) => return Err(CloseReason::Timeout),
            Ok(None) => return Err(CloseReason::Disconnected),
            Ok(Some(Err(e))) => {
                tracing::warn!(provider = self.provider, error = %e, "Audio connection failed during handshake");
                return Err(CloseReason::Disconnected);
            },
            Ok(Some(Ok(message))) => message,
        };

        let text = match message {
            ConnectionMessage::Text(text) => text,
            ConnectionMessage::Binary(data) => {
                tracing::warn!(
                    provider = self.provider,
                    bytes = data.len(),
                    "Binary frame before handshake completed"
                );
                return Err(CloseReason::DecodeError);
            },
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(value) if value.is_object() => Ok(value),
            Ok(_) | Err(_) => {
                tracing::warn!(provider = self.provider, "Undecodable handshake message");
                Err(CloseReason::DecodeError)
            },
        }
    }

    async fn close(
        mut self,
        mut connection: Box<dyn AudioConnection>,
        reason: CloseReason,
    ) -> HandshakeState {
        let code = if reason.is_protocol_violation() {
            Some(PROTOCOL_VIOLATION_CLOSE_CODE)
        } else if reason == CloseReason::Timeout {
            Some(HANDSHAKE_TIMEOUT_CLOSE_CODE)
        } else {
            None
        };
        if let Some(code) = code {
            connection.close(code, reason.close_message()).await;
        }

        tracing::warn!(
            provider = self.provider,
            workflow_run_id = self.route.workflow_run_id,
            state = ?self.state,
            reason = %reason,
            "Audio handshake closed"
        );
        self.transition(HandshakeState::Closed(reason));
        self.state
    }
}

fn event_name(event: &Value) -> Option<&str> {
    event.get("event").and_then(Value::as_str)
}

/// Stream and call identifiers, nested `start` object preferred
pub fn extract_identifiers(start: &Value) -> Option<(String, String)> {
    let stream_id = identifier(start, &STREAM_ID_KEYS)?;
    let call_id = identifier(start, &CALL_ID_KEYS)?;
    Some((stream_id, call_id))
}

fn identifier(event: &Value, keys: &[&str]) -> Option<String> {
    let nested = event.get("start").filter(|v| v.is_object());
    nested
        .and_then(|start| first_non_empty(start, keys))
        .or_else(|| first_non_empty(event, keys))
}

fn first_non_empty(object: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
