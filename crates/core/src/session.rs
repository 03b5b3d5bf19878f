//! Audio session handshake types

use serde::{Deserialize, Serialize};

/// Close code sent on handshake protocol violations
pub const PROTOCOL_VIOLATION_CLOSE_CODE: u16 = 4400;

/// Why a handshake ended without reaching `Streaming`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    /// First control message was not `connected`
    UnexpectedFirstEvent,
    /// Second control message was not `start`
    UnexpectedSecondEvent,
    /// `start` carried no stream or call identifier
    MissingIdentifiers,
    /// Control message was not JSON text
    DecodeError,
    /// Peer went away or the transport failed
    Disconnected,
    /// No control message within the configured window
    Timeout,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnexpectedFirstEvent => "unexpected-first-event",
            Self::UnexpectedSecondEvent => "unexpected-second-event",
            Self::MissingIdentifiers => "missing-identifiers",
            Self::DecodeError => "decode-error",
            Self::Disconnected => "disconnected",
            Self::Timeout => "timeout",
        }
    }

    /// Reasons caused by the peer sending the wrong thing
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedFirstEvent
                | Self::UnexpectedSecondEvent
                | Self::MissingIdentifiers
                | Self::DecodeError
        )
    }

    /// Human-readable close frame reason
    pub fn close_message(&self) -> &'static str {
        match self {
            Self::UnexpectedFirstEvent => "Expected connected event",
            Self::UnexpectedSecondEvent => "Expected start event",
            Self::MissingIdentifiers => "Missing stream identifiers",
            Self::DecodeError => "Malformed control message",
            Self::Disconnected => "Disconnected",
            Self::Timeout => "Handshake timed out",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handshake lifecycle of one audio connection
///
/// ```text
/// Idle -> AwaitingConnected -> AwaitingStart -> Streaming
///   \____________\___________________\______-> Closed(reason)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum HandshakeState {
    Idle,
    AwaitingConnected,
    AwaitingStart,
    Streaming,
    Closed(CloseReason),
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Streaming | Self::Closed(_))
    }

    /// Valid forward transitions; closing is allowed from any live state
    pub fn can_transition_to(&self, target: HandshakeState) -> bool {
        matches!(
            (self, target),
            (Self::Idle, Self::AwaitingConnected)
                | (Self::AwaitingConnected, Self::AwaitingStart)
                | (Self::AwaitingStart, Self::Streaming)
                | (Self::Idle, Self::Closed(_))
                | (Self::AwaitingConnected, Self::Closed(_))
                | (Self::AwaitingStart, Self::Closed(_))
        )
    }
}

/// Identifiers handed to the pipeline engine once streaming begins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamContext {
    pub provider: String,
    pub stream_id: String,
    /// Never empty
    pub call_id: String,
    pub workflow_id: i64,
    pub workflow_run_id: i64,
    pub user_id: i64,
}

/// Route parameters of an audio connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRoute {
    pub workflow_id: i64,
    pub user_id: i64,
    pub workflow_run_id: i64,
}
