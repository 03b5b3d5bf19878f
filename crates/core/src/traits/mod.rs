//! Collaborator traits for the telephony layer
//!
//! ```text
//! Audio:
//!   - AudioConnection: bidirectional streaming connection (WebSocket)
//!   - PipelineEngine: consumes a connection once the handshake completes
//!
//! Collaborators:
//!   - PublicUrlProvider: tunnel/ingress host for vendor callbacks
//!   - ErrorMessageLookup: user-facing text per error kind
//!   - WorkflowRunAllocator: creates run records for inbound calls
//! ```

mod collaborators;
mod connection;

pub use collaborators::{
    DefaultErrorMessages, ErrorMessageLookup, PublicUrlProvider, SequentialRunAllocator,
    StaticPublicUrl, WorkflowRunAllocator,
};
pub use connection::{AudioConnection, ConnectionError, ConnectionMessage, PipelineEngine};
