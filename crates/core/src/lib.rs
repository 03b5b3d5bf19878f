//! Core types for the telephony adapter layer
//!
//! This crate provides the types every other crate agrees on:
//! - Normalized call records (inbound webhooks, status callbacks, cost)
//! - The telephony error taxonomy
//! - Audio handshake state and stream context
//! - Collaborator traits (audio connection, pipeline engine, public URL)

pub mod call;
pub mod error;
pub mod session;
pub mod traits;

pub use call::{
    payload_field, payload_from_pairs, payload_str, payload_values, CallCost, CallInitiationResult,
    NormalizedInboundData, SignatureVerdict, StatusCallbackRecord, VendorResponse, WebhookHeaders,
    WebhookPayload,
};
pub use error::{Result, TelephonyError, TelephonyErrorKind};
pub use session::{
    CloseReason, HandshakeState, SessionRoute, StreamContext, PROTOCOL_VIOLATION_CLOSE_CODE,
};

pub use traits::{
    AudioConnection, ConnectionError, ConnectionMessage, DefaultErrorMessages, ErrorMessageLookup,
    PipelineEngine, PublicUrlProvider, SequentialRunAllocator, StaticPublicUrl,
    WorkflowRunAllocator,
};
