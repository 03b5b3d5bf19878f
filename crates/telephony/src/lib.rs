//! Telephony adapter layer
//!
//! Routes calls between the voice pipeline and cloud telephony vendors:
//! - [`ProviderAdapter`]: the uniform per-vendor contract
//! - [`ExotelProvider`] / [`TwilioProvider`]: the supported vendors
//! - [`ProviderRegistry`]: configured adapters in detection priority order
//! - [`InboundDispatcher`]: provider detection and validation for inbound webhooks
//! - [`CallSession`]: the two-message audio handshake

pub mod dispatcher;
pub mod exotel;
pub mod handshake;
mod http;
pub mod phone;
pub mod provider;
pub mod registry;
pub mod selector;
pub mod twilio;

pub use dispatcher::{AcceptedCall, InboundDispatch, InboundDispatcher, InboundOutcome, InboundRequest};
pub use exotel::ExotelProvider;
pub use handshake::{extract_identifiers, CallSession, HANDSHAKE_TIMEOUT_CLOSE_CODE};
pub use phone::{normalize_phone_number, PhoneRegion};
pub use provider::{
    json_error_response, AdapterContext, ProviderAdapter, TelephonyProvider, FROM_NUMBER_PARAM,
};
pub use registry::ProviderRegistry;
pub use selector::{FirstNumberSelector, NumberSelector, RandomNumberSelector};
pub use twilio::TwilioProvider;
