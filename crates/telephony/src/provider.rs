//! Uniform provider contract
//!
//! Every vendor integration implements [`ProviderAdapter`]. The set of
//! vendors is closed: [`TelephonyProvider`] has one variant per supported
//! vendor and is what the registry stores and dispatches on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use voice_agent_config::ProviderConfig;
use voice_agent_core::{
    AudioConnection, CallCost, CallInitiationResult, DefaultErrorMessages, ErrorMessageLookup,
    HandshakeState, NormalizedInboundData, PipelineEngine, PublicUrlProvider, Result,
    SessionRoute, SignatureVerdict, StatusCallbackRecord, TelephonyError, TelephonyErrorKind,
    VendorResponse, WebhookHeaders, WebhookPayload,
};

use crate::exotel::ExotelProvider;
use crate::selector::{NumberSelector, RandomNumberSelector};
use crate::twilio::TwilioProvider;

/// Key in `extra_params` that overrides origin number selection
pub const FROM_NUMBER_PARAM: &str = "from_number";

/// Capability set every vendor implementation satisfies.
///
/// Webhook parsing is total; validation results are plain values. Only
/// vendor calls return errors, and cost lookups never do.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name as used in routes, logs and normalized records
    fn name(&self) -> &'static str;

    /// Place an outbound call.
    ///
    /// Fails with `Configuration` before any network call when credentials
    /// or an origin number are missing, and with `VendorApi` on non-2xx.
    async fn initiate_call(
        &self,
        to_number: &str,
        webhook_url: &str,
        workflow_run_id: Option<i64>,
        extra_params: &HashMap<String, String>,
    ) -> Result<CallInitiationResult>;

    /// Vendor call object for `call_id`
    async fn get_call_status(&self, call_id: &str) -> Result<Value>;

    /// Best-effort cost; failures come back as `status == "error"`
    async fn get_call_cost(&self, call_id: &str) -> CallCost;

    fn get_available_phone_numbers(&self) -> Vec<String>;

    /// Credentials present; no I/O
    fn validate_config(&self) -> bool;

    /// Content sniffing: does this payload look like it came from us
    fn can_handle_webhook(&self, payload: &WebhookPayload, headers: &WebhookHeaders) -> bool;

    fn parse_inbound_webhook(&self, payload: &WebhookPayload) -> NormalizedInboundData;

    fn parse_status_callback(&self, payload: &WebhookPayload) -> StatusCallbackRecord;

    fn normalize_phone_number(&self, raw: &str) -> String;

    /// Payload account matches the configured account
    fn validate_account_id(&self, webhook_account_id: &str) -> bool;

    /// Header carrying the vendor's webhook signature, if any
    fn signature_header(&self) -> Option<&'static str>;

    fn verify_webhook_signature(
        &self,
        url: &str,
        params: &WebhookPayload,
        signature: &str,
    ) -> SignatureVerdict;

    fn verify_inbound_signature(
        &self,
        url: &str,
        params: &WebhookPayload,
        signature: &str,
    ) -> SignatureVerdict {
        self.verify_webhook_signature(url, params, signature)
    }

    /// Tell the vendor where to stream audio for an outbound call
    async fn get_webhook_response(
        &self,
        workflow_id: i64,
        user_id: i64,
        workflow_run_id: i64,
    ) -> Result<VendorResponse>;

    /// Success answer to an accepted inbound call webhook
    fn generate_inbound_response(
        &self,
        websocket_url: &str,
        workflow_run_id: Option<i64>,
    ) -> VendorResponse;

    fn generate_error_response(&self, error_type: &str, message: &str) -> VendorResponse;

    /// Error answer for a validation failure, message from the lookup table
    fn generate_validation_error_response(&self, kind: TelephonyErrorKind) -> VendorResponse;

    /// Run the audio handshake, then hand the connection to the pipeline
    async fn handle_audio_session(
        &self,
        connection: Box<dyn AudioConnection>,
        route: SessionRoute,
    ) -> HandshakeState;
}

/// Dependencies shared by all adapters
///
/// Read-only after construction; cloned into each adapter.
#[derive(Clone)]
pub struct AdapterContext {
    pub http: reqwest::Client,
    pub public_url: Arc<dyn PublicUrlProvider>,
    pub pipeline: Arc<dyn PipelineEngine>,
    pub selector: Arc<dyn NumberSelector>,
    pub messages: Arc<dyn ErrorMessageLookup>,
    pub handshake_timeout: Duration,
}

impl AdapterContext {
    /// Context with a timeout-bounded HTTP client and default policies
    pub fn new(
        public_url: Arc<dyn PublicUrlProvider>,
        pipeline: Arc<dyn PipelineEngine>,
        http_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| TelephonyError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            public_url,
            pipeline,
            selector: Arc::new(RandomNumberSelector),
            messages: Arc::new(DefaultErrorMessages),
            handshake_timeout: Duration::from_secs(10),
        })
    }

    pub fn with_selector(mut self, selector: Arc<dyn NumberSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_messages(mut self, messages: Arc<dyn ErrorMessageLookup>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Message for `kind`, falling back to the general auth failure text
    pub fn error_message(&self, kind: TelephonyErrorKind) -> String {
        self.messages
            .message(kind)
            .or_else(|| self.messages.message(TelephonyErrorKind::GeneralAuthFailed))
            .unwrap_or_else(|| "Request could not be processed.".to_string())
    }

    /// Origin number: explicit override first, then the selection strategy
    pub(crate) fn pick_from_number(
        &self,
        provider: &str,
        numbers: &[String],
        extra_params: &HashMap<String, String>,
    ) -> Result<String> {
        if let Some(number) = extra_params.get(FROM_NUMBER_PARAM) {
            if !number.trim().is_empty() {
                return Ok(number.trim().to_string());
            }
        }
        self.selector
            .select(numbers)
            .map(str::to_string)
            .ok_or_else(|| {
                TelephonyError::Configuration(format!(
                    "{} has no origin phone number configured",
                    provider
                ))
            })
    }

    /// `https://{public}/api/v1/telephony/{provider}/status-callback/{run}`
    pub(crate) async fn status_callback_url(
        &self,
        provider: &str,
        workflow_run_id: i64,
    ) -> Result<String> {
        let host = self.public_url.public_base_url().await?;
        Ok(format!(
            "https://{}/api/v1/telephony/{}/status-callback/{}",
            host, provider, workflow_run_id
        ))
    }

    /// `wss://{public}/api/v1/telephony/{provider}/ws/{workflow}/{user}/{run}`
    pub(crate) async fn stream_url(&self, provider: &str, route: SessionRoute) -> Result<String> {
        let host = self.public_url.public_base_url().await?;
        Ok(format!(
            "wss://{}/api/v1/telephony/{}/ws/{}/{}/{}",
            host, provider, route.workflow_id, route.user_id, route.workflow_run_id
        ))
    }
}

/// Error document shared by JSON-speaking vendors and generic rejections
pub fn json_error_response(error_type: &str, message: &str) -> VendorResponse {
    VendorResponse::json(&json!({
        "status": "error",
        "error_type": error_type,
        "message": message,
    }))
}

/// Extra form parameters minus the origin override
pub(crate) fn passthrough_params(
    extra_params: &HashMap<String, String>,
) -> impl Iterator<Item = (&String, &String)> {
    extra_params
        .iter()
        .filter(|(k, _)| k.as_str() != FROM_NUMBER_PARAM)
}

/// Closed set of supported vendors
pub enum TelephonyProvider {
    Exotel(ExotelProvider),
    Twilio(TwilioProvider),
}

impl TelephonyProvider {
    pub fn from_config(config: &ProviderConfig, context: AdapterContext) -> Self {
        match config {
            ProviderConfig::Exotel(cfg) => Self::Exotel(ExotelProvider::new(cfg.clone(), context)),
            ProviderConfig::Twilio(cfg) => Self::Twilio(TwilioProvider::new(cfg.clone(), context)),
        }
    }

    /// The single interface all variants are used through
    pub fn adapter(&self) -> &dyn ProviderAdapter {
        match self {
            Self::Exotel(p) => p,
            Self::Twilio(p) => p,
        }
    }

    pub fn name(&self) -> &'static str {
        self.adapter().name()
    }
}

impl std::fmt::Debug for TelephonyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelephonyProvider")
            .field("name", &self.name())
            .field("configured", &self.adapter().validate_config())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use voice_agent_core::{StaticPublicUrl, StreamContext};

    use crate::selector::FirstNumberSelector;

    /// Pipeline that drops the connection immediately
    pub struct NullPipeline;

    #[async_trait]
    impl PipelineEngine for NullPipeline {
        async fn run_pipeline(&self, _connection: Box<dyn AudioConnection>, _ctx: StreamContext) {}
    }

    pub fn context() -> AdapterContext {
        AdapterContext::new(
            Arc::new(StaticPublicUrl::new("voice.example.com")),
            Arc::new(NullPipeline),
            Duration::from_secs(2),
        )
        .unwrap()
        .with_selector(Arc::new(FirstNumberSelector))
    }
}
