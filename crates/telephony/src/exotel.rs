//! Exotel adapter
//!
//! Exotel bills in INR, identifies accounts by name rather than an
//! `AC`-prefixed SID, and streams audio through AgentStream using the same
//! `connected` / `start` handshake as other media-stream vendors.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use voice_agent_config::ExotelConfig;
use voice_agent_core::{
    payload_field, payload_str, AudioConnection, CallCost, CallInitiationResult, HandshakeState,
    NormalizedInboundData, Result, SessionRoute, SignatureVerdict, StatusCallbackRecord,
    TelephonyError, TelephonyErrorKind, VendorResponse, WebhookHeaders, WebhookPayload,
};

use crate::handshake::CallSession;
use crate::http::{number_field, send_json, string_field};
use crate::phone::{normalize_phone_number, PhoneRegion};
use crate::provider::{json_error_response, passthrough_params, AdapterContext, ProviderAdapter};

pub const PROVIDER_NAME: &str = "exotel";
const NATIVE_CURRENCY: &str = "INR";

pub struct ExotelProvider {
    config: Arc<ExotelConfig>,
    base_url: String,
    context: AdapterContext,
}

impl ExotelProvider {
    pub fn new(config: ExotelConfig, context: AdapterContext) -> Self {
        let base_url = config.base_url();
        Self {
            config: Arc::new(config),
            base_url,
            context,
        }
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.validate_config() {
            Ok(())
        } else {
            Err(TelephonyError::Configuration(
                "Exotel provider not properly configured".to_string(),
            ))
        }
    }

    fn call_url(&self, call_id: &str) -> String {
        format!("{}/Calls/{}.json", self.base_url, call_id)
    }
}

/// Exotel wraps call objects in `{"Call": {...}}`; older endpoints do not
fn call_object(response: &Value) -> &Value {
    match response.get("Call") {
        Some(call) if call.is_object() => call,
        _ => response,
    }
}

#[async_trait]
impl ProviderAdapter for ExotelProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn initiate_call(
        &self,
        to_number: &str,
        webhook_url: &str,
        workflow_run_id: Option<i64>,
        extra_params: &HashMap<String, String>,
    ) -> Result<CallInitiationResult> {
        self.ensure_configured()?;
        let from_number =
            self.context
                .pick_from_number(PROVIDER_NAME, &self.config.from_numbers, extra_params)?;
        tracing::info!(from_number = %from_number, "Selected phone number for outbound call");

        let mut form: Vec<(String, String)> = vec![
            ("From".to_string(), from_number.clone()),
            ("To".to_string(), to_number.to_string()),
            ("CallerId".to_string(), from_number.clone()),
            ("Url".to_string(), webhook_url.to_string()),
        ];
        if let Some(run_id) = workflow_run_id {
            let callback = self
                .context
                .status_callback_url(PROVIDER_NAME, run_id)
                .await?;
            form.push(("StatusCallback".to_string(), callback));
        }
        form.extend(passthrough_params(extra_params).map(|(k, v)| (k.clone(), v.clone())));

        let request = self
            .context
            .http
            .post(format!("{}/Calls/connect.json", self.base_url))
            .basic_auth(&self.config.api_key, Some(&self.config.api_token))
            .form(&form);
        let response = send_json(PROVIDER_NAME, request).await?;

        let call = call_object(&response);
        let call_id = string_field(call, "Sid").unwrap_or_default();
        let status = string_field(call, "Status").unwrap_or_else(|| "queued".to_string());
        tracing::info!(call_id = %call_id, status = %status, to = %to_number, "Exotel call initiated");

        let mut provider_metadata = Map::new();
        provider_metadata.insert("from_number".to_string(), Value::String(from_number));

        Ok(CallInitiationResult {
            call_id,
            status,
            provider_metadata,
            raw_response: response,
        })
    }

    async fn get_call_status(&self, call_id: &str) -> Result<Value> {
        self.ensure_configured()?;
        let request = self
            .context
            .http
            .get(self.call_url(call_id))
            .basic_auth(&self.config.api_key, Some(&self.config.api_token));
        send_json(PROVIDER_NAME, request).await
    }

    async fn get_call_cost(&self, call_id: &str) -> CallCost {
        let response = match self.get_call_status(call_id).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(call_id, error = %e, "Exception fetching Exotel call cost");
                return CallCost::error(NATIVE_CURRENCY, e.to_string());
            },
        };

        let call = call_object(&response);
        CallCost {
            // Exotel bills in INR; conversion is left to billing
            cost_usd: 0.0,
            cost_native: number_field(call, "Price").unwrap_or(0.0),
            native_currency: NATIVE_CURRENCY.to_string(),
            duration_seconds: number_field(call, "Duration")
                .map(|d| d.max(0.0) as u64)
                .unwrap_or(0),
            status: string_field(call, "Status").unwrap_or_else(|| "unknown".to_string()),
            error: None,
            raw_response: Some(response),
        }
    }

    fn get_available_phone_numbers(&self) -> Vec<String> {
        self.config.from_numbers.clone()
    }

    fn validate_config(&self) -> bool {
        !self.config.account_sid.is_empty()
            && !self.config.api_key.is_empty()
            && !self.config.api_token.is_empty()
    }

    fn can_handle_webhook(&self, payload: &WebhookPayload, headers: &WebhookHeaders) -> bool {
        let account_sid = payload_str(payload, "AccountSid");
        let call_sid = payload_str(payload, "CallSid");

        // Exotel account SIDs are account names: never AC-prefixed, no dots
        if !account_sid.is_empty()
            && !account_sid.starts_with("AC")
            && !account_sid.contains('.')
            && !call_sid.is_empty()
        {
            return true;
        }

        headers
            .get("user-agent")
            .map(|ua| ua.to_ascii_lowercase().contains("exotel"))
            .unwrap_or(false)
    }

    fn parse_inbound_webhook(&self, payload: &WebhookPayload) -> NormalizedInboundData {
        NormalizedInboundData {
            provider: PROVIDER_NAME.to_string(),
            call_id: payload_str(payload, "CallSid"),
            from_number: self.normalize_phone_number(&payload_str(payload, "From")),
            to_number: self.normalize_phone_number(&payload_str(payload, "To")),
            direction: payload_field(payload, "Direction")
                .unwrap_or_else(|| "inbound".to_string()),
            call_status: payload_str(payload, "Status"),
            account_id: payload_str(payload, "AccountSid"),
            from_country: payload_field(payload, "FromCountry"),
            to_country: payload_field(payload, "ToCountry"),
            raw_data: payload.clone(),
        }
    }

    fn parse_status_callback(&self, payload: &WebhookPayload) -> StatusCallbackRecord {
        let duration = payload_field(payload, "Duration")
            .filter(|d| !d.is_empty())
            .or_else(|| payload_field(payload, "CallDuration"))
            .and_then(|d| d.trim().parse::<u64>().ok());

        StatusCallbackRecord {
            call_id: payload_str(payload, "CallSid"),
            status: payload_str(payload, "Status"),
            from_number: payload_str(payload, "From"),
            to_number: payload_str(payload, "To"),
            direction: payload_str(payload, "Direction"),
            duration,
            extra: payload.clone(),
            received_at: chrono::Utc::now(),
        }
    }

    fn normalize_phone_number(&self, raw: &str) -> String {
        normalize_phone_number(raw, PhoneRegion::India)
    }

    fn validate_account_id(&self, webhook_account_id: &str) -> bool {
        !webhook_account_id.is_empty() && webhook_account_id == self.config.account_sid
    }

    fn signature_header(&self) -> Option<&'static str> {
        None
    }

    fn verify_webhook_signature(
        &self,
        _url: &str,
        _params: &WebhookPayload,
        _signature: &str,
    ) -> SignatureVerdict {
        match self.config.webhook_secret.as_deref() {
            Some(secret) if !secret.is_empty() => {
                tracing::debug!("Exotel publishes no webhook signature scheme; request unverified");
            },
            _ => {
                tracing::warn!(
                    "No Exotel webhook secret configured - skipping signature verification"
                );
            },
        }
        SignatureVerdict::Unverified
    }

    async fn get_webhook_response(
        &self,
        workflow_id: i64,
        user_id: i64,
        workflow_run_id: i64,
    ) -> Result<VendorResponse> {
        let route = SessionRoute {
            workflow_id,
            user_id,
            workflow_run_id,
        };
        let websocket_url = self.context.stream_url(PROVIDER_NAME, route).await?;
        Ok(VendorResponse::json(&json!({
            "websocket_url": websocket_url,
            "message": "Connect to WebSocket for audio streaming",
        })))
    }

    fn generate_inbound_response(
        &self,
        websocket_url: &str,
        workflow_run_id: Option<i64>,
    ) -> VendorResponse {
        VendorResponse::json(&json!({
            "status": "ok",
            "websocket_url": websocket_url,
            "workflow_run_id": workflow_run_id,
        }))
    }

    fn generate_error_response(&self, error_type: &str, message: &str) -> VendorResponse {
        json_error_response(error_type, message)
    }

    fn generate_validation_error_response(&self, kind: TelephonyErrorKind) -> VendorResponse {
        json_error_response(kind.as_str(), &self.context.error_message(kind))
    }

    async fn handle_audio_session(
        &self,
        connection: Box<dyn AudioConnection>,
        route: SessionRoute,
    ) -> HandshakeState {
        CallSession::new(PROVIDER_NAME, route, self.context.handshake_timeout)
            .run(connection, self.context.pipeline.as_ref())
            .await
    }
}
