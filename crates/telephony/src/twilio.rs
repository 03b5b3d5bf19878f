//! Twilio adapter
//!
//! Twilio answers webhooks with TwiML, signs every webhook with
//! `X-Twilio-Signature`, and streams audio over Media Streams.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha1::Sha1;

use voice_agent_config::TwilioConfig;
use voice_agent_core::{
    payload_field, payload_str, payload_values, AudioConnection, CallCost, CallInitiationResult,
    HandshakeState, NormalizedInboundData, Result, SessionRoute, SignatureVerdict,
    StatusCallbackRecord, TelephonyError, TelephonyErrorKind, VendorResponse, WebhookHeaders,
    WebhookPayload,
};

use crate::handshake::CallSession;
use crate::http::{number_field, send_json, string_field};
use crate::phone::{normalize_phone_number, PhoneRegion};
use crate::provider::{passthrough_params, AdapterContext, ProviderAdapter};

pub const PROVIDER_NAME: &str = "twilio";
pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

const STATUS_CALLBACK_EVENTS: [&str; 4] = ["initiated", "ringing", "answered", "completed"];

type HmacSha1 = Hmac<Sha1>;

pub struct TwilioProvider {
    config: Arc<TwilioConfig>,
    base_url: String,
    context: AdapterContext,
}

impl TwilioProvider {
    pub fn new(config: TwilioConfig, context: AdapterContext) -> Self {
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
                "Twilio provider not properly configured".to_string(),
            ))
        }
    }

    fn twiml_stream(websocket_url: &str) -> VendorResponse {
        VendorResponse::xml(format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                "<Response><Connect><Stream url=\"{}\"/></Connect>",
                "<Pause length=\"40\"/></Response>"
            ),
            xml_escape(websocket_url)
        ))
    }

    fn twiml_reject(message: &str) -> VendorResponse {
        VendorResponse::xml(format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                "<Response><Say>{}</Say><Hangup/></Response>"
            ),
            xml_escape(message)
        ))
    }
}

/// `AC` followed by 32 hex characters
fn is_twilio_account_sid(sid: &str) -> bool {
    sid.len() == 34
        && sid.starts_with("AC")
        && sid[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// String-to-sign: the full URL followed by every parameter as key+value,
/// keys in ascending order. A repeated key contributes each of its values,
/// sorted.
fn signing_string(url: &str, params: &WebhookPayload) -> String {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();

    let mut data = url.to_string();
    for key in keys {
        let mut values = payload_values(params, key);
        values.sort();
        for value in values {
            data.push_str(key);
            data.push_str(&value);
        }
    }
    data
}

pub(crate) fn xml_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(ch),
        }
    }
    result
}

#[async_trait]
impl ProviderAdapter for TwilioProvider {
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
            ("To".to_string(), to_number.to_string()),
            ("From".to_string(), from_number.clone()),
            ("Url".to_string(), webhook_url.to_string()),
        ];
        if let Some(run_id) = workflow_run_id {
            let callback = self
                .context
                .status_callback_url(PROVIDER_NAME, run_id)
                .await?;
            form.push(("StatusCallback".to_string(), callback));
            form.push(("StatusCallbackMethod".to_string(), "POST".to_string()));
            form.extend(
                STATUS_CALLBACK_EVENTS
                    .iter()
                    .map(|event| ("StatusCallbackEvent".to_string(), event.to_string())),
            );
        }
        form.extend(passthrough_params(extra_params).map(|(k, v)| (k.clone(), v.clone())));

        let request = self
            .context
            .http
            .post(format!("{}/Calls.json", self.base_url))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form);
        let response = send_json(PROVIDER_NAME, request).await?;

        let call_id = string_field(&response, "sid").unwrap_or_default();
        let status = string_field(&response, "status").unwrap_or_else(|| "queued".to_string());
        tracing::info!(call_id = %call_id, status = %status, to = %to_number, "Twilio call initiated");

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
            .get(format!("{}/Calls/{}.json", self.base_url, call_id))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token));
        send_json(PROVIDER_NAME, request).await
    }

    async fn get_call_cost(&self, call_id: &str) -> CallCost {
        let response = match self.get_call_status(call_id).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(call_id, error = %e, "Exception fetching Twilio call cost");
                return CallCost::error("USD", e.to_string());
            },
        };

        // Twilio reports charges as negative amounts
        let price = number_field(&response, "price").map(f64::abs).unwrap_or(0.0);
        let currency = string_field(&response, "price_unit")
            .map(|unit| unit.to_ascii_uppercase())
            .unwrap_or_else(|| "USD".to_string());
        let cost_usd = if currency == "USD" { price } else { 0.0 };

        CallCost {
            cost_usd,
            cost_native: price,
            native_currency: currency,
            duration_seconds: number_field(&response, "duration")
                .map(|d| d.max(0.0) as u64)
                .unwrap_or(0),
            status: string_field(&response, "status").unwrap_or_else(|| "unknown".to_string()),
            error: None,
            raw_response: Some(response),
        }
    }

    fn get_available_phone_numbers(&self) -> Vec<String> {
        self.config.from_numbers.clone()
    }

    fn validate_config(&self) -> bool {
        !self.config.account_sid.is_empty() && !self.config.auth_token.is_empty()
    }

    fn can_handle_webhook(&self, payload: &WebhookPayload, headers: &WebhookHeaders) -> bool {
        let account_sid = payload_str(payload, "AccountSid");
        let call_sid = payload_str(payload, "CallSid");

        if is_twilio_account_sid(&account_sid) && call_sid.starts_with("CA") {
            return true;
        }

        headers.contains_key(SIGNATURE_HEADER)
    }

    fn parse_inbound_webhook(&self, payload: &WebhookPayload) -> NormalizedInboundData {
        NormalizedInboundData {
            provider: PROVIDER_NAME.to_string(),
            call_id: payload_str(payload, "CallSid"),
            from_number: self.normalize_phone_number(&payload_str(payload, "From")),
            to_number: self.normalize_phone_number(&payload_str(payload, "To")),
            direction: payload_field(payload, "Direction")
                .unwrap_or_else(|| "inbound".to_string()),
            call_status: payload_str(payload, "CallStatus"),
            account_id: payload_str(payload, "AccountSid"),
            from_country: payload_field(payload, "FromCountry"),
            to_country: payload_field(payload, "ToCountry"),
            raw_data: payload.clone(),
        }
    }

    fn parse_status_callback(&self, payload: &WebhookPayload) -> StatusCallbackRecord {
        let duration = payload_field(payload, "CallDuration")
            .filter(|d| !d.is_empty())
            .or_else(|| payload_field(payload, "Duration"))
            .and_then(|d| d.trim().parse::<u64>().ok());

        StatusCallbackRecord {
            call_id: payload_str(payload, "CallSid"),
            status: payload_str(payload, "CallStatus"),
            from_number: payload_str(payload, "From"),
            to_number: payload_str(payload, "To"),
            direction: payload_str(payload, "Direction"),
            duration,
            extra: payload.clone(),
            received_at: chrono::Utc::now(),
        }
    }

    fn normalize_phone_number(&self, raw: &str) -> String {
        normalize_phone_number(raw, PhoneRegion::NorthAmerica)
    }

    fn validate_account_id(&self, webhook_account_id: &str) -> bool {
        !webhook_account_id.is_empty() && webhook_account_id == self.config.account_sid
    }

    fn signature_header(&self) -> Option<&'static str> {
        Some(SIGNATURE_HEADER)
    }

    fn verify_webhook_signature(
        &self,
        url: &str,
        params: &WebhookPayload,
        signature: &str,
    ) -> SignatureVerdict {
        if self.config.auth_token.is_empty() {
            tracing::warn!("No Twilio auth token configured - skipping signature verification");
            return SignatureVerdict::Unverified;
        }

        let expected = match STANDARD.decode(signature.trim()) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            _ => return SignatureVerdict::Invalid,
        };

        let Ok(mut mac) = HmacSha1::new_from_slice(self.config.auth_token.as_bytes()) else {
            return SignatureVerdict::Invalid;
        };
        mac.update(signing_string(url, params).as_bytes());

        // verify_slice compares in constant time
        match mac.verify_slice(&expected) {
            Ok(()) => SignatureVerdict::Verified,
            Err(_) => SignatureVerdict::Invalid,
        }
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
        Ok(Self::twiml_stream(&websocket_url))
    }

    fn generate_inbound_response(
        &self,
        websocket_url: &str,
        _workflow_run_id: Option<i64>,
    ) -> VendorResponse {
        Self::twiml_stream(websocket_url)
    }

    fn generate_error_response(&self, _error_type: &str, message: &str) -> VendorResponse {
        Self::twiml_reject(message)
    }

    fn generate_validation_error_response(&self, kind: TelephonyErrorKind) -> VendorResponse {
        Self::twiml_reject(&self.context.error_message(kind))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::context;
    use voice_agent_core::payload_from_pairs;

    const ACCOUNT_SID: &str = "AC0123456789abcdef0123456789abcdef";
    const AUTH_TOKEN: &str = "12345";

    fn provider() -> TwilioProvider {
        TwilioProvider::new(
            TwilioConfig {
                account_sid: ACCOUNT_SID.to_string(),
                auth_token: AUTH_TOKEN.to_string(),
                from_numbers: vec!["+14155550100".to_string()],
                api_base_url: None,
            },
            context(),
        )
    }

    fn sign(url: &str, params: &WebhookPayload) -> String {
        let mut mac = HmacSha1::new_from_slice(AUTH_TOKEN.as_bytes()).unwrap();
        mac.update(signing_string(url, params).as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_account_sid_shape() {
        assert!(is_twilio_account_sid(ACCOUNT_SID));
        assert!(!is_twilio_account_sid("AC123"));
        assert!(!is_twilio_account_sid("acme"));
        assert!(!is_twilio_account_sid("AC0123456789abcdef0123456789abcdeg"));
    }

    #[test]
    fn test_can_handle_twilio_payload() {
        let p = provider();
        let payload = payload_from_pairs([("AccountSid", ACCOUNT_SID), ("CallSid", "CA42")]);
        assert!(p.can_handle_webhook(&payload, &WebhookHeaders::new()));

        let exotel = payload_from_pairs([("AccountSid", "acme"), ("CallSid", "abc")]);
        assert!(!p.can_handle_webhook(&exotel, &WebhookHeaders::new()));

        let mut headers = WebhookHeaders::new();
        headers.insert(SIGNATURE_HEADER.to_string(), "sig".to_string());
        assert!(p.can_handle_webhook(&WebhookPayload::new(), &headers));
    }

    #[test]
    fn test_signing_string_sorted() {
        let params = payload_from_pairs([("To", "+1"), ("CallSid", "CA1"), ("From", "+2")]);
        assert_eq!(
            signing_string("https://x/hook", &params),
            "https://x/hookCallSidCA1From+2To+1"
        );
    }

    #[test]
    fn test_signing_string_repeated_keys() {
        let params = payload_from_pairs([
            ("StatusCallbackEvent", "ringing"),
            ("CallSid", "CA1"),
            ("StatusCallbackEvent", "answered"),
        ]);
        assert_eq!(
            signing_string("https://x/hook", &params),
            "https://x/hookCallSidCA1StatusCallbackEventansweredStatusCallbackEventringing"
        );

        let p = provider();
        let signature = sign("https://x/hook", &params);
        assert_eq!(
            p.verify_webhook_signature("https://x/hook", &params, &signature),
            SignatureVerdict::Verified
        );

        let last_only = payload_from_pairs([("StatusCallbackEvent", "answered"), ("CallSid", "CA1")]);
        assert_eq!(
            p.verify_webhook_signature("https://x/hook", &last_only, &signature),
            SignatureVerdict::Invalid
        );
    }

    #[test]
    fn test_signature_verification() {
        let p = provider();
        let url = "https://voice.example.com/api/v1/telephony/inbound/1/2";
        let params = payload_from_pairs([("CallSid", "CA1"), ("AccountSid", ACCOUNT_SID)]);
        let signature = sign(url, &params);

        assert_eq!(
            p.verify_webhook_signature(url, &params, &signature),
            SignatureVerdict::Verified
        );
        assert_eq!(
            p.verify_inbound_signature(url, &params, &signature),
            SignatureVerdict::Verified
        );

        let tampered = payload_from_pairs([("CallSid", "CA2"), ("AccountSid", ACCOUNT_SID)]);
        assert_eq!(
            p.verify_webhook_signature(url, &tampered, &signature),
            SignatureVerdict::Invalid
        );
        assert_eq!(
            p.verify_webhook_signature(url, &params, ""),
            SignatureVerdict::Invalid
        );
        assert_eq!(
            p.verify_webhook_signature(url, &params, "not base64!"),
            SignatureVerdict::Invalid
        );
    }

    #[test]
    fn test_signature_without_token_is_unverified() {
        let p = TwilioProvider::new(
            TwilioConfig {
                account_sid: ACCOUNT_SID.to_string(),
                ..Default::default()
            },
            context(),
        );
        assert_eq!(
            p.verify_webhook_signature("https://x", &WebhookPayload::new(), "sig"),
            SignatureVerdict::Unverified
        );
    }

    #[test]
    fn test_parse_inbound_webhook() {
        let p = provider();
        let payload = payload_from_pairs([
            ("CallSid", "CA42"),
            ("AccountSid", ACCOUNT_SID),
            ("From", "(415) 555-0199"),
            ("To", "+14155550100"),
            ("CallStatus", "ringing"),
            ("Direction", "inbound"),
            ("ToCountry", "US"),
        ]);
        let data = p.parse_inbound_webhook(&payload);
        assert_eq!(data.provider, "twilio");
        assert_eq!(data.from_number, "+14155550199");
        assert_eq!(data.to_number, "+14155550100");
        assert_eq!(data.call_status, "ringing");
        assert_eq!(data.account_id, ACCOUNT_SID);
        assert_eq!(data.to_country.as_deref(), Some("US"));
    }

    #[test]
    fn test_parse_status_callback() {
        let payload = payload_from_pairs([
            ("CallSid", "CA42"),
            ("CallStatus", "completed"),
            ("CallDuration", "61"),
        ]);
        let record = provider().parse_status_callback(&payload);
        assert_eq!(record.status, "completed");
        assert_eq!(record.duration, Some(61));
        assert_eq!(record.dedup_key(), ("CA42".to_string(), "completed".to_string()));
    }

    #[tokio::test]
    async fn test_webhook_response_is_twiml_stream() {
        let response = provider().get_webhook_response(1, 2, 3).await.unwrap();
        assert_eq!(response.content_type, "application/xml");
        assert!(response
            .body
            .contains(r#"<Stream url="wss://voice.example.com/api/v1/telephony/twilio/ws/1/2/3"/>"#));
    }

    #[test]
    fn test_error_response_escapes_message() {
        let response = provider().generate_error_response("x", "a <b> & \"c\"");
        assert!(response.body.contains("<Say>a &lt;b&gt; &amp; &quot;c&quot;</Say>"));
        assert!(response.body.contains("<Hangup/>"));
    }

    #[test]
    fn test_validate_account_id() {
        let p = provider();
        assert!(p.validate_account_id(ACCOUNT_SID));
        assert!(!p.validate_account_id("ACffffffffffffffffffffffffffffffff"));
        assert!(!p.validate_account_id(""));
    }
}
