//! Webhook body decoding
//!
//! Vendors post either form-encoded or JSON bodies. Both decode into the
//! same flat payload map the adapters sniff and parse.

use axum::http::{header, HeaderMap, Uri};
use serde_json::Value;

use voice_agent_core::{payload_from_pairs, WebhookHeaders, WebhookPayload};

use crate::ServerError;

/// Decode a webhook body by content type; an empty body is an empty payload.
///
/// Repeated form keys keep every value (see `payload_from_pairs`), which
/// the Twilio signature covers.
pub fn decode_payload(headers: &HeaderMap, body: &[u8]) -> Result<WebhookPayload, ServerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(WebhookPayload::new());
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);

    if is_json {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ServerError::InvalidRequest(
                "webhook body must be a JSON object".to_string(),
            )),
            Err(e) => Err(ServerError::InvalidRequest(format!(
                "webhook body is not valid JSON: {}",
                e
            ))),
        }
    } else {
        Ok(payload_from_pairs(url::form_urlencoded::parse(body)))
    }
}

/// Header map with lowercased names; non-UTF-8 values are dropped
pub fn lowercase_headers(headers: &HeaderMap) -> WebhookHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Public URL the vendor signed: `https://{public host}{path}?{query}`
pub fn signed_url(public_host: &str, uri: &Uri) -> String {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    format!("https://{}{}", public_host, path)
}
