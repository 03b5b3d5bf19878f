//! Provider-agnostic call records
//!
//! Vendor-specific field names stop at the adapter boundary. Everything
//! downstream of an adapter consumes these types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw, untyped webhook body (form fields or JSON object)
pub type WebhookPayload = Map<String, Value>;

/// Request headers with lowercase names
pub type WebhookHeaders = HashMap<String, String>;

/// Read a payload field as a string.
///
/// Numbers and booleans are stringified since form-encoded and JSON vendors
/// disagree on types. A repeated form key reads as its last value. Null,
/// objects and arrays without a scalar read as absent.
pub fn payload_field(payload: &WebhookPayload, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::Array(values) => values.iter().rev().find_map(scalar),
        value => scalar(value),
    }
}

/// Every scalar value of a field, in received order
pub fn payload_values(payload: &WebhookPayload, key: &str) -> Vec<String> {
    match payload.get(key) {
        Some(Value::Array(values)) => values.iter().filter_map(scalar).collect(),
        Some(value) => scalar(value).into_iter().collect(),
        None => Vec::new(),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Like [`payload_field`] but empty when absent
pub fn payload_str(payload: &WebhookPayload, key: &str) -> String {
    payload_field(payload, key).unwrap_or_default()
}

/// Build a payload from string pairs.
///
/// A key seen more than once becomes an array of its values in order, so
/// nothing a vendor signed is lost.
pub fn payload_from_pairs<I, K, V>(pairs: I) -> WebhookPayload
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut payload = WebhookPayload::new();
    for (key, value) in pairs {
        let value = Value::String(value.into());
        match payload.entry(key.into()) {
            serde_json::map::Entry::Vacant(slot) => {
                slot.insert(value);
            },
            serde_json::map::Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(values) => values.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                },
            },
        }
    }
    payload
}

/// Outcome of a successful outbound call request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallInitiationResult {
    pub call_id: String,
    pub status: String,
    #[serde(default)]
    pub provider_metadata: Map<String, Value>,
    #[serde(default)]
    pub raw_response: Value,
}

/// Canonical inbound call record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedInboundData {
    pub provider: String,
    pub call_id: String,
    /// E.164, or the cleaned original when normalization is impossible
    pub from_number: String,
    pub to_number: String,
    pub direction: String,
    pub call_status: String,
    pub account_id: String,
    pub from_country: Option<String>,
    pub to_country: Option<String>,
    pub raw_data: WebhookPayload,
}

/// Asynchronous status update for a call already in progress
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusCallbackRecord {
    pub call_id: String,
    pub status: String,
    pub from_number: String,
    pub to_number: String,
    pub direction: String,
    /// Seconds, when the vendor reported a parseable duration
    pub duration: Option<u64>,
    pub extra: WebhookPayload,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl StatusCallbackRecord {
    /// Key for duplicate suppression of vendor retries
    pub fn dedup_key(&self) -> (String, String) {
        (self.call_id.clone(), self.status.clone())
    }

    /// Whether the vendor considers the call finished
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "completed" | "failed" | "busy" | "no-answer" | "canceled" | "cancelled"
        )
    }
}

/// Best-effort cost telemetry for a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallCost {
    pub cost_usd: f64,
    /// Cost in the currency the vendor bills in
    pub cost_native: f64,
    pub native_currency: String,
    pub duration_seconds: u64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
}

impl CallCost {
    /// Cost record for a failed lookup
    pub fn error(native_currency: &str, error: impl Into<String>) -> Self {
        Self {
            cost_usd: 0.0,
            cost_native: 0.0,
            native_currency: native_currency.to_string(),
            duration_seconds: 0,
            status: "error".to_string(),
            error: Some(error.into()),
            raw_response: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Vendor-rendered HTTP response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorResponse {
    pub content_type: &'static str,
    pub body: String,
}

impl VendorResponse {
    pub fn json(value: &Value) -> Self {
        Self {
            content_type: "application/json",
            body: value.to_string(),
        }
    }

    pub fn xml(body: String) -> Self {
        Self {
            content_type: "application/xml",
            body,
        }
    }
}

/// Result of a webhook signature check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureVerdict {
    /// Signature checked and valid
    Verified,
    /// No check possible (no secret configured, or no published scheme)
    Unverified,
    /// Signature checked and wrong
    Invalid,
}

impl SignatureVerdict {
    /// Requests are accepted unless the signature was positively wrong
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Invalid)
    }
}
