//! Vendor REST plumbing shared by the adapters

use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;

use voice_agent_core::{Result, TelephonyError};

/// Send a vendor request and decode the JSON body.
///
/// Non-2xx responses become [`TelephonyError::VendorApi`] carrying the raw
/// body; connection failures and undecodable bodies become
/// [`TelephonyError::Transport`]. No retries.
pub(crate) async fn send_json(provider: &str, request: RequestBuilder) -> Result<Value> {
    let response = request.send().await.map_err(|e| transport(provider, e))?;
    let status = response.status();
    let body = response.text().await.map_err(|e| transport(provider, e))?;

    if !status.is_success() {
        tracing::warn!(
            provider,
            status = status.as_u16(),
            body = %truncate(&body, 512),
            "Vendor API returned an error"
        );
        return Err(TelephonyError::VendorApi {
            provider: provider.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    if body.trim().is_empty() && status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| {
        TelephonyError::Transport(format!("{} returned invalid JSON: {}", provider, e))
    })
}

fn transport(provider: &str, err: reqwest::Error) -> TelephonyError {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    TelephonyError::Transport(format!("{} {}: {}", provider, kind, err))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Read a numeric vendor field that may be a JSON number or a string
pub(crate) fn number_field(object: &Value, key: &str) -> Option<f64> {
    match object.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a string vendor field, or `None` when absent or null
pub(crate) fn string_field(object: &Value, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
