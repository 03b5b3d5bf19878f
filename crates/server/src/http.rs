//! HTTP Endpoints
//!
//! Vendor-facing webhooks and the call control API.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{FromRequestParts, Json, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use voice_agent_core::{CallCost, CallInitiationResult, VendorResponse};
use voice_agent_telephony::InboundRequest;

use crate::metrics::{
    metrics_handler, record_inbound_webhook, record_status_callback, record_vendor_call,
};
use crate::state::AppState;
use crate::webhook::{decode_payload, lowercase_headers, signed_url};
use crate::websocket::audio_stream_handler;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;
    let cors_layer = build_cors_layer(&server.cors_origins, server.cors_enabled);
    let timeout = Duration::from_secs(server.timeout_seconds);

    Router::new()
        // Vendor webhooks
        .route(
            "/api/v1/telephony/inbound/:workflow_id/:user_id",
            post(inbound_webhook),
        )
        .route(
            "/api/v1/telephony/:provider/status-callback/:workflow_run_id",
            post(status_callback),
        )
        .route(
            "/api/v1/telephony/:provider/webhook-response/:workflow_id/:user_id/:workflow_run_id",
            get(webhook_response).post(webhook_response),
        )
        // Audio stream
        .route(
            "/api/v1/telephony/:provider/ws/:workflow_id/:user_id/:workflow_run_id",
            get(audio_stream_handler),
        )
        // Call control
        .route("/api/v1/telephony/providers", get(list_providers))
        .route("/api/v1/telephony/:provider/calls", post(initiate_call))
        .route("/api/v1/telephony/:provider/calls/:call_id", get(call_status))
        .route("/api/v1/telephony/:provider/calls/:call_id/cost", get(call_cost))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(map_response(timeout_document))
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - If cors_origins is empty, defaults to localhost:3000
/// - Otherwise, uses the configured origins
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        if !origins.is_empty() {
            tracing::error!("All configured CORS origins are invalid, falling back to localhost");
        }
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static("http://localhost:3000"))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    // Credentials cannot be combined with wildcard headers
    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

/// Path parameters whose rejection is a JSON error document
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ServerError))]
pub(crate) struct Path<T>(pub T);

/// The timeout layer answers with an empty 408; vendors get a JSON document
async fn timeout_document(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        tracing::warn!("Request timed out");
        return ServerError::Timeout.into_response();
    }
    response
}

fn vendor_response(status: StatusCode, response: VendorResponse) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, response.content_type)],
        response.body,
    )
        .into_response()
}

/// Inbound call webhook; the vendor is detected from the payload
async fn inbound_webhook(
    State(state): State<AppState>,
    Path((workflow_id, user_id)): Path<(i64, i64)>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServerError> {
    let payload = decode_payload(&headers, &body)?;
    let headers = lowercase_headers(&headers);
    // Signatures are computed over the public URL, not the one we were reached on
    let public_host = state.public_url.public_base_url().await.unwrap_or_default();
    let url = signed_url(&public_host, &uri);

    let request = InboundRequest {
        url: &url,
        payload: &payload,
        headers: &headers,
    };
    let outcome = state.dispatcher.handle(workflow_id, user_id, &request).await;

    record_inbound_webhook(
        outcome.provider,
        match &outcome.result {
            Ok(_) => "accepted",
            Err(e) => e.kind().as_str(),
        },
    );

    // Vendors only act on documents delivered with a 2xx
    let status = if outcome.provider.is_some() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok(vendor_response(status, outcome.response))
}

/// Status callback. Always acknowledged so the vendor stops retrying.
async fn status_callback(
    State(state): State<AppState>,
    path: Result<Path<(String, i64)>, ServerError>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<serde_json::Value> {
    let (provider, workflow_run_id) = match path {
        Ok(Path(params)) => params,
        Err(e) => {
            tracing::warn!(error = %e, "Status callback with malformed path");
            return Json(serde_json::json!({ "status": "ok", "processed": false }));
        },
    };
    let adapter = match state.registry.get(&provider) {
        Ok(adapter) => adapter,
        Err(e) => {
            tracing::warn!(provider = %provider, workflow_run_id, error = %e, "Status callback for unknown provider");
            return Json(serde_json::json!({ "status": "ok", "processed": false }));
        },
    };
    let payload = match decode_payload(&headers, &body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(provider = adapter.name(), workflow_run_id, error = %e, "Undecodable status callback");
            return Json(serde_json::json!({ "status": "ok", "processed": false }));
        },
    };

    let record = adapter.parse_status_callback(&payload);
    tracing::debug!(
        provider = adapter.name(),
        workflow_run_id,
        call_id = %record.call_id,
        status = %record.status,
        "Status callback"
    );
    let fresh = state
        .status_ledger
        .record(adapter.name(), workflow_run_id, record);
    record_status_callback(adapter.name(), !fresh);

    Json(serde_json::json!({
        "status": "ok",
        "processed": true,
        "duplicate": !fresh,
    }))
}

/// Stream instructions for an answered outbound call
async fn webhook_response(
    State(state): State<AppState>,
    Path((provider, workflow_id, user_id, workflow_run_id)): Path<(String, i64, i64, i64)>,
) -> Result<Response, ServerError> {
    let adapter = state.registry.get(&provider)?;
    let response = adapter
        .get_webhook_response(workflow_id, user_id, workflow_run_id)
        .await?;
    Ok(vendor_response(StatusCode::OK, response))
}

#[derive(Debug, Deserialize)]
pub struct InitiateCallRequest {
    pub to_number: String,
    pub webhook_url: String,
    #[serde(default)]
    pub workflow_run_id: Option<i64>,
    #[serde(default)]
    pub extra_params: HashMap<String, String>,
}

async fn initiate_call(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(request): Json<InitiateCallRequest>,
) -> Result<Json<CallInitiationResult>, ServerError> {
    if request.to_number.trim().is_empty() {
        return Err(ServerError::InvalidRequest("to_number is required".to_string()));
    }
    let adapter = state.registry.get(&provider)?;
    let result = adapter
        .initiate_call(
            &request.to_number,
            &request.webhook_url,
            request.workflow_run_id,
            &request.extra_params,
        )
        .await;
    record_vendor_call(adapter.name(), "initiate_call", result.is_ok());
    let result = result?;

    tracing::info!(
        provider = adapter.name(),
        call_id = %result.call_id,
        status = %result.status,
        workflow_run_id = ?request.workflow_run_id,
        "Outbound call initiated"
    );
    Ok(Json(result))
}

async fn call_status(
    State(state): State<AppState>,
    Path((provider, call_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let adapter = state.registry.get(&provider)?;
    let status = adapter.get_call_status(&call_id).await;
    record_vendor_call(adapter.name(), "call_status", status.is_ok());
    Ok(Json(status?))
}

async fn call_cost(
    State(state): State<AppState>,
    Path((provider, call_id)): Path<(String, String)>,
) -> Result<Json<CallCost>, ServerError> {
    let adapter = state.registry.get(&provider)?;
    let cost = adapter.get_call_cost(&call_id).await;
    record_vendor_call(adapter.name(), "call_cost", !cost.is_error());
    Ok(Json(cost))
}

async fn list_providers(State(state): State<AppState>) -> Json<serde_json::Value> {
    let providers: Vec<_> = state
        .registry
        .names()
        .into_iter()
        .filter_map(|name| state.registry.get(name).ok())
        .map(|adapter| {
            serde_json::json!({
                "name": adapter.name(),
                "configured": adapter.validate_config(),
                "phone_numbers": adapter.get_available_phone_numbers(),
            })
        })
        .collect();
    Json(serde_json::json!({ "providers": providers }))
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let count = state.registry.len();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "checks": {
                "providers": {
                    "status": if count > 0 { "ok" } else { "degraded" },
                    "count": count,
                },
            },
        })),
    )
}

/// Readiness check: every provider configured and callbacks routable
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let mut checks = serde_json::Map::new();
    let mut ready = !state.registry.is_empty();

    for name in state.registry.names() {
        let configured = state
            .registry
            .get(name)
            .map(|adapter| adapter.validate_config())
            .unwrap_or(false);
        ready &= configured;
        checks.insert(
            name.to_string(),
            serde_json::json!({ "status": if configured { "ok" } else { "missing_credentials" } }),
        );
    }

    let public_url = state.public_url.public_base_url().await;
    ready &= public_url.is_ok();
    checks.insert(
        "public_url".to_string(),
        match public_url {
            Ok(host) => serde_json::json!({ "status": "ok", "host": host }),
            Err(e) => serde_json::json!({ "status": "missing", "error": e.to_string() }),
        },
    );

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": checks,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use voice_agent_config::{ExotelConfig, ProviderConfig, Settings};

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.server.public_base_url = "voice.example.com".to_string();
        settings.telephony.providers = vec![ProviderConfig::Exotel(ExotelConfig {
            account_sid: "acme".to_string(),
            api_key: "k".to_string(),
            api_token: "t".to_string(),
            from_numbers: vec!["+910000000001".to_string()],
            ..Default::default()
        })];
        settings
    }

    fn router() -> Router {
        create_router(AppState::from_settings(settings()).unwrap())
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn form_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_router_creation() {
        let state = AppState::from_settings(Settings::default()).unwrap();
        let _ = create_router(state);
    }

    #[test]
    fn test_router_with_cors_origins() {
        let mut with_origins = settings();
        with_origins.server.cors_origins = vec![
            "https://dashboard.example.com".to_string(),
            "not a header value\n".to_string(),
        ];
        let _ = create_router(AppState::from_settings(with_origins).unwrap());

        let mut disabled = settings();
        disabled.server.cors_enabled = false;
        let _ = create_router(AppState::from_settings(disabled).unwrap());
    }

    #[tokio::test]
    async fn test_cors_preflight_for_configured_origin() {
        let mut settings = settings();
        settings.server.cors_origins = vec!["https://dashboard.example.com".to_string()];
        let app = create_router(AppState::from_settings(settings).unwrap());

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/v1/telephony/providers")
            .header(header::ORIGIN, "https://dashboard.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://dashboard.example.com"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
    }

    #[tokio::test]
    async fn test_malformed_path_is_json_error() {
        let response = router()
            .oneshot(form_post(
                "/api/v1/telephony/inbound/not-a-number/9",
                "CallSid=abc123&AccountSid=acme",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_type"], "invalid_request");

        let response = router()
            .oneshot(form_post(
                "/api/v1/telephony/exotel/status-callback/not-a-number",
                "CallSid=x&Status=completed",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["processed"], false);
    }

    #[tokio::test]
    async fn test_timeout_rendered_as_json() {
        let timed_out = StatusCode::REQUEST_TIMEOUT.into_response();
        let response = timeout_document(timed_out).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_type"], "timeout");

        let ok = timeout_document(StatusCode::OK.into_response()).await;
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["checks"]["providers"]["count"], 1);

        let response = router()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let unready = create_router(AppState::from_settings(Settings::default()).unwrap());
        let response = unready
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_inbound_exotel_accepted() {
        let response = router()
            .oneshot(form_post(
                "/api/v1/telephony/inbound/7/9",
                "CallSid=abc123&AccountSid=acme&From=09876543210&To=08012345678",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["workflow_run_id"], 1);
        assert_eq!(
            body["websocket_url"],
            "wss://voice.example.com/api/v1/telephony/exotel/ws/7/9/1"
        );
    }

    #[tokio::test]
    async fn test_inbound_account_mismatch_rendered_by_vendor() {
        let response = router()
            .oneshot(form_post(
                "/api/v1/telephony/inbound/7/9",
                "CallSid=abc123&AccountSid=someone-else",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_type"], "account_validation_failed");
    }

    #[tokio::test]
    async fn test_inbound_unrecognized_provider() {
        let response = router()
            .oneshot(form_post("/api/v1/telephony/inbound/7/9", "hello=world"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error_type"], "provider_not_recognized");
    }

    #[tokio::test]
    async fn test_status_callback_is_idempotent() {
        let state = AppState::from_settings(settings()).unwrap();
        let app = create_router(state.clone());
        let uri = "/api/v1/telephony/exotel/status-callback/42";
        let body = "CallSid=abc123&Status=completed&Duration=17";

        let first = body_json(app.clone().oneshot(form_post(uri, body)).await.unwrap()).await;
        let second = body_json(app.oneshot(form_post(uri, body)).await.unwrap()).await;

        assert_eq!(first["duplicate"], false);
        assert_eq!(second["duplicate"], true);
        let latest = state.status_ledger.latest("abc123").unwrap();
        assert_eq!(latest.workflow_run_id, 42);
        assert_eq!(latest.record.duration, Some(17));
    }

    #[tokio::test]
    async fn test_status_callback_unknown_provider_acknowledged() {
        let response = router()
            .oneshot(form_post(
                "/api/v1/telephony/plivo/status-callback/1",
                "CallSid=x&Status=completed",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["processed"], false);
    }

    #[tokio::test]
    async fn test_unknown_provider_calls() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/telephony/plivo/calls")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"to_number": "+919999999999", "webhook_url": "https://cb/x"}"#,
            ))
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_webhook_response_points_at_stream() {
        let response = router()
            .oneshot(
                Request::get("/api/v1/telephony/exotel/webhook-response/1/2/3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["websocket_url"],
            "wss://voice.example.com/api/v1/telephony/exotel/ws/1/2/3"
        );
    }

    #[tokio::test]
    async fn test_list_providers() {
        let response = router()
            .oneshot(
                Request::get("/api/v1/telephony/providers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["providers"][0]["name"], "exotel");
        assert_eq!(body["providers"][0]["configured"], true);
    }
}
