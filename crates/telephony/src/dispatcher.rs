//! Inbound webhook dispatch
//!
//! Inbound call webhooks carry no provider tag. The dispatcher asks the
//! registry which adapter claims the payload, checks the signature and
//! account, allocates a workflow run and renders the vendor's answer.

use std::sync::Arc;

use voice_agent_core::{
    NormalizedInboundData, Result, SessionRoute, SignatureVerdict, TelephonyError,
    VendorResponse, WebhookHeaders, WebhookPayload, WorkflowRunAllocator,
};

use crate::provider::{json_error_response, AdapterContext, ProviderAdapter};
use crate::registry::ProviderRegistry;

/// Raw inbound webhook as received by the HTTP layer
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    /// Full public URL the vendor called, used for signature checks
    pub url: &'a str,
    pub payload: &'a WebhookPayload,
    pub headers: &'a WebhookHeaders,
}

/// A payload that was claimed, verified and parsed
pub struct InboundDispatch<'r> {
    pub provider: &'r dyn ProviderAdapter,
    pub call: NormalizedInboundData,
    pub signature: SignatureVerdict,
}

impl std::fmt::Debug for InboundDispatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundDispatch")
            .field("provider", &self.provider.name())
            .field("call", &self.call)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Outcome of a full inbound webhook handling
#[derive(Debug)]
pub struct InboundOutcome {
    /// Provider that claimed the payload, if any
    pub provider: Option<&'static str>,
    /// Body to send back to the vendor, success or rejection
    pub response: VendorResponse,
    pub result: Result<AcceptedCall>,
}

#[derive(Debug, Clone)]
pub struct AcceptedCall {
    pub call: NormalizedInboundData,
    pub workflow_run_id: i64,
    pub websocket_url: String,
}

pub struct InboundDispatcher {
    registry: Arc<ProviderRegistry>,
    allocator: Arc<dyn WorkflowRunAllocator>,
    context: AdapterContext,
    require_signature: bool,
}

impl InboundDispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        allocator: Arc<dyn WorkflowRunAllocator>,
        context: AdapterContext,
        require_signature: bool,
    ) -> Self {
        Self {
            registry,
            allocator,
            context,
            require_signature,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Detect the provider, verify the signature, parse, and check the account.
    ///
    /// Never panics on malformed input; every rejection is a typed error.
    pub fn dispatch(&self, request: &InboundRequest<'_>) -> Result<InboundDispatch<'_>> {
        let provider = self.registry.detect(request.payload, request.headers)?;
        let name = provider.name();
        tracing::debug!(provider = name, "Inbound webhook claimed");

        let signature = if self.require_signature {
            let signature = provider
                .signature_header()
                .and_then(|header| request.headers.get(header))
                .map(String::as_str)
                .unwrap_or("");
            provider.verify_inbound_signature(request.url, request.payload, signature)
        } else {
            SignatureVerdict::Unverified
        };
        if !signature.is_accepted() {
            tracing::warn!(provider = name, url = request.url, "Inbound webhook signature rejected");
            return Err(TelephonyError::SignatureRejected {
                provider: name.to_string(),
            });
        }

        let call = provider.parse_inbound_webhook(request.payload);
        if !provider.validate_account_id(&call.account_id) {
            tracing::warn!(
                provider = name,
                account_id = %call.account_id,
                call_id = %call.call_id,
                "Inbound webhook account does not match configuration"
            );
            return Err(TelephonyError::AccountMismatch {
                provider: name.to_string(),
                account_id: call.account_id,
            });
        }

        Ok(InboundDispatch {
            provider,
            call,
            signature,
        })
    }

    /// Dispatch, allocate a workflow run and render the vendor response
    pub async fn handle(
        &self,
        workflow_id: i64,
        user_id: i64,
        request: &InboundRequest<'_>,
    ) -> InboundOutcome {
        let dispatch = match self.dispatch(request) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                let provider = self
                    .registry
                    .detect(request.payload, request.headers)
                    .ok();
                return self.reject(provider, e);
            },
        };
        let provider = dispatch.provider;

        match self.accept(provider, dispatch.call, workflow_id, user_id).await {
            Ok(accepted) => {
                tracing::info!(
                    provider = provider.name(),
                    call_id = %accepted.call.call_id,
                    workflow_id,
                    workflow_run_id = accepted.workflow_run_id,
                    "Inbound call accepted"
                );
                InboundOutcome {
                    provider: Some(provider.name()),
                    response: provider.generate_inbound_response(
                        &accepted.websocket_url,
                        Some(accepted.workflow_run_id),
                    ),
                    result: Ok(accepted),
                }
            },
            Err(e) => {
                tracing::error!(provider = provider.name(), error = %e, "Failed to accept inbound call");
                self.reject(Some(provider), e)
            },
        }
    }

    async fn accept(
        &self,
        provider: &dyn ProviderAdapter,
        call: NormalizedInboundData,
        workflow_id: i64,
        user_id: i64,
    ) -> Result<AcceptedCall> {
        let workflow_run_id = self.allocator.create_run(workflow_id, user_id, &call).await?;
        let route = SessionRoute {
            workflow_id,
            user_id,
            workflow_run_id,
        };
        let websocket_url = self.context.stream_url(provider.name(), route).await?;
        Ok(AcceptedCall {
            call,
            workflow_run_id,
            websocket_url,
        })
    }

    /// Rejection in the claiming vendor's format, or a generic JSON document
    fn reject(&self, provider: Option<&dyn ProviderAdapter>, error: TelephonyError) -> InboundOutcome {
        let kind = error.kind();
        let response = match provider {
            Some(provider) => provider.generate_validation_error_response(kind),
            None => json_error_response(kind.as_str(), &self.context.error_message(kind)),
        };
        if !error.is_security_event() {
            tracing::info!(error = %error, "Inbound webhook rejected");
        }
        InboundOutcome {
            provider: provider.map(|p| p.name()),
            response,
            result: Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::context;
    use voice_agent_config::{ExotelConfig, ProviderConfig, TelephonyConfig};
    use voice_agent_core::{payload_from_pairs, SequentialRunAllocator};

    fn dispatcher(require_signature: bool) -> InboundDispatcher {
        let config = TelephonyConfig {
            providers: vec![ProviderConfig::Exotel(ExotelConfig {
                account_sid: "acme".to_string(),
                api_key: "k".to_string(),
                api_token: "t".to_string(),
                ..Default::default()
            })],
            ..Default::default()
        };
        let registry = ProviderRegistry::from_config(&config, context()).unwrap();
        InboundDispatcher::new(
            Arc::new(registry),
            Arc::new(SequentialRunAllocator::new(100)),
            context(),
            require_signature,
        )
    }

    fn request<'a>(payload: &'a WebhookPayload, headers: &'a WebhookHeaders) -> InboundRequest<'a> {
        InboundRequest {
            url: "https://voice.example.com/api/v1/telephony/inbound/1/2",
            payload,
            headers,
        }
    }

    #[test]
    fn test_dispatch_accepts_matching_account() {
        let d = dispatcher(true);
        let payload = payload_from_pairs([
            ("CallSid", "abc"),
            ("AccountSid", "acme"),
            ("From", "9876543210"),
        ]);
        let headers = WebhookHeaders::new();
        let dispatch = d.dispatch(&request(&payload, &headers)).unwrap();

        assert_eq!(dispatch.provider.name(), "exotel");
        assert_eq!(dispatch.call.from_number, "+919876543210");
        assert_eq!(dispatch.signature, SignatureVerdict::Unverified);
    }

    #[test]
    fn test_dispatch_account_mismatch() {
        let d = dispatcher(true);
        let payload = payload_from_pairs([("CallSid", "abc"), ("AccountSid", "intruder")]);
        let headers = WebhookHeaders::new();
        let err = d.dispatch(&request(&payload, &headers)).unwrap_err();
        assert!(matches!(err, TelephonyError::AccountMismatch { .. }));
        assert!(err.is_security_event());
    }

    #[test]
    fn test_dispatch_unrecognized() {
        let d = dispatcher(false);
        let payload = payload_from_pairs([("Foo", "bar")]);
        let headers = WebhookHeaders::new();
        assert!(matches!(
            d.dispatch(&request(&payload, &headers)),
            Err(TelephonyError::UnrecognizedProvider)
        ));
    }

    #[tokio::test]
    async fn test_handle_accepts_and_allocates_run() {
        let d = dispatcher(true);
        let payload = payload_from_pairs([("CallSid", "abc"), ("AccountSid", "acme")]);
        let headers = WebhookHeaders::new();
        let outcome = d.handle(7, 8, &request(&payload, &headers)).await;

        assert_eq!(outcome.provider, Some("exotel"));
        let accepted = outcome.result.unwrap();
        assert_eq!(accepted.workflow_run_id, 100);
        assert_eq!(
            accepted.websocket_url,
            "wss://voice.example.com/api/v1/telephony/exotel/ws/7/8/100"
        );
        let body: serde_json::Value = serde_json::from_str(&outcome.response.body).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["workflow_run_id"], 100);
    }

    #[tokio::test]
    async fn test_handle_unrecognized_is_generic_rejection() {
        let d = dispatcher(true);
        let payload = WebhookPayload::new();
        let headers = WebhookHeaders::new();
        let outcome = d.handle(1, 1, &request(&payload, &headers)).await;

        assert_eq!(outcome.provider, None);
        assert!(matches!(outcome.result, Err(TelephonyError::UnrecognizedProvider)));
        let body: serde_json::Value = serde_json::from_str(&outcome.response.body).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_type"], "provider_not_recognized");
    }

    #[tokio::test]
    async fn test_handle_mismatch_uses_vendor_format() {
        let d = dispatcher(true);
        let payload = payload_from_pairs([("CallSid", "abc"), ("AccountSid", "other")]);
        let headers = WebhookHeaders::new();
        let outcome = d.handle(1, 1, &request(&payload, &headers)).await;

        assert_eq!(outcome.provider, Some("exotel"));
        let body: serde_json::Value = serde_json::from_str(&outcome.response.body).unwrap();
        assert_eq!(body["error_type"], "account_validation_failed");
    }
}
