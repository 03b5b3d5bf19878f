//! Narrow interfaces to systems outside the adapter layer

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use crate::call::NormalizedInboundData;
use crate::error::{Result, TelephonyError, TelephonyErrorKind};

/// Resolves the public host (tunnel or ingress) vendors call back on
#[async_trait]
pub trait PublicUrlProvider: Send + Sync {
    /// Host and optional port, without scheme (e.g. `abc.ngrok.app`)
    async fn public_base_url(&self) -> Result<String>;
}

/// Fixed public host from configuration
#[derive(Debug, Clone)]
pub struct StaticPublicUrl {
    host: String,
}

impl StaticPublicUrl {
    /// Accepts a bare host or a URL; scheme and trailing slash are stripped
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let host = base
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("wss://")
            .trim_start_matches("ws://")
            .trim_end_matches('/')
            .to_string();
        Self { host }
    }
}

#[async_trait]
impl PublicUrlProvider for StaticPublicUrl {
    async fn public_base_url(&self) -> Result<String> {
        if self.host.is_empty() {
            return Err(TelephonyError::Configuration(
                "public base URL is not configured".to_string(),
            ));
        }
        Ok(self.host.clone())
    }
}

/// User-facing message table keyed by error kind
pub trait ErrorMessageLookup: Send + Sync {
    fn message(&self, kind: TelephonyErrorKind) -> Option<String>;
}

/// Built-in English messages
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorMessages;

impl ErrorMessageLookup for DefaultErrorMessages {
    fn message(&self, kind: TelephonyErrorKind) -> Option<String> {
        let text = match kind {
            TelephonyErrorKind::AccountValidationFailed => {
                "The account for this call is not configured on this workflow."
            },
            TelephonyErrorKind::SignatureValidationFailed => {
                "The webhook signature could not be verified."
            },
            TelephonyErrorKind::ProviderNotRecognized => {
                "The telephony provider for this request could not be identified."
            },
            TelephonyErrorKind::ProviderNotConfigured => {
                "The telephony provider is not configured."
            },
            TelephonyErrorKind::GeneralAuthFailed => "Authentication failed for this call.",
            TelephonyErrorKind::VendorUnavailable | TelephonyErrorKind::ProtocolViolation => {
                return None
            },
        };
        Some(text.to_string())
    }
}

/// Creates workflow run records for accepted inbound calls
#[async_trait]
pub trait WorkflowRunAllocator: Send + Sync {
    async fn create_run(
        &self,
        workflow_id: i64,
        user_id: i64,
        call: &NormalizedInboundData,
    ) -> Result<i64>;
}

/// Process-local run ids, for deployments without a workflow store
#[derive(Debug)]
pub struct SequentialRunAllocator {
    next: AtomicI64,
}

impl SequentialRunAllocator {
    pub fn new(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }
}

impl Default for SequentialRunAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl WorkflowRunAllocator for SequentialRunAllocator {
    async fn create_run(
        &self,
        workflow_id: i64,
        _user_id: i64,
        call: &NormalizedInboundData,
    ) -> Result<i64> {
        let run_id = self.next.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            workflow_id,
            run_id,
            call_id = %call.call_id,
            provider = %call.provider,
            "Allocated workflow run"
        );
        Ok(run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_public_url_strips_scheme() {
        let provider = StaticPublicUrl::new("https://abc.ngrok.app/");
        assert_eq!(provider.public_base_url().await.unwrap(), "abc.ngrok.app");
    }

    #[tokio::test]
    async fn test_static_public_url_empty_is_configuration_error() {
        let provider = StaticPublicUrl::new("");
        assert!(matches!(
            provider.public_base_url().await,
            Err(TelephonyError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_messages() {
        let messages = DefaultErrorMessages;
        assert!(messages
            .message(TelephonyErrorKind::GeneralAuthFailed)
            .is_some());
        assert!(messages
            .message(TelephonyErrorKind::VendorUnavailable)
            .is_none());
    }

    #[tokio::test]
    async fn test_sequential_allocator() {
        let allocator = SequentialRunAllocator::new(10);
        let call = NormalizedInboundData::default();
        assert_eq!(allocator.create_run(1, 1, &call).await.unwrap(), 10);
        assert_eq!(allocator.create_run(1, 1, &call).await.unwrap(), 11);
    }
}
