//! Provider registry
//!
//! Holds one adapter per configured vendor in configuration order. Inbound
//! detection asks each adapter in that order; the first claim wins.

use voice_agent_config::TelephonyConfig;
use voice_agent_core::{Result, TelephonyError, WebhookHeaders, WebhookPayload};

use crate::provider::{AdapterContext, ProviderAdapter, TelephonyProvider};

#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: Vec<TelephonyProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every configured provider
    pub fn from_config(config: &TelephonyConfig, context: AdapterContext) -> Result<Self> {
        let mut registry = Self::new();
        for provider_config in &config.providers {
            let provider = TelephonyProvider::from_config(provider_config, context.clone());
            if !provider.adapter().validate_config() {
                tracing::warn!(
                    provider = provider.name(),
                    "Telephony provider is missing credentials"
                );
            }
            registry.register(provider)?;
        }
        tracing::info!(providers = ?registry.names(), "Telephony providers registered");
        Ok(registry)
    }

    /// Add a provider at the lowest detection priority
    pub fn register(&mut self, provider: TelephonyProvider) -> Result<()> {
        if self.providers.iter().any(|p| p.name() == provider.name()) {
            return Err(TelephonyError::Configuration(format!(
                "Provider '{}' registered twice",
                provider.name()
            )));
        }
        self.providers.push(provider);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&dyn ProviderAdapter> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .map(TelephonyProvider::adapter)
            .ok_or_else(|| TelephonyError::UnknownProvider(name.to_string()))
    }

    /// First provider that claims the payload
    pub fn detect(
        &self,
        payload: &WebhookPayload,
        headers: &WebhookHeaders,
    ) -> Result<&dyn ProviderAdapter> {
        self.providers
            .iter()
            .map(TelephonyProvider::adapter)
            .find(|adapter| adapter.can_handle_webhook(payload, headers))
            .ok_or(TelephonyError::UnrecognizedProvider)
    }

    /// Every provider that claims the payload. More than one means the
    /// detection rules overlap.
    pub fn detect_all(&self, payload: &WebhookPayload, headers: &WebhookHeaders) -> Vec<&'static str> {
        let claims: Vec<&'static str> = self
            .providers
            .iter()
            .map(TelephonyProvider::adapter)
            .filter(|adapter| adapter.can_handle_webhook(payload, headers))
            .map(|adapter| adapter.name())
            .collect();
        if claims.len() > 1 {
            tracing::warn!(providers = ?claims, "Webhook claimed by more than one provider");
        }
        claims
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(TelephonyProvider::name).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::context;
    use voice_agent_config::{ExotelConfig, ProviderConfig, TwilioConfig};
    use voice_agent_core::payload_from_pairs;

    fn config() -> TelephonyConfig {
        TelephonyConfig {
            providers: vec![
                ProviderConfig::Exotel(ExotelConfig {
                    account_sid: "acme".to_string(),
                    api_key: "k".to_string(),
                    api_token: "t".to_string(),
                    ..Default::default()
                }),
                ProviderConfig::Twilio(TwilioConfig {
                    account_sid: "AC0123456789abcdef0123456789abcdef".to_string(),
                    auth_token: "secret".to_string(),
                    ..Default::default()
                }),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_from_config_preserves_order() {
        let registry = ProviderRegistry::from_config(&config(), context()).unwrap();
        assert_eq!(registry.names(), vec!["exotel", "twilio"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_get_unknown_provider() {
        let registry = ProviderRegistry::from_config(&config(), context()).unwrap();
        assert_eq!(registry.get("twilio").unwrap().name(), "twilio");
        assert!(matches!(
            registry.get("plivo"),
            Err(TelephonyError::UnknownProvider(name)) if name == "plivo"
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ProviderRegistry::new();
        let cfg = ProviderConfig::Exotel(ExotelConfig::default());
        registry
            .register(TelephonyProvider::from_config(&cfg, context()))
            .unwrap();
        assert!(matches!(
            registry.register(TelephonyProvider::from_config(&cfg, context())),
            Err(TelephonyError::Configuration(_))
        ));
    }

    #[test]
    fn test_detect() {
        let registry = ProviderRegistry::from_config(&config(), context()).unwrap();
        let headers = WebhookHeaders::new();

        let exotel = payload_from_pairs([("CallSid", "abc"), ("AccountSid", "acme")]);
        assert_eq!(registry.detect(&exotel, &headers).unwrap().name(), "exotel");

        let twilio = payload_from_pairs([
            ("CallSid", "CA1"),
            ("AccountSid", "AC0123456789abcdef0123456789abcdef"),
        ]);
        assert_eq!(registry.detect(&twilio, &headers).unwrap().name(), "twilio");

        assert!(matches!(
            registry.detect(&WebhookPayload::new(), &headers),
            Err(TelephonyError::UnrecognizedProvider)
        ));
    }

    #[test]
    fn test_empty_registry_detects_nothing() {
        let registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        let payload = payload_from_pairs([("CallSid", "abc"), ("AccountSid", "acme")]);
        assert!(registry.detect(&payload, &WebhookHeaders::new()).is_err());
        assert!(registry.detect_all(&payload, &WebhookHeaders::new()).is_empty());
    }
}
