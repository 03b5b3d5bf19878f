//! Telephony provider configuration
//!
//! Providers are listed in priority order. Inbound webhook detection asks
//! each configured provider in this order and the first match wins.

use serde::{Deserialize, Deserializer, Serialize};

/// Telephony section of the settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    /// Configured providers, in detection priority order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Reject inbound webhooks whose signature positively fails verification
    #[serde(default = "default_true")]
    pub require_signature: bool,

    /// Timeout for each vendor REST call in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Timeout for each handshake control message in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_http_timeout() -> u64 {
    10
}

fn default_handshake_timeout() -> u64 {
    10
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            require_signature: true,
            http_timeout_secs: default_http_timeout(),
            handshake_timeout_secs: default_handshake_timeout(),
        }
    }
}

/// Per-vendor credentials, tagged by `provider`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderConfig {
    Exotel(ExotelConfig),
    Twilio(TwilioConfig),
}

impl ProviderConfig {
    /// Provider name as used in routes and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exotel(_) => "exotel",
            Self::Twilio(_) => "twilio",
        }
    }
}

/// Exotel credentials
///
/// Fields default to empty so that an incomplete block still loads; the
/// adapter then reports itself non-functional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExotelConfig {
    /// Account SID, usually the account name (e.g. "callmate4")
    #[serde(default)]
    pub account_sid: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub api_token: String,

    /// API host
    #[serde(default = "default_exotel_subdomain")]
    pub subdomain: String,

    /// Origin numbers; a single string is accepted
    #[serde(default, deserialize_with = "one_or_many")]
    pub from_numbers: Vec<String>,

    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Overrides `https://{subdomain}/v1/Accounts/{account_sid}`
    #[serde(default)]
    pub api_base_url: Option<String>,
}

fn default_exotel_subdomain() -> String {
    "api.exotel.com".to_string()
}

impl Default for ExotelConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            api_key: String::new(),
            api_token: String::new(),
            subdomain: default_exotel_subdomain(),
            from_numbers: Vec::new(),
            webhook_secret: None,
            api_base_url: None,
        }
    }
}

impl ExotelConfig {
    pub fn base_url(&self) -> String {
        match &self.api_base_url {
            Some(base) if !base.is_empty() => base.trim_end_matches('/').to_string(),
            _ => format!(
                "https://{}/v1/Accounts/{}",
                self.subdomain, self.account_sid
            ),
        }
    }
}

/// Twilio credentials
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TwilioConfig {
    /// Account SID, `AC` followed by 32 hex characters
    #[serde(default)]
    pub account_sid: String,

    /// Auth token; also the webhook signing key
    #[serde(default)]
    pub auth_token: String,

    #[serde(default, deserialize_with = "one_or_many")]
    pub from_numbers: Vec<String>,

    /// Overrides `https://api.twilio.com/2010-04-01/Accounts/{account_sid}`
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl TwilioConfig {
    pub fn base_url(&self) -> String {
        match &self.api_base_url {
            Some(base) if !base.is_empty() => base.trim_end_matches('/').to_string(),
            _ => format!(
                "https://api.twilio.com/2010-04-01/Accounts/{}",
                self.account_sid
            ),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let numbers = match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(number)) => vec![number],
        Some(OneOrMany::Many(numbers)) => numbers,
    };
    Ok(numbers
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_tagging() {
        let yaml = r#"
- provider: exotel
  account_sid: acme
  api_key: k
  api_token: t
  from_numbers: "+910000000001"
- provider: twilio
  account_sid: AC0123456789abcdef0123456789abcdef
  auth_token: secret
  from_numbers: ["+14155550100", "+14155550101"]
"#;
        let providers: Vec<ProviderConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(providers.len(), 2);

        match &providers[0] {
            ProviderConfig::Exotel(cfg) => {
                assert_eq!(cfg.account_sid, "acme");
                assert_eq!(cfg.subdomain, "api.exotel.com");
                assert_eq!(cfg.from_numbers, vec!["+910000000001".to_string()]);
            },
            other => panic!("expected exotel, got {:?}", other),
        }
        assert_eq!(providers[1].name(), "twilio");
    }

    #[test]
    fn test_incomplete_config_still_loads() {
        let cfg: ExotelConfig = serde_json::from_str(r#"{"account_sid": "acme"}"#).unwrap();
        assert!(cfg.api_key.is_empty());
        assert!(cfg.from_numbers.is_empty());
    }

    #[test]
    fn test_base_url_override() {
        let mut cfg = ExotelConfig {
            account_sid: "acme".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.base_url(), "https://api.exotel.com/v1/Accounts/acme");

        cfg.api_base_url = Some("http://127.0.0.1:9000/v1/Accounts/acme/".to_string());
        assert_eq!(cfg.base_url(), "http://127.0.0.1:9000/v1/Accounts/acme");
    }

    #[test]
    fn test_telephony_defaults() {
        let cfg = TelephonyConfig::default();
        assert!(cfg.require_signature);
        assert_eq!(cfg.http_timeout_secs, 10);
        assert!(cfg.providers.is_empty());
    }
}
