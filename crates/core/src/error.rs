//! Telephony error taxonomy

use thiserror::Error;

use crate::session::CloseReason;

/// Errors surfaced by the telephony adapter layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelephonyError {
    /// Missing or invalid credentials. Fatal to the operation, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Vendor answered with a non-2xx status
    #[error("{provider} API error (HTTP {status}): {body}")]
    VendorApi {
        provider: String,
        status: u16,
        body: String,
    },

    /// Connection reset, DNS failure, timeout or undecodable vendor body
    #[error("Transport error: {0}")]
    Transport(String),

    /// No registered adapter claimed an inbound payload
    #[error("Unrecognized telephony provider for inbound webhook")]
    UnrecognizedProvider,

    /// Lookup by provider name found nothing
    #[error("Unknown telephony provider: {0}")]
    UnknownProvider(String),

    /// Account identifier in the payload does not match configuration
    #[error("Account mismatch for {provider}: {account_id:?}")]
    AccountMismatch { provider: String, account_id: String },

    /// Webhook signature did not verify
    #[error("Invalid webhook signature for {provider}")]
    SignatureRejected { provider: String },

    /// Audio handshake message malformed or out of order
    #[error("Protocol violation: {0}")]
    ProtocolViolation(CloseReason),

    /// Collaborator (persistence, tunnel) failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TelephonyError {
    /// Kind used for error-message lookup and vendor error documents
    pub fn kind(&self) -> TelephonyErrorKind {
        match self {
            Self::Configuration(_) => TelephonyErrorKind::ProviderNotConfigured,
            Self::VendorApi { .. } | Self::Transport(_) => TelephonyErrorKind::VendorUnavailable,
            Self::UnrecognizedProvider | Self::UnknownProvider(_) => {
                TelephonyErrorKind::ProviderNotRecognized
            },
            Self::AccountMismatch { .. } => TelephonyErrorKind::AccountValidationFailed,
            Self::SignatureRejected { .. } => TelephonyErrorKind::SignatureValidationFailed,
            Self::ProtocolViolation(_) => TelephonyErrorKind::ProtocolViolation,
            Self::Internal(_) => TelephonyErrorKind::GeneralAuthFailed,
        }
    }

    /// Security-relevant rejections are logged at warn level by callers
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Self::AccountMismatch { .. } | Self::SignatureRejected { .. }
        )
    }
}

/// Error kinds keyed into the user-facing message table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelephonyErrorKind {
    AccountValidationFailed,
    SignatureValidationFailed,
    ProviderNotRecognized,
    ProviderNotConfigured,
    VendorUnavailable,
    ProtocolViolation,
    GeneralAuthFailed,
}

impl TelephonyErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountValidationFailed => "account_validation_failed",
            Self::SignatureValidationFailed => "signature_validation_failed",
            Self::ProviderNotRecognized => "provider_not_recognized",
            Self::ProviderNotConfigured => "provider_not_configured",
            Self::VendorUnavailable => "vendor_unavailable",
            Self::ProtocolViolation => "protocol_violation",
            Self::GeneralAuthFailed => "general_auth_failed",
        }
    }
}

impl std::fmt::Display for TelephonyErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type for telephony operations
pub type Result<T> = std::result::Result<T, TelephonyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = TelephonyError::AccountMismatch {
            provider: "exotel".to_string(),
            account_id: "other".to_string(),
        };
        assert_eq!(err.kind(), TelephonyErrorKind::AccountValidationFailed);
        assert!(err.is_security_event());

        let err = TelephonyError::VendorApi {
            provider: "twilio".to_string(),
            status: 404,
            body: "not found".to_string(),
        };
        assert_eq!(err.kind().as_str(), "vendor_unavailable");
        assert!(!err.is_security_event());
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[test]
    fn test_protocol_violation_display() {
        let err = TelephonyError::ProtocolViolation(CloseReason::MissingIdentifiers);
        assert_eq!(err.to_string(), "Protocol violation: missing-identifiers");
    }
}
