//! Normalized delivery results

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// The fixed taxonomy of delivery results shared by every transport
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The message was handed off
    Success,
    /// The SMTP relay rejected the credentials
    AuthError,
    /// The connection could not be established
    ConnectionError,
    /// The destination network is unreachable or filtered
    NetworkUnreachable,
    /// Any other OS or network failure
    NetworkError,
    /// A host name could not be resolved
    DnsError,
    /// The provider API key is not configured
    ConfigMissing,
    /// No sender address is configured
    SenderMissing,
    /// The provider rejected the API key
    Authentication,
    /// The provider has not verified the sender identity
    SenderNotVerified,
    /// The provider refused the request for another reason
    Forbidden,
    /// The provider rejected the payload
    BadRequest,
    /// The provider answered with an unexpected status code
    ApiError(u16),
    /// The attempt did not finish in time
    Timeout,
    /// Anything else
    Error,
}

impl DeliveryStatus {
    /// Whether this is the success status
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::AuthError => "auth_error",
            Self::ConnectionError => "connection_error",
            Self::NetworkUnreachable => "network_unreachable",
            Self::NetworkError => "network_error",
            Self::DnsError => "dns_error",
            Self::ConfigMissing => "config_missing",
            Self::SenderMissing => "sender_missing",
            Self::Authentication => "authentication",
            Self::SenderNotVerified => "sender_not_verified",
            Self::Forbidden => "forbidden",
            Self::BadRequest => "bad_request",
            Self::ApiError(code) => return write!(f, "api_error_{code}"),
            Self::Timeout => "timeout",
            Self::Error => "error",
        };

        f.write_str(label)
    }
}

impl Serialize for DeliveryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The result of one send request, built once per attempt chain
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeliveryOutcome {
    /// The normalized status
    pub status: DeliveryStatus,

    /// Human-readable detail
    pub message: String,

    /// Number of envelope recipients, on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_count: Option<usize>,

    /// The SMTP endpoint that accepted the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_used: Option<String>,

    /// The non-primary endpoint that accepted the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<String>,

    /// Structured context for operators, on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Value>,
}

impl DeliveryOutcome {
    /// A successful delivery to `recipient_count` addresses
    pub fn success(message: impl Into<String>, recipient_count: usize) -> Self {
        Self {
            status: DeliveryStatus::Success,
            message: message.into(),
            recipient_count: Some(recipient_count),
            server_used: None,
            fallback_used: None,
            diagnostic: None,
        }
    }

    /// A failed delivery
    pub fn failure(status: DeliveryStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            recipient_count: None,
            server_used: None,
            fallback_used: None,
            diagnostic: None,
        }
    }

    /// Record the endpoint that accepted the message
    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server_used = Some(server.into());
        self
    }

    /// Record the fallback endpoint that accepted the message
    #[must_use]
    pub fn with_fallback(mut self, server: impl Into<String>) -> Self {
        self.fallback_used = Some(server.into());
        self
    }

    /// Attach operator diagnostics
    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: Value) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }

    /// Whether the message was delivered
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
