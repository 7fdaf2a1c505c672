//! Email sending handlers

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    domain::delivery::{DeliveryOutcome, DeliveryService, FallbackPolicy, Message},
    infrastructure::http::{errors::ApiError, state::AppState},
};

pub mod send_email;
pub mod send_email_with_attachment;
pub mod send_simple_email;

/// Returned instead of sending when no SMTP credentials are configured
pub const SMTP_NOT_CONFIGURED: &str =
    "SMTP configuration is incomplete. Check the environment variables.";

/// Send email response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EmailResponse {
    /// Always `success`; failures are reported as errors
    #[schema(example = "success")]
    pub status: String,

    /// A human readable summary
    #[schema(example = "Email sent successfully to 2 recipients")]
    pub message: String,

    /// The number of envelope recipients
    #[schema(example = 2)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<usize>,

    /// The SMTP relay that accepted the message
    #[schema(example = "smtp.example.com:587")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_used: Option<String>,

    /// The alternate relay that accepted the message, if not the primary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<String>,
}

impl TryFrom<DeliveryOutcome> for EmailResponse {
    type Error = ApiError;

    fn try_from(outcome: DeliveryOutcome) -> Result<Self, Self::Error> {
        if !outcome.is_success() {
            warn!(
                status = %outcome.status,
                message = %outcome.message,
                diagnostic = ?outcome.diagnostic,
                "email delivery failed"
            );

            return Err(ApiError::new_500(&outcome.message));
        }

        info!(
            recipients = outcome.recipient_count,
            server = outcome.server_used.as_deref(),
            fallback = outcome.fallback_used.as_deref(),
            "email delivered"
        );

        Ok(Self {
            status: outcome.status.to_string(),
            message: outcome.message,
            recipients: outcome.recipient_count,
            server_used: outcome.server_used,
            fallback_used: outcome.fallback_used,
        })
    }
}

/// Hands a validated message to the delivery service, refusing to when SMTP
/// is not configured
async fn deliver<D: DeliveryService>(
    state: &AppState<D>,
    message: &Message,
    policy: FallbackPolicy,
) -> Result<EmailResponse, ApiError> {
    if !state.config.smtp_configured {
        warn!("refusing to send: SMTP credentials are not configured");

        return Err(ApiError::new_500(SMTP_NOT_CONFIGURED));
    }

    state.deliveries.send(message, policy).await.try_into()
}
