//! Send simple email handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    domain::delivery::{
        ContentKind, DeliveryService, EmailAddress, FallbackPolicy, Message, Sender,
    },
    infrastructure::http::{
        errors::{ApiError, ErrorResponse},
        state::AppState,
    },
};

use super::{deliver, EmailResponse};

/// Send simple email request body
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SendSimpleEmailBody {
    /// The recipient
    #[schema(example = "email@example.com")]
    pub to_email: String,

    /// The subject line
    #[schema(example = "Hello")]
    pub subject: String,

    /// The plain text body
    #[schema(example = "Hello, world!")]
    pub body: String,
}

impl SendSimpleEmailBody {
    fn into_message(self, sender: Sender) -> Result<Message, ApiError> {
        let to = EmailAddress::new(&self.to_email)?;

        Ok(Message::new(
            sender,
            vec![to],
            &self.subject,
            &self.body,
            ContentKind::Plain,
        )?)
    }
}

/// Send a plain text email to a single recipient
#[utoipa::path(
    post,
    operation_id = "send_simple_email",
    tag = "Email",
    path = "/api/v1/send-simple-email",
    request_body = SendSimpleEmailBody,
    responses(
        (status = StatusCode::OK, description = "Email sent", body = EmailResponse),
        (status = StatusCode::UNPROCESSABLE_ENTITY, description = "Invalid request", body = ErrorResponse),
        (status = StatusCode::INTERNAL_SERVER_ERROR, description = "Email could not be delivered", body = ErrorResponse),
    )
)]
pub async fn handler<D: DeliveryService>(
    State(state): State<AppState<D>>,
    request: Result<Json<SendSimpleEmailBody>, JsonRejection>,
) -> Result<Json<EmailResponse>, ApiError> {
    let Json(request) = request?;

    let message = request.into_message(state.config.sender.clone())?;

    Ok(Json(
        deliver(&state, &message, FallbackPolicy::default()).await?,
    ))
}
