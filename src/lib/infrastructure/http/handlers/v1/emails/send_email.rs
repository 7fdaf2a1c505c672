//! Send email handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    domain::delivery::{
        Attachment, ContentKind, DeliveryService, EmailAddress, FallbackPolicy, Message, Sender,
    },
    infrastructure::http::{
        errors::{ApiError, ErrorResponse},
        state::AppState,
    },
};

use super::{deliver, EmailResponse};

/// An attachment carried inline in a JSON request
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AttachmentBody {
    /// The file name shown to recipients
    #[schema(example = "report.pdf")]
    pub filename: String,

    /// The file content, base64 encoded
    #[schema(example = "SGVsbG8sIHdvcmxkIQ==")]
    pub content: String,
}

impl TryFrom<AttachmentBody> for Attachment {
    type Error = ApiError;

    fn try_from(body: AttachmentBody) -> Result<Self, Self::Error> {
        let content = STANDARD.decode(body.content.trim()).map_err(|_| {
            ApiError::new_422(&format!(
                "Attachment \"{}\" is not valid base64",
                body.filename
            ))
        })?;

        Ok(Attachment::new(&body.filename, content)?)
    }
}

/// Send email request body
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SendEmailBody {
    /// The primary recipients
    #[schema(example = json!(["first@example.com", "second@example.com"]))]
    pub to_emails: Vec<String>,

    /// The subject line
    #[schema(example = "Monthly report")]
    pub subject: String,

    /// The message body
    #[schema(example = "Please find the report attached.")]
    pub body: String,

    /// Carbon copy recipients
    #[serde(default)]
    pub cc_emails: Option<Vec<String>>,

    /// Blind carbon copy recipients, never shown to other recipients
    #[serde(default)]
    pub bcc_emails: Option<Vec<String>>,

    /// Send the body as `text/html`
    #[serde(default)]
    pub is_html: Option<bool>,

    /// Try alternate relays and the HTTP provider when the primary relay
    /// fails. Defaults to `true`.
    #[serde(default)]
    pub use_fallback: Option<bool>,

    /// Inline attachments
    #[serde(default)]
    pub attachments: Option<Vec<AttachmentBody>>,
}

fn parse_addresses(raw: Option<Vec<String>>) -> Result<Vec<EmailAddress>, ApiError> {
    raw.unwrap_or_default()
        .iter()
        .map(|address| EmailAddress::new(address).map_err(ApiError::from))
        .collect()
}

impl SendEmailBody {
    fn into_message(self, sender: Sender) -> Result<(Message, FallbackPolicy), ApiError> {
        let to = parse_addresses(Some(self.to_emails))?;
        let cc = parse_addresses(self.cc_emails)?;
        let bcc = parse_addresses(self.bcc_emails)?;

        let attachments = self
            .attachments
            .unwrap_or_default()
            .into_iter()
            .map(Attachment::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let message = Message::new(
            sender,
            to,
            &self.subject,
            &self.body,
            ContentKind::from_html_flag(self.is_html.unwrap_or(false)),
        )?
        .with_cc(cc)
        .with_bcc(bcc)
        .with_attachments(attachments);

        let policy = FallbackPolicy {
            use_fallback: self.use_fallback.unwrap_or(true),
        };

        Ok((message, policy))
    }
}

/// Send an email with cc, bcc, html and attachments
#[utoipa::path(
    post,
    operation_id = "send_email",
    tag = "Email",
    path = "/api/v1/send-email",
    request_body = SendEmailBody,
    responses(
        (status = StatusCode::OK, description = "Email sent", body = EmailResponse),
        (status = StatusCode::UNPROCESSABLE_ENTITY, description = "Invalid request", body = ErrorResponse),
        (status = StatusCode::INTERNAL_SERVER_ERROR, description = "Email could not be delivered", body = ErrorResponse),
    )
)]
pub async fn handler<D: DeliveryService>(
    State(state): State<AppState<D>>,
    request: Result<Json<SendEmailBody>, JsonRejection>,
) -> Result<Json<EmailResponse>, ApiError> {
    let Json(request) = request?;

    let (message, policy) = request.into_message(state.config.sender.clone())?;

    Ok(Json(deliver(&state, &message, policy).await?))
}
