//! Send email with an uploaded attachment

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
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

/// Multipart form accepted by the attachment endpoint
#[derive(Debug, ToSchema)]
pub struct SendEmailWithAttachmentForm {
    /// Comma-separated primary recipients
    #[schema(example = "first@example.com, second@example.com")]
    pub to_emails: String,

    /// The subject line
    #[schema(example = "Monthly report")]
    pub subject: String,

    /// The message body
    #[schema(example = "Please find the report attached.")]
    pub body: String,

    /// Comma-separated carbon copy recipients
    pub cc_emails: Option<String>,

    /// Send the body as `text/html`
    pub is_html: Option<bool>,

    /// The uploaded file
    #[schema(value_type = String, format = Binary)]
    pub file: Attachment,
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value.ok_or_else(|| ApiError::new_422(&format!("Missing form field \"{field}\"")))
}

fn parse_flag(raw: &str) -> Result<bool, ApiError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "no" | "off" => Ok(false),
        "true" | "1" | "yes" | "on" => Ok(true),
        _ => Err(ApiError::new_422(&format!(
            "\"{raw}\" is not a valid value for is_html"
        ))),
    }
}

impl SendEmailWithAttachmentForm {
    /// Reads the form, holding the file in memory
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut to_emails = None;
        let mut subject = None;
        let mut body = None;
        let mut cc_emails = None;
        let mut is_html = None;
        let mut file = None;

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                "file" => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let content = field.bytes().await?;

                    file = Some(Attachment::new(&filename, content.to_vec())?);
                }
                "to_emails" => to_emails = Some(field.text().await?),
                "subject" => subject = Some(field.text().await?),
                "body" => body = Some(field.text().await?),
                "cc_emails" => cc_emails = Some(field.text().await?),
                "is_html" => is_html = Some(parse_flag(&field.text().await?)?),
                _ => {}
            }
        }

        Ok(Self {
            to_emails: required(to_emails, "to_emails")?,
            subject: required(subject, "subject")?,
            body: required(body, "body")?,
            cc_emails,
            is_html,
            file: file.ok_or_else(|| ApiError::new_422("Missing form field \"file\""))?,
        })
    }

    fn into_message(self, sender: Sender) -> Result<Message, ApiError> {
        let to = EmailAddress::parse_list(&self.to_emails)?;
        let cc = EmailAddress::parse_list(self.cc_emails.as_deref().unwrap_or_default())?;

        Ok(Message::new(
            sender,
            to,
            &self.subject,
            &self.body,
            ContentKind::from_html_flag(self.is_html.unwrap_or(false)),
        )?
        .with_cc(cc)
        .with_attachments(vec![self.file]))
    }
}

/// Send an email with one uploaded file attached
#[utoipa::path(
    post,
    operation_id = "send_email_with_attachment",
    tag = "Email",
    path = "/api/v1/send-email-with-attachment",
    request_body(content = SendEmailWithAttachmentForm, content_type = "multipart/form-data"),
    responses(
        (status = StatusCode::OK, description = "Email sent", body = EmailResponse),
        (status = StatusCode::UNPROCESSABLE_ENTITY, description = "Invalid request", body = ErrorResponse),
        (status = StatusCode::INTERNAL_SERVER_ERROR, description = "Email could not be delivered", body = ErrorResponse),
    )
)]
pub async fn handler<D: DeliveryService>(
    State(state): State<AppState<D>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<EmailResponse>, ApiError> {
    let form = SendEmailWithAttachmentForm::from_multipart(multipart?).await?;

    let message = form.into_message(state.config.sender.clone())?;

    Ok(Json(
        deliver(&state, &message, FallbackPolicy::default()).await?,
    ))
}
