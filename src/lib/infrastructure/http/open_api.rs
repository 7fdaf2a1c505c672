//! OpenAPI module

use utoipa::OpenApi;

use crate::infrastructure::http::{
    errors::ErrorResponse,
    handlers::{index, v1::*},
};

#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "Email Sender API"),
    paths(
        index::handler,
        health::handler,
        uptime::handler,
        emails::send_email::handler,
        emails::send_simple_email::handler,
        emails::send_email_with_attachment::handler,
    ),
    components(schemas(
        index::IndexResponse,
        health::HealthResponse,
        uptime::UptimeResponse,
        emails::EmailResponse,
        emails::send_email::SendEmailBody,
        emails::send_email::AttachmentBody,
        emails::send_simple_email::SendSimpleEmailBody,
        emails::send_email_with_attachment::SendEmailWithAttachmentForm,
        ErrorResponse,
    ))
)]
pub struct ApiDocs;
