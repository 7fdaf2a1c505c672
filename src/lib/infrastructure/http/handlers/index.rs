//! Service index

use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The index response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IndexResponse {
    /// The service name
    #[schema(example = "Email Sender API")]
    pub message: String,

    /// The service version
    #[schema(example = "0.1.0")]
    pub version: String,

    /// The available endpoints
    pub endpoints: Vec<String>,
}

/// Describe the service and its endpoints
#[utoipa::path(
    get,
    operation_id = "index",
    tag = "System",
    path = "/",
    responses(
        (status = StatusCode::OK, description = "Service description", body = IndexResponse),
    )
)]
pub async fn handler() -> Json<IndexResponse> {
    let endpoints = [
        "POST /api/v1/send-email - send an email with cc, bcc, html and attachments",
        "POST /api/v1/send-simple-email - send a plain email to one recipient",
        "POST /api/v1/send-email-with-attachment - send an email with an uploaded file",
        "GET /api/v1/health - check the service status",
        "GET /api/v1/uptime - seconds since the service started",
        "GET /api/v1 - API documentation",
    ];

    Json(IndexResponse {
        message: "Email Sender API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: endpoints.iter().map(ToString::to_string).collect(),
    })
}
