//! Health handler

use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The health response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests
    #[schema(example = "healthy")]
    pub status: String,

    /// A human readable status
    #[schema(example = "API is running")]
    pub message: String,
}

/// Check that the service is up
#[utoipa::path(
    get,
    operation_id = "health",
    tag = "System",
    path = "/api/v1/health",
    responses(
        (status = StatusCode::OK, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "API is running".to_string(),
    })
}
