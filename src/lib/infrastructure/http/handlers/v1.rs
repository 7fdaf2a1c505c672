use axum::{
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;

use crate::{
    domain::delivery::DeliveryService,
    infrastructure::http::{open_api::ApiDocs, state::AppState},
};

pub mod emails;
pub mod health;
pub mod stoplight;
pub mod uptime;

pub fn router<D: DeliveryService>() -> Router<AppState<D>> {
    Router::new()
        .route("/", get(stoplight::handler))
        .route("/openapi.json", get(Json(ApiDocs::openapi())))
        .route("/health", get(health::handler))
        .route("/uptime", get(uptime::handler))
        .route("/send-email", post(emails::send_email::handler))
        .route("/send-simple-email", post(emails::send_simple_email::handler))
        .route(
            "/send-email-with-attachment",
            post(emails::send_email_with_attachment::handler),
        )
}
