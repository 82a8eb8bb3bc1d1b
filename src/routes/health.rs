use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::health::HealthResponse, services::health_service, state::SharedRegistry};

#[utoipa::path(
    get,
    path = "/healthcheck",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
/// Return the current health status and session counts.
pub async fn healthcheck(State(registry): State<SharedRegistry>) -> Json<HealthResponse> {
    Json(health_service::health_status(&registry))
}

/// Configure the health routes subtree.
pub fn router() -> Router<SharedRegistry> {
    Router::<SharedRegistry>::new().route("/healthcheck", get(healthcheck))
}
