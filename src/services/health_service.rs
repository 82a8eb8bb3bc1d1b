use crate::{dto::health::HealthResponse, state::SharedRegistry};

/// Respond with the current session counts.
pub fn health_status(registry: &SharedRegistry) -> HealthResponse {
    HealthResponse::ok(registry.connection_count(), registry.room_count())
}
