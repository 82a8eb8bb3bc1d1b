//! Health DTO returned by the `/healthcheck` route.

use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response with current session counts.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always "ok"; the engine holds no external dependency at rest.
    pub status: String,
    /// Number of registered connections.
    pub connections: usize,
    /// Number of live rooms.
    pub rooms: usize,
}

impl HealthResponse {
    /// Build a healthy response from current counts.
    pub fn ok(connections: usize, rooms: usize) -> Self {
        Self {
            status: "ok".to_string(),
            connections,
            rooms,
        }
    }
}
