use axum::Router;

use crate::state::SharedRegistry;

pub mod docs;
pub mod health;
pub mod websocket;

/// Compose all route trees, wiring in the shared registry and documentation.
pub fn router(registry: SharedRegistry) -> Router<()> {
    let api_router = health::router().merge(websocket::router());
    let docs_router = docs::router(registry.clone());

    api_router.merge(docs_router).with_state(registry)
}
