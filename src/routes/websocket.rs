use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{services::websocket_service, state::SharedRegistry};

#[utoipa::path(
    get,
    path = "/ws",
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a game client WebSocket session.
pub async fn ws_handler(
    State(registry): State<SharedRegistry>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_socket(registry, socket))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedRegistry> {
    Router::<SharedRegistry>::new().route("/ws", get(ws_handler))
}
