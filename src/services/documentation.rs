use utoipa::OpenApi;

/// Aggregated OpenAPI specification for Tune Blitz Back.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::game::RoundStart,
            crate::dto::game::RoundEnd,
            crate::state::game::Track,
            crate::state::room::User,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "WebSocket operations for game clients"),
    )
)]
pub struct ApiDoc;
