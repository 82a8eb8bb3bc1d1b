/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Core room and game event handlers.
pub mod room_service;
/// WebSocket connection and broadcast handling.
pub mod websocket_service;
