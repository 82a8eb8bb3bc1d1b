use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedRegistry};

/// Serve the Swagger UI backed by the generated OpenAPI document.
pub fn router(registry: SharedRegistry) -> Router<SharedRegistry> {
    let ui: Router<SharedRegistry> = SwaggerUi::new("/docs")
        .url("/api-doc/openapi.json", ApiDoc::openapi())
        .into();

    ui.with_state(registry)
}
