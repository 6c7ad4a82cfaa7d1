pub mod protocol;
pub mod relay;
pub mod rest;
pub mod state;
pub mod ws_handler;

pub use relay::EventRelay;
pub use rest::{root_handler, treatment_handler, treatment_preflight};
pub use state::AppState;
pub use ws_handler::ws_handler;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
        HeaderValue,
    },
    routing::{get, post},
    Router,
};
use rest::ApiDoc;
use std::sync::Arc;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Request bodies above this size are rejected.
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Builds the complete router: REST endpoints, the relay socket and Swagger UI,
/// with permissive cross-origin headers on every response.
pub fn app(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/", get(root_handler))
        .route(
            "/treatment",
            post(treatment_handler).options(treatment_preflight),
        )
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(TraceLayer::new_for_http())
}
