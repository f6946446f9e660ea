pub mod page;
pub mod redesign;
pub mod upload;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/", get(page::index_handler))
        .route("/health", get(page::health_handler))
        .route("/api/describe", post(redesign::describe_handler))
        .route("/api/analyze-image", post(redesign::analyze_image_handler))
        .route("/api/redesign", post(redesign::redesign_handler))
        .route("/api/generate-image", post(redesign::redesign_handler))
        // Media uploads are relayed whatever their size.
        .route(
            "/api/upload",
            post(upload::upload_handler).layer(DefaultBodyLimit::disable()),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
