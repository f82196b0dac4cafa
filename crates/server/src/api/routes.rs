use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{batch, handlers, images, middleware::metrics_middleware, rate_limit};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/stats", get(handlers::get_stats))
        // Batch conversion
        .route("/batch", post(batch::start_batch))
        .route("/batch", delete(batch::cancel_batch))
        .route("/batch/progress", get(batch::get_progress))
        // Artifact maintenance
        .route("/artifacts/orphans", delete(handlers::sweep_orphans))
        .with_state(Arc::clone(&state));

    // Media serving, rate limited per client
    let media_routes = Router::new()
        .route("/{*path}", get(images::serve_image))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit::rate_limit_middleware,
        ))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/media", media_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
