use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

/// Base path of the versioned API
pub const API_PREFIX: &str = "/api/v1.0";

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let index = || get(handlers::index).fallback(handlers::method_not_allowed);

    let api_routes = Router::new()
        .route(
            "/webhooks/mailgun/lead/:kind",
            post(handlers::webhooks::mailgun_lead_event).fallback(handlers::method_not_allowed),
        )
        .route(
            "/automation/dashboard/health/status",
            get(handlers::dashboard::dashboard_status).fallback(handlers::method_not_allowed),
        )
        .route("/index", index());

    Router::new()
        .route(
            "/health",
            get(handlers::health).fallback(handlers::method_not_allowed),
        )
        .route("/api", index())
        .route(API_PREFIX, index())
        .nest(API_PREFIX, api_routes)
        .fallback(handlers::no_route)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
