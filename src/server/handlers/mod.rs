pub mod dashboard;
pub mod webhooks;

use axum::{extract::OriginalUri, Json};
use serde::Serialize;

use super::routes::API_PREFIX;
use crate::error::ApiError;
use crate::webhook::EventKind;

/// Liveness endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
pub struct RouteInfo {
    method: &'static str,
    path: String,
}

#[derive(Serialize)]
pub struct IndexResponse {
    version: &'static str,
    routes: Vec<RouteInfo>,
}

/// List the API's routes
pub async fn index() -> Json<IndexResponse> {
    let mut routes: Vec<RouteInfo> = EventKind::ALL
        .iter()
        .map(|kind| RouteInfo {
            method: "POST",
            path: format!("{}/webhooks/mailgun/lead/{}", API_PREFIX, kind),
        })
        .collect();

    routes.push(RouteInfo {
        method: "GET",
        path: format!("{}/automation/dashboard/health/status", API_PREFIX),
    });

    Json(IndexResponse {
        version: env!("CARGO_PKG_VERSION"),
        routes,
    })
}

/// Fallback for paths no route matches
pub async fn no_route(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::NoRoute(uri.path().to_string())
}

/// Fallback for known paths hit with the wrong method
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
