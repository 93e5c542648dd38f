use axum::{extract::State, Json};
use std::sync::Arc;

use crate::error::ApiError;
use crate::monitor::{self, HealthReport};
use crate::server::AppState;

/// Evaluate the dashboard snapshots, enqueueing any alerts they call for
pub async fn dashboard_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthReport>, ApiError> {
    let report = monitor::run_check(&state.db, &state.queue, &state.alerts)
        .map_err(ApiError::storage)?;
    Ok(Json(report))
}
