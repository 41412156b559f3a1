//! Live dashboard endpoint

use axum::{Json, extract::State};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{SnapshotResponse, TargetSummary},
};

/// GET /api/v1/snapshot
///
/// Latest view of every target, ordered by url
pub async fn get_snapshot(State(state): State<ApiState>) -> ApiResult<Json<SnapshotResponse>> {
    let snapshot = state
        .dashboard
        .snapshot()
        .await
        .ok_or_else(|| ApiError::Unavailable("dashboard is not running".to_string()))?;

    let targets: Vec<TargetSummary> = snapshot.values().map(TargetSummary::from).collect();
    let count = targets.len();

    Ok(Json(SnapshotResponse { targets, count }))
}
