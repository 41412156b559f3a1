//! Window history endpoint

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{WindowSummary, WindowsResponse},
};

/// Default number of windows returned
const DEFAULT_LIMIT: usize = 60;

/// Upper bound for the `limit` parameter
const MAX_LIMIT: usize = 1000;

/// Query parameters for window history
#[derive(Debug, Deserialize)]
pub struct WindowsQuery {
    url: String,
    limit: Option<usize>,
}

/// GET /api/v1/windows?url=..&limit=..
///
/// Stored windows of one target, newest first
pub async fn get_windows(
    State(state): State<ApiState>,
    Query(query): Query<WindowsQuery>,
) -> ApiResult<Json<WindowsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ApiError::InvalidRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }

    let snapshot = state
        .dashboard
        .snapshot()
        .await
        .ok_or_else(|| ApiError::Unavailable("dashboard is not running".to_string()))?;
    if !snapshot.contains_key(&query.url) {
        return Err(ApiError::NotFound(format!("unknown target '{}'", query.url)));
    }

    let windows: Vec<WindowSummary> = state
        .storage
        .query_windows(&query.url, limit)
        .await?
        .iter()
        .map(WindowSummary::from)
        .collect();

    Ok(Json(WindowsResponse {
        url: query.url,
        count: windows.len(),
        windows,
    }))
}
