use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{ActivityEntry, AttendanceStats, TimelineBucket};
use crate::AppState;

pub const DEFAULT_ACTIVITY_LIMIT: i64 = 30;
pub const MAX_ACTIVITY_LIMIT: i64 = 100;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(stats))
        .route("/activity", get(activity))
        .route("/timeline", get(timeline))
}

// GET /api/stats
async fn stats(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<AttendanceStats>, AppError> {
    let Some(event) = state.registry.active_event().await? else {
        return Ok(Json(AttendanceStats::default()));
    };

    // Cache-aside: сначала Redis, потом база
    if let Some(cache) = &state.cache {
        if let Some(stats) = cache.get_stats(event.id).await {
            return Ok(Json(stats));
        }
    }

    let stats = state.registry.stats(event.id).await?;
    if let Some(cache) = &state.cache {
        cache.store_stats(event.id, &stats).await;
    }
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    limit: Option<i64>,
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT)
}

// GET /api/activity?limit=
async fn activity(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityEntry>>, AppError> {
    let Some(event) = state.registry.active_event().await? else {
        return Ok(Json(Vec::new()));
    };
    let entries = state
        .registry
        .recent_activity(event.id, clamp_limit(params.limit))
        .await?;
    Ok(Json(entries))
}

// GET /api/timeline
async fn timeline(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<Vec<TimelineBucket>>, AppError> {
    let Some(event) = state.registry.active_event().await? else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(state.registry.timeline(event.id).await?))
}
