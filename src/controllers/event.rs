use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::{AdminUser, AuthUser};
use crate::models::{Event, EventUpdate};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/event", get(active_event).put(update_event))
}

async fn require_active_event(state: &AppState) -> Result<Event, AppError> {
    state
        .registry
        .active_event()
        .await?
        .ok_or_else(|| AppError::Conflict("no active event".to_string()))
}

// GET /api/event
async fn active_event(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<Event>, AppError> {
    Ok(Json(require_active_event(&state).await?))
}

// PUT /api/event
async fn update_event(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(update): Json<EventUpdate>,
) -> Result<Json<Event>, AppError> {
    update.validate()?;

    let current = require_active_event(&state).await?;
    let event = state
        .registry
        .update_event(&update.apply_to(&current))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("event {} not found", current.id)))?;

    info!(event_id = event.id, by = %admin.username, "Event settings updated");
    Ok(Json(event))
}
