use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::{AdminUser, AuthUser};
use crate::models::{ActivityAction, Guest, NewActivity, NewGuest};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/guests", get(list_guests).post(register_guests))
        .route("/guests/export", get(export_guests))
        .route("/guests/{id}", get(get_guest))
}

#[derive(Debug, Deserialize)]
struct GuestsQuery {
    search: Option<String>,
}

// GET /api/guests?search=
async fn list_guests(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<GuestsQuery>,
) -> Result<Json<Vec<Guest>>, AppError> {
    let Some(event) = state.registry.active_event().await? else {
        return Ok(Json(Vec::new()));
    };
    let search = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let guests = state.registry.list_guests(event.id, search).await?;
    Ok(Json(guests))
}

// GET /api/guests/{id}
async fn get_guest(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Guest>, AppError> {
    state
        .registry
        .find_guest_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("guest {id} not found")))
}

#[derive(Debug, Deserialize, Validate)]
struct RegisterGuestsRequest {
    #[validate(length(min = 1, max = 5000), nested)]
    guests: Vec<NewGuest>,
}

// POST /api/guests
async fn register_guests(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<RegisterGuestsRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let event = state
        .registry
        .active_event()
        .await?
        .ok_or_else(|| AppError::Conflict("no active event".to_string()))?;

    let created = state.registry.register_guests(event.id, &req.guests).await?;
    info!(
        event_id = event.id,
        imported = created.len(),
        by = %admin.username,
        "Guests registered"
    );

    let entry = NewActivity {
        event_id: event.id,
        action: ActivityAction::Import,
        guest_id: None,
        user_id: Some(admin.id),
        details: format!("Imported {} guests", created.len()),
    };
    if let Err(e) = state.registry.record_activity(entry).await {
        tracing::error!("Failed to write import activity: {}", e);
    }
    if let Some(cache) = &state.cache {
        cache.invalidate_stats(event.id).await;
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "imported": created.len(), "guests": created })),
    ))
}

const CSV_HEADER: &str = "Name,Category,Table,Dietary,Phone,Email,Checked In,Checked In At";

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Guest list as CSV, one row per guest record.
pub fn guests_csv(guests: &[Guest]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for g in guests {
        let checked_in_at = g
            .checked_in_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default();
        let fields = [
            csv_field(&g.name),
            g.category.as_str().to_string(),
            csv_field(g.table_number.as_deref().unwrap_or_default()),
            csv_field(g.dietary_restrictions.as_deref().unwrap_or_default()),
            csv_field(g.phone.as_deref().unwrap_or_default()),
            csv_field(g.email.as_deref().unwrap_or_default()),
            if g.checked_in { "Yes" } else { "No" }.to_string(),
            checked_in_at,
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

// GET /api/guests/export
async fn export_guests(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
) -> Result<impl IntoResponse, AppError> {
    let event = state
        .registry
        .active_event()
        .await?
        .ok_or_else(|| AppError::Conflict("no active event".to_string()))?;
    let guests = state.registry.list_guests(event.id, None).await?;
    info!(event_id = event.id, rows = guests.len(), by = %admin.username, "Guest list exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"guests.csv\""),
        ],
        guests_csv(&guests),
    ))
}
