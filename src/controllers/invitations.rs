use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::AppError;
use crate::middleware::AdminUser;
use crate::models::{ActivityAction, NewActivity};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/invitations", post(send_invitations))
}

// POST /api/invitations
async fn send_invitations(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
) -> Result<Json<Value>, AppError> {
    if !state.invitations.is_configured() {
        return Err(AppError::Conflict(
            "invitation webhook not configured".to_string(),
        ));
    }

    let event = state
        .registry
        .active_event()
        .await?
        .ok_or_else(|| AppError::Conflict("no active event".to_string()))?;
    let guests = state.registry.list_guests(event.id, None).await?;

    let receipt = state.invitations.dispatch(&event, &guests).await?;
    info!(
        event_id = event.id,
        sent = receipt.sent,
        skipped = receipt.skipped,
        "Invitations dispatched"
    );

    let entry = NewActivity {
        event_id: event.id,
        action: ActivityAction::Invite,
        guest_id: None,
        user_id: Some(admin.id),
        details: format!("Sent {} invitations", receipt.sent),
    };
    if let Err(e) = state.registry.record_activity(entry).await {
        error!("Failed to write invite activity: {}", e);
    }

    Ok(Json(json!({
        "success": true,
        "sent": receipt.sent,
        "skipped": receipt.skipped,
    })))
}
