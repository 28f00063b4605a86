use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AdminUser;
use crate::models::{NewOperator, Operator, OperatorRequest};
use crate::services::accounts::hash_password;
use crate::AppState;

pub const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/operators", get(list_operators).post(create_operator))
        .route("/operators/{id}/toggle", post(toggle_operator))
}

// GET /api/operators
async fn list_operators(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<Operator>>, AppError> {
    Ok(Json(state.registry.list_operators().await?))
}

// POST /api/operators
async fn create_operator(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<OperatorRequest>,
) -> Result<(StatusCode, Json<Operator>), AppError> {
    req.validate()?;

    let password_hash = hash_password(req.password, BCRYPT_COST).await?;
    let operator = state
        .registry
        .create_operator(NewOperator {
            username: req.username,
            display_name: req.display_name.trim().to_string(),
            password_hash,
            role: req.role,
        })
        .await?;

    info!(
        operator_id = operator.id,
        role = %operator.role,
        by = %admin.username,
        "Operator created"
    );
    Ok((StatusCode::CREATED, Json(operator)))
}

// POST /api/operators/{id}/toggle - включить/отключить аккаунт
async fn toggle_operator(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Operator>, AppError> {
    if id == admin.id {
        return Err(AppError::Conflict(
            "you cannot deactivate your own account".to_string(),
        ));
    }

    let operator = state
        .registry
        .toggle_operator_active(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("operator {id} not found")))?;

    info!(
        operator_id = operator.id,
        is_active = operator.is_active,
        by = %admin.username,
        "Operator access toggled"
    );
    Ok(Json(operator))
}
