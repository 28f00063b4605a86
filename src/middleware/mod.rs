use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::Operator;
use crate::AppState;

/// Verified against when the username is unknown, at the same cost as real hashes.
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| bcrypt::hash("no-such-operator", bcrypt::DEFAULT_COST).unwrap_or_default());

/// Any active operator, authenticated with HTTP Basic.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Operator);

/// An active operator with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Operator);

/// Splits `Authorization: Basic ...` into username and password.
pub fn basic_credentials(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (username, password) = credentials.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

// Basic Auth extractor
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (username, password) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(basic_credentials)
            .ok_or(AppError::Unauthorized)?;

        let operator = state
            .registry
            .find_operator_by_username(&username)
            .await?
            .filter(|op| op.is_active);

        // bcrypt не должен блокировать рантайм; для неизвестного логина
        // сверяем с фиктивным хешем, чтобы время ответа не отличалось
        let candidate = operator.clone();
        let verified = tokio::task::spawn_blocking(move || match candidate {
            Some(op) => op.verify_password(&password),
            None => {
                let _ = bcrypt::verify(&password, &DUMMY_HASH);
                false
            }
        })
        .await
        .unwrap_or(false);

        let operator = match operator {
            Some(op) if verified => op,
            Some(op) => {
                warn!(username = %op.username, "Invalid password");
                return Err(AppError::Unauthorized);
            }
            None => {
                debug!("Login attempt for unknown or inactive operator");
                return Err(AppError::Unauthorized);
            }
        };

        if let Err(e) = state.registry.touch_last_login(operator.id).await {
            warn!(operator_id = operator.id, "Failed to update last_login: {}", e);
        }

        Ok(AuthUser(operator))
    }
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(operator) = AuthUser::from_request_parts(parts, state).await?;
        if !operator.is_admin() {
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(operator))
    }
}
