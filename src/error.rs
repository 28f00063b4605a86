//! HTTP-facing error type shared by all controllers.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::registry::RegistryError;
use crate::services::accounts::AccountError;
use crate::services::checkin::CheckinError;
use crate::services::invitations::InvitationError;

pub const AUTH_REALM: &str = "Basic realm=\"guest-checkin\"";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    Unauthorized,

    #[error("admin access required")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Checkin(#[from] CheckinError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Registry(RegistryError::DuplicateUsername(_)) => StatusCode::CONFLICT,
            AppError::Registry(_) | AppError::Checkin(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<InvitationError> for AppError {
    fn from(e: InvitationError) -> Self {
        match e {
            InvitationError::NotConfigured => AppError::Conflict(e.to_string()),
            InvitationError::CircuitOpen | InvitationError::Gateway(_) => {
                AppError::BadGateway(e.to_string())
            }
        }
    }
}

impl From<AccountError> for AppError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Registry(e) => AppError::Registry(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::BadRequest(format!("invalid input: {e}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            // детали только в лог, клиенту - общее сообщение
            error!("Request failed: {}", self);
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let mut response =
            (status, Json(json!({ "success": false, "message": message }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(AUTH_REALM),
            );
        }
        response
    }
}
