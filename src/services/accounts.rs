//! Operator account helpers shared by startup seeding and the admin API.

use thiserror::Error;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::models::{NewOperator, OperatorRole};
use crate::registry::{GuestRegistry, RegistryError};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("password could not be hashed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("password hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// bcrypt on the blocking pool; one hash takes tens of milliseconds at the default cost.
pub async fn hash_password(password: String, cost: u32) -> Result<String, AccountError> {
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hash)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminSeed {
    Created,
    AlreadyPresent,
    /// No admin exists, but a non-admin operator holds the configured username.
    UsernameTaken,
}

/// Creates the configured admin unless an admin already exists.
pub async fn seed_admin(
    registry: &dyn GuestRegistry,
    auth: &AuthConfig,
    cost: u32,
) -> Result<AdminSeed, AccountError> {
    let password_hash = hash_password(auth.admin_password.clone(), cost).await?;
    let admin = NewOperator {
        username: auth.admin_username.clone(),
        display_name: auth.admin_display_name.clone(),
        password_hash,
        role: OperatorRole::Admin,
    };

    match registry.ensure_admin(admin).await {
        Ok(true) => {
            info!(username = %auth.admin_username, "Admin account created");
            Ok(AdminSeed::Created)
        }
        Ok(false) => Ok(AdminSeed::AlreadyPresent),
        Err(RegistryError::DuplicateUsername(username)) => {
            warn!(
                %username,
                "No admin account exists and the admin username belongs to another operator; \
                 set ADMIN_USERNAME to a free name"
            );
            Ok(AdminSeed::UsernameTaken)
        }
        Err(e) => Err(e.into()),
    }
}
