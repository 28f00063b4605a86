//! Guest registry: the authoritative store of guests, operators and the
//! activity log.
//!
//! Two backends implement [`GuestRegistry`]: [`PostgresRegistry`] for
//! deployments and [`MemoryRegistry`] for local runs and tests. Both must make
//! [`GuestRegistry::mark_checked_in`] an atomic test-and-set per token.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    ActivityEntry, AttendanceStats, Event, Guest, NewActivity, NewGuest, NewOperator, Operator,
    TimelineBucket,
};

pub use memory::MemoryRegistry;
pub use postgres::PostgresRegistry;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt {entity} record {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: i64,
        reason: String,
    },

    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),

    #[error("event {0} does not exist")]
    UnknownEvent(i64),
}

#[async_trait]
pub trait GuestRegistry: Send + Sync {
    /// The lowest-id active event, which registration and dashboards scope to.
    async fn active_event(&self) -> Result<Option<Event>, RegistryError>;

    /// Overwrites name, date and venue of an existing event.
    async fn update_event(&self, event: &Event) -> Result<Option<Event>, RegistryError>;

    async fn find_guest_by_token(&self, token: &str) -> Result<Option<Guest>, RegistryError>;

    async fn find_guest_by_id(&self, id: i64) -> Result<Option<Guest>, RegistryError>;

    /// First check-in for `token`.
    ///
    /// Sets `checked_in`, `checked_in_at`, `checked_in_by`, bumps `scan_count`
    /// and `last_scanned_at` in one step, but only while the guest is not yet
    /// checked in. Returns `None` when no guest matches or the guest was
    /// already checked in. Concurrent calls for one token see exactly one
    /// `Some`.
    async fn mark_checked_in(
        &self,
        token: &str,
        actor: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Option<Guest>, RegistryError>;

    /// Records a scan of an already checked-in guest: bumps `scan_count` and
    /// `last_scanned_at`, nothing else. Returns `None` when no guest matches
    /// or the guest has not been checked in.
    async fn record_rescan(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Guest>, RegistryError>;

    /// Inserts all rows or none. Blank names are skipped.
    async fn register_guests(
        &self,
        event_id: i64,
        guests: &[NewGuest],
    ) -> Result<Vec<Guest>, RegistryError>;

    async fn list_guests(
        &self,
        event_id: i64,
        search: Option<&str>,
    ) -> Result<Vec<Guest>, RegistryError>;

    async fn record_activity(&self, entry: NewActivity) -> Result<(), RegistryError>;

    async fn recent_activity(
        &self,
        event_id: i64,
        limit: i64,
    ) -> Result<Vec<ActivityEntry>, RegistryError>;

    async fn stats(&self, event_id: i64) -> Result<AttendanceStats, RegistryError>;

    async fn timeline(&self, event_id: i64) -> Result<Vec<TimelineBucket>, RegistryError>;

    async fn find_operator(&self, id: i64) -> Result<Option<Operator>, RegistryError>;

    async fn find_operator_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Operator>, RegistryError>;

    async fn create_operator(&self, operator: NewOperator) -> Result<Operator, RegistryError>;

    /// All operators ordered by username.
    async fn list_operators(&self) -> Result<Vec<Operator>, RegistryError>;

    /// Flips `is_active` in one step. Returns `None` for an unknown id.
    async fn toggle_operator_active(&self, id: i64) -> Result<Option<Operator>, RegistryError>;

    async fn touch_last_login(&self, id: i64) -> Result<(), RegistryError>;

    /// Creates `admin` unless some admin already exists. Returns whether it did.
    async fn ensure_admin(&self, admin: NewOperator) -> Result<bool, RegistryError>;
}

/// Usernames are matched case-insensitively and stored lower-case.
pub(crate) fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}
