//! checkin.rs
//!
//! The check-in transition: token lookup, one-time state change, activity log,
//! live broadcast, in that order.
//!
//! Whether a scan is the first one is decided entirely by the registry's
//! conditional update ([`GuestRegistry::mark_checked_in`]); this service never
//! reads-then-writes. Once the registry has accepted the write, the check-in is
//! final: later steps (activity log, broadcast) can fail without changing the
//! outcome reported to the caller.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::models::{ActivityAction, Guest, NewActivity, Operator, OperatorSummary};
use crate::registry::{GuestRegistry, RegistryError};
use crate::services::broadcast::{ActivityBroadcaster, LiveEvent};

/// Result of a scan. Serialized as `{"status": "success" | "already" | "not_found", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckinOutcome {
    /// No guest carries this token.
    NotFound,
    /// The guest was checked in earlier; `guest` reflects the bumped scan count.
    #[serde(rename = "already")]
    AlreadyCheckedIn {
        guest: Guest,
        #[serde(skip_serializing_if = "Option::is_none")]
        checked_in_by: Option<OperatorSummary>,
    },
    /// This scan performed the check-in.
    Success { guest: Guest },
}

impl CheckinOutcome {
    pub fn guest(&self) -> Option<&Guest> {
        match self {
            CheckinOutcome::NotFound => None,
            CheckinOutcome::AlreadyCheckedIn { guest, .. } | CheckinOutcome::Success { guest } => {
                Some(guest)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CheckinOutcome::Success { .. })
    }
}

#[derive(Debug, Error)]
pub enum CheckinError {
    #[error("failed to persist check-in: {0}")]
    Persistence(#[from] RegistryError),
}

#[derive(Clone)]
pub struct CheckinService {
    registry: Arc<dyn GuestRegistry>,
    broadcaster: ActivityBroadcaster,
}

impl CheckinService {
    pub fn new(registry: Arc<dyn GuestRegistry>, broadcaster: ActivityBroadcaster) -> Self {
        Self {
            registry,
            broadcaster,
        }
    }

    /// Checks in the guest holding `token`, or records a duplicate scan.
    ///
    /// `actor` is the operator performing the scan; `None` for the public QR
    /// page. Only registry failures surface as errors.
    pub async fn check_in(
        &self,
        token: &str,
        actor: Option<&Operator>,
    ) -> Result<CheckinOutcome, CheckinError> {
        if token.is_empty() {
            return Ok(CheckinOutcome::NotFound);
        }

        let now = Utc::now();
        let actor_id = actor.map(|op| op.id);

        if let Some(guest) = self.registry.mark_checked_in(token, actor_id, now).await? {
            info!(
                guest_id = guest.id,
                family_size = guest.family_size,
                by = actor.map(|op| op.username.as_str()).unwrap_or("qr"),
                "Guest checked in"
            );

            let details = match actor {
                Some(op) => format!("{} checked in by {}", guest.name, op.display_name),
                None => format!("{} checked in via QR scan", guest.name),
            };
            self.log_activity(&guest, ActivityAction::Checkin, actor_id, details)
                .await;
            self.broadcaster
                .publish(LiveEvent::checkin(&guest, actor, now));

            return Ok(CheckinOutcome::Success { guest });
        }

        // Не первый скан: либо гость уже отмечен, либо токена нет
        let Some(guest) = self.registry.record_rescan(token, now).await? else {
            debug!("Scan with unrecognised token");
            return Ok(CheckinOutcome::NotFound);
        };

        info!(
            guest_id = guest.id,
            scan_count = guest.scan_count,
            "Duplicate scan for checked-in guest"
        );

        let checked_in_by = self.original_operator(&guest).await;
        let details = format!(
            "Duplicate scan for {} (scan #{})",
            guest.name, guest.scan_count
        );
        self.log_activity(&guest, ActivityAction::DuplicateScan, actor_id, details)
            .await;
        self.broadcaster
            .publish(LiveEvent::duplicate_scan(&guest, actor, now));

        Ok(CheckinOutcome::AlreadyCheckedIn {
            guest,
            checked_in_by,
        })
    }

    /// Operator check-in from the guest list, addressed by guest id.
    pub async fn check_in_by_id(
        &self,
        guest_id: i64,
        actor: Option<&Operator>,
    ) -> Result<CheckinOutcome, CheckinError> {
        match self.registry.find_guest_by_id(guest_id).await? {
            Some(guest) => self.check_in(&guest.token, actor).await,
            None => Ok(CheckinOutcome::NotFound),
        }
    }

    async fn original_operator(&self, guest: &Guest) -> Option<OperatorSummary> {
        let id = guest.checked_in_by?;
        match self.registry.find_operator(id).await {
            Ok(op) => op.map(|op| op.summary()),
            Err(e) => {
                warn!(guest_id = guest.id, "Could not load checking-in operator: {}", e);
                None
            }
        }
    }

    async fn log_activity(
        &self,
        guest: &Guest,
        action: ActivityAction,
        user_id: Option<i64>,
        details: String,
    ) {
        let entry = NewActivity {
            event_id: guest.event_id,
            action,
            guest_id: Some(guest.id),
            user_id,
            details,
        };
        if let Err(e) = self.registry.record_activity(entry).await {
            error!(
                guest_id = guest.id,
                action = action.as_str(),
                "Failed to write activity entry: {}",
                e
            );
        }
    }
}
