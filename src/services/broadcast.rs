//! broadcast.rs
//!
//! Volatile fan-out of check-in activity to live dashboards.
//!
//! Listeners subscribe while connected and only see events published after
//! they subscribed. Nothing is queued for absent listeners and nothing is
//! replayed; a dashboard that reconnects re-reads the registry instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::{Guest, GuestSummary, Operator, OperatorSummary};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// A message on the live feed, serialized as `{"type": "checkin", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Checkin {
        guest: GuestSummary,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<OperatorSummary>,
        timestamp: DateTime<Utc>,
    },
    DuplicateScan {
        guest: GuestSummary,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<OperatorSummary>,
        timestamp: DateTime<Utc>,
    },
}

impl LiveEvent {
    pub fn checkin(guest: &Guest, actor: Option<&Operator>, timestamp: DateTime<Utc>) -> Self {
        LiveEvent::Checkin {
            guest: guest.summary(),
            user: actor.map(Operator::summary),
            timestamp,
        }
    }

    pub fn duplicate_scan(
        guest: &Guest,
        actor: Option<&Operator>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        LiveEvent::DuplicateScan {
            guest: guest.summary(),
            user: actor.map(Operator::summary),
            timestamp,
        }
    }

    pub fn guest(&self) -> &GuestSummary {
        match self {
            LiveEvent::Checkin { guest, .. } | LiveEvent::DuplicateScan { guest, .. } => guest,
        }
    }
}

/// Cheap to clone; all clones publish into the same channel.
#[derive(Clone)]
pub struct ActivityBroadcaster {
    sender: broadcast::Sender<LiveEvent>,
}

impl ActivityBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.sender.subscribe()
    }

    /// Fire-and-forget. Returns how many listeners the event was handed to;
    /// never blocks and never fails the caller.
    pub fn publish(&self, event: LiveEvent) -> usize {
        match self.sender.send(event) {
            Ok(listeners) => listeners,
            Err(_) => {
                debug!("No live listeners connected, event dropped");
                0
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ActivityBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
