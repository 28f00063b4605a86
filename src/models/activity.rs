use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Checkin,
    DuplicateScan,
    Import,
    Invite,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Checkin => "checkin",
            ActivityAction::DuplicateScan => "duplicate_scan",
            ActivityAction::Import => "import",
            ActivityAction::Invite => "invite",
        }
    }
}

impl FromStr for ActivityAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkin" => Ok(ActivityAction::Checkin),
            "duplicate_scan" => Ok(ActivityAction::DuplicateScan),
            "import" => Ok(ActivityAction::Import),
            "invite" => Ok(ActivityAction::Invite),
            other => Err(format!("unknown activity action '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub event_id: i64,
    pub action: ActivityAction,
    pub guest_id: Option<i64>,
    pub user_id: Option<i64>,
    pub details: String,
}

/// A row of the activity feed, joined with guest and operator names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub event_id: i64,
    pub action: ActivityAction,
    pub guest_id: Option<i64>,
    pub user_id: Option<i64>,
    pub details: String,
    pub guest_name: Option<String>,
    pub user_name: Option<String>,
    pub created_at: DateTime<Utc>,
}
