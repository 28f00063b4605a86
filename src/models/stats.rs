use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attendance counters for the dashboard.
///
/// `total_people` and `checked_in_people` weight family guests by their
/// `family_size`; the other two count guest records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub total: i64,
    pub checked_in: i64,
    pub total_people: i64,
    pub checked_in_people: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineBucket {
    pub minute: DateTime<Utc>,
    pub count: i64,
}
