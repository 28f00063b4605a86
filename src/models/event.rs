use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub event_date: Option<String>,
    pub venue: Option<String>,
    pub is_active: bool,
}

/// Body of `PUT /api/event`. Missing or blank fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct EventUpdate {
    #[validate(length(max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub event_date: Option<String>,
    #[validate(length(max = 200))]
    pub venue: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl EventUpdate {
    pub fn apply_to(&self, event: &Event) -> Event {
        Event {
            name: non_blank(&self.name).unwrap_or_else(|| event.name.clone()),
            event_date: non_blank(&self.event_date).or_else(|| event.event_date.clone()),
            venue: non_blank(&self.venue).or_else(|| event.venue.clone()),
            ..event.clone()
        }
    }
}
