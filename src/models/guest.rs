use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Number of random bytes behind a check-in token. Nine bytes encode to
/// exactly twelve URL-safe characters.
const TOKEN_BYTES: usize = 9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestCategory {
    Student,
    Parent,
    Teacher,
    Vip,
    #[default]
    Guest,
    Family,
}

impl GuestCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuestCategory::Student => "student",
            GuestCategory::Parent => "parent",
            GuestCategory::Teacher => "teacher",
            GuestCategory::Vip => "vip",
            GuestCategory::Guest => "guest",
            GuestCategory::Family => "family",
        }
    }
}

impl fmt::Display for GuestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GuestCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(GuestCategory::Student),
            "parent" => Ok(GuestCategory::Parent),
            "teacher" => Ok(GuestCategory::Teacher),
            "vip" => Ok(GuestCategory::Vip),
            "guest" => Ok(GuestCategory::Guest),
            "family" => Ok(GuestCategory::Family),
            other => Err(format!("unknown guest category '{other}'")),
        }
    }
}

/// One invited person or family unit.
///
/// The check-in fields (`checked_in`, `checked_in_at`, `checked_in_by`,
/// `scan_count`, `last_scanned_at`) are only ever written by the check-in
/// transition in [`crate::services::checkin`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    pub id: i64,
    pub event_id: i64,
    pub token: String,
    pub name: String,
    pub category: GuestCategory,
    pub family_size: i32,
    pub dietary_restrictions: Option<String>,
    pub table_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub checked_in: bool,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub checked_in_by: Option<i64>,
    pub scan_count: i32,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Guest {
    /// A family record stands for several attendees behind one token.
    pub fn is_family_unit(&self) -> bool {
        self.category == GuestCategory::Family && self.family_size > 1
    }

    /// Physical attendees represented by this record.
    pub fn headcount(&self) -> i64 {
        if self.category == GuestCategory::Family {
            i64::from(self.family_size.max(1))
        } else {
            1
        }
    }

    pub fn summary(&self) -> GuestSummary {
        GuestSummary {
            id: self.id,
            name: self.name.clone(),
            category: self.category,
            family_size: self.family_size,
            scan_count: self.scan_count,
        }
    }
}

/// The slice of a guest that goes out on the live feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestSummary {
    pub id: i64,
    pub name: String,
    pub category: GuestCategory,
    pub family_size: i32,
    pub scan_count: i32,
}

fn default_family_size() -> i32 {
    1
}

/// A registration row. Tokens are generated by the registry, never supplied.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewGuest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub category: GuestCategory,
    #[serde(default = "default_family_size")]
    #[validate(range(min = 1, max = 50))]
    pub family_size: i32,
    pub dietary_restrictions: Option<String>,
    pub table_number: Option<String>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

impl NewGuest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: GuestCategory::Guest,
            family_size: 1,
            dietary_restrictions: None,
            table_number: None,
            phone: None,
            email: None,
        }
    }

    pub fn family(name: impl Into<String>, family_size: i32) -> Self {
        Self {
            category: GuestCategory::Family,
            family_size,
            ..Self::named(name)
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Trimmed name, or `None` for rows that should be skipped.
    pub fn cleaned_name(&self) -> Option<&str> {
        let trimmed = self.name.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Family size as stored: only family records carry more than one person.
    pub fn stored_family_size(&self) -> i32 {
        if self.category == GuestCategory::Family {
            self.family_size.max(1)
        } else {
            1
        }
    }
}

/// Generates a fresh opaque check-in token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(category: GuestCategory, family_size: i32) -> Guest {
        Guest {
            id: 1,
            event_id: 1,
            token: "abc123".into(),
            name: "Amina".into(),
            category,
            family_size,
            dietary_restrictions: None,
            table_number: None,
            phone: None,
            email: None,
            checked_in: false,
            checked_in_at: None,
            checked_in_by: None,
            scan_count: 0,
            last_scanned_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn category_round_trips_through_text() {
        for category in [
            GuestCategory::Student,
            GuestCategory::Parent,
            GuestCategory::Teacher,
            GuestCategory::Vip,
            GuestCategory::Guest,
            GuestCategory::Family,
        ] {
            assert_eq!(category.as_str().parse::<GuestCategory>(), Ok(category));
        }
        assert_eq!(" VIP ".parse::<GuestCategory>(), Ok(GuestCategory::Vip));
        assert!("alumni".parse::<GuestCategory>().is_err());
    }

    #[test]
    fn headcount_only_counts_family_size_for_families() {
        assert_eq!(sample(GuestCategory::Family, 4).headcount(), 4);
        assert!(sample(GuestCategory::Family, 4).is_family_unit());
        assert_eq!(sample(GuestCategory::Teacher, 4).headcount(), 1);
        assert!(!sample(GuestCategory::Family, 1).is_family_unit());
    }

    #[test]
    fn registration_rows_are_validated() {
        assert!(NewGuest::named("Amina").validate().is_ok());
        assert!(NewGuest::named("").validate().is_err());
        assert!(NewGuest::family("Haddad", 0).validate().is_err());
        assert!(NewGuest::named("Amina").with_email("not-an-email").validate().is_err());
        assert!(NewGuest::named("Amina").with_email("amina@example.org").validate().is_ok());
    }

    #[test]
    fn blank_names_are_skipped() {
        assert_eq!(NewGuest::named("  Omar  ").cleaned_name(), Some("Omar"));
        assert_eq!(NewGuest::named("   ").cleaned_name(), None);
    }

    #[test]
    fn non_family_rows_store_a_single_person() {
        let mut row = NewGuest::named("Omar");
        row.family_size = 5;
        assert_eq!(row.stored_family_size(), 1);
        assert_eq!(NewGuest::family("Haddad", 5).stored_family_size(), 5);
    }

    proptest! {
        #[test]
        fn tokens_are_twelve_url_safe_chars(_seed in 0u8..32) {
            let token = generate_token();
            prop_assert_eq!(token.len(), 12);
            prop_assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }
}
