use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorRole {
    Admin,
    Volunteer,
}

impl OperatorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorRole::Admin => "admin",
            OperatorRole::Volunteer => "volunteer",
        }
    }
}

impl fmt::Display for OperatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(OperatorRole::Admin),
            "volunteer" => Ok(OperatorRole::Volunteer),
            other => Err(format!("unknown operator role '{other}'")),
        }
    }
}

/// A logged-in person acting on the dashboard: an admin or a volunteer at the door.
#[derive(Debug, Clone, Serialize)]
pub struct Operator {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: OperatorRole,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Operator {
    // bcrypt is deliberately slow; callers on the async runtime should wrap this in spawn_blocking
    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool {
        self.role == OperatorRole::Admin
    }

    pub fn summary(&self) -> OperatorSummary {
        OperatorSummary {
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSummary {
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct NewOperator {
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: OperatorRole,
}

/// Body of `POST /api/operators`; the password is hashed before it reaches the registry.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OperatorRequest {
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    #[validate(length(min = 1, max = 100))]
    pub display_name: String,
    #[validate(length(min = 8, max = 72))]
    pub password: String,
    #[serde(default = "default_role")]
    pub role: OperatorRole,
}

fn default_role() -> OperatorRole {
    OperatorRole::Volunteer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator_with_password(password: &str) -> Operator {
        Operator {
            id: 7,
            username: "door1".into(),
            display_name: "Door Volunteer".into(),
            password_hash: bcrypt::hash(password, 4).unwrap(),
            role: OperatorRole::Volunteer,
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn verifies_bcrypt_password() {
        let op = operator_with_password("s3cret-pass");
        assert!(op.verify_password("s3cret-pass"));
        assert!(!op.verify_password("wrong"));
        assert!(!op.is_admin());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_value(operator_with_password("s3cret-pass")).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "volunteer");
    }
}
