use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::info;

use super::{normalize_username, GuestRegistry, RegistryError};
use crate::database::Database;
use crate::models::{
    guest::generate_token, ActivityEntry, AttendanceStats, Event, Guest, NewActivity, NewGuest,
    NewOperator, Operator, TimelineBucket,
};

const GUEST_COLUMNS: &str = "id, event_id, token, name, category, family_size, \
     dietary_restrictions, table_number, phone, email, checked_in, checked_in_at, \
     checked_in_by, scan_count, last_scanned_at, created_at";

const OPERATOR_COLUMNS: &str =
    "id, username, display_name, password_hash, role, is_active, last_login, created_at";

#[derive(Clone)]
pub struct PostgresRegistry {
    db: Database,
}

impl PostgresRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

// Строки как они лежат в БД; enum-поля хранятся текстом
#[derive(FromRow)]
struct GuestRow {
    id: i64,
    event_id: i64,
    token: String,
    name: String,
    category: String,
    family_size: i32,
    dietary_restrictions: Option<String>,
    table_number: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    checked_in: bool,
    checked_in_at: Option<DateTime<Utc>>,
    checked_in_by: Option<i64>,
    scan_count: i32,
    last_scanned_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<GuestRow> for Guest {
    type Error = RegistryError;

    fn try_from(row: GuestRow) -> Result<Self, Self::Error> {
        let category = row.category.parse().map_err(|reason| RegistryError::Corrupt {
            entity: "guest",
            id: row.id,
            reason,
        })?;
        Ok(Guest {
            id: row.id,
            event_id: row.event_id,
            token: row.token,
            name: row.name,
            category,
            family_size: row.family_size,
            dietary_restrictions: row.dietary_restrictions,
            table_number: row.table_number,
            phone: row.phone,
            email: row.email,
            checked_in: row.checked_in,
            checked_in_at: row.checked_in_at,
            checked_in_by: row.checked_in_by,
            scan_count: row.scan_count,
            last_scanned_at: row.last_scanned_at,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct OperatorRow {
    id: i64,
    username: String,
    display_name: String,
    password_hash: String,
    role: String,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OperatorRow> for Operator {
    type Error = RegistryError;

    fn try_from(row: OperatorRow) -> Result<Self, Self::Error> {
        let role = row.role.parse().map_err(|reason| RegistryError::Corrupt {
            entity: "operator",
            id: row.id,
            reason,
        })?;
        Ok(Operator {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            password_hash: row.password_hash,
            role,
            is_active: row.is_active,
            last_login: row.last_login,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ActivityRow {
    id: i64,
    event_id: i64,
    action: String,
    guest_id: Option<i64>,
    user_id: Option<i64>,
    details: String,
    guest_name: Option<String>,
    user_name: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for ActivityEntry {
    type Error = RegistryError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let action = row.action.parse().map_err(|reason| RegistryError::Corrupt {
            entity: "activity",
            id: row.id,
            reason,
        })?;
        Ok(ActivityEntry {
            id: row.id,
            event_id: row.event_id,
            action,
            guest_id: row.guest_id,
            user_id: row.user_id,
            details: row.details,
            guest_name: row.guest_name,
            user_name: row.user_name,
            created_at: row.created_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl GuestRegistry for PostgresRegistry {
    async fn active_event(&self) -> Result<Option<Event>, RegistryError> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT id, name, event_date, venue, is_active
             FROM events
             WHERE is_active = true
             ORDER BY id
             LIMIT 1",
        )
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(event)
    }

    async fn update_event(&self, event: &Event) -> Result<Option<Event>, RegistryError> {
        let updated = sqlx::query_as::<_, Event>(
            "UPDATE events
             SET name = $2, event_date = $3, venue = $4
             WHERE id = $1
             RETURNING id, name, event_date, venue, is_active",
        )
        .bind(event.id)
        .bind(&event.name)
        .bind(&event.event_date)
        .bind(&event.venue)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(updated)
    }

    async fn find_guest_by_token(&self, token: &str) -> Result<Option<Guest>, RegistryError> {
        let sql = format!("SELECT {GUEST_COLUMNS} FROM guests WHERE token = $1");
        sqlx::query_as::<_, GuestRow>(&sql)
            .bind(token)
            .fetch_optional(&self.db.pool)
            .await?
            .map(Guest::try_from)
            .transpose()
    }

    async fn find_guest_by_id(&self, id: i64) -> Result<Option<Guest>, RegistryError> {
        let sql = format!("SELECT {GUEST_COLUMNS} FROM guests WHERE id = $1");
        sqlx::query_as::<_, GuestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?
            .map(Guest::try_from)
            .transpose()
    }

    async fn mark_checked_in(
        &self,
        token: &str,
        actor: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Option<Guest>, RegistryError> {
        // Условный UPDATE: строку получает только тот запрос, который застал checked_in = false
        let sql = format!(
            "UPDATE guests
             SET checked_in = true,
                 checked_in_at = $3,
                 checked_in_by = $2,
                 scan_count = scan_count + 1,
                 last_scanned_at = $3
             WHERE token = $1 AND checked_in = false
             RETURNING {GUEST_COLUMNS}"
        );
        sqlx::query_as::<_, GuestRow>(&sql)
            .bind(token)
            .bind(actor)
            .bind(now)
            .fetch_optional(&self.db.pool)
            .await?
            .map(Guest::try_from)
            .transpose()
    }

    async fn record_rescan(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Guest>, RegistryError> {
        let sql = format!(
            "UPDATE guests
             SET scan_count = scan_count + 1,
                 last_scanned_at = $2
             WHERE token = $1 AND checked_in = true
             RETURNING {GUEST_COLUMNS}"
        );
        sqlx::query_as::<_, GuestRow>(&sql)
            .bind(token)
            .bind(now)
            .fetch_optional(&self.db.pool)
            .await?
            .map(Guest::try_from)
            .transpose()
    }

    async fn register_guests(
        &self,
        event_id: i64,
        guests: &[NewGuest],
    ) -> Result<Vec<Guest>, RegistryError> {
        let event_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM events WHERE id = $1)",
        )
        .bind(event_id)
        .fetch_one(&self.db.pool)
        .await?;
        if !event_exists {
            return Err(RegistryError::UnknownEvent(event_id));
        }

        let sql = format!(
            "INSERT INTO guests (event_id, token, name, category, family_size,
                                 dietary_restrictions, table_number, phone, email)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {GUEST_COLUMNS}"
        );

        // Всё или ничего: при любой ошибке транзакция откатывается при drop
        let mut tx = self.db.pool.begin().await?;
        let mut created = Vec::with_capacity(guests.len());
        for row in guests {
            let Some(name) = row.cleaned_name() else {
                continue;
            };
            let inserted = sqlx::query_as::<_, GuestRow>(&sql)
                .bind(event_id)
                .bind(generate_token())
                .bind(name)
                .bind(row.category.as_str())
                .bind(row.stored_family_size())
                .bind(row.dietary_restrictions.as_deref())
                .bind(row.table_number.as_deref())
                .bind(row.phone.as_deref())
                .bind(row.email.as_deref())
                .fetch_one(&mut *tx)
                .await?;
            created.push(Guest::try_from(inserted)?);
        }
        tx.commit().await?;

        info!("Registered {} guests for event {}", created.len(), event_id);
        Ok(created)
    }

    async fn list_guests(
        &self,
        event_id: i64,
        search: Option<&str>,
    ) -> Result<Vec<Guest>, RegistryError> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let rows = match search {
            Some(needle) => {
                let sql = format!(
                    "SELECT {GUEST_COLUMNS} FROM guests
                     WHERE event_id = $1 AND name ILIKE $2
                     ORDER BY name, id"
                );
                sqlx::query_as::<_, GuestRow>(&sql)
                    .bind(event_id)
                    .bind(format!("%{}%", escape_like(needle)))
                    .fetch_all(&self.db.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {GUEST_COLUMNS} FROM guests WHERE event_id = $1 ORDER BY name, id"
                );
                sqlx::query_as::<_, GuestRow>(&sql)
                    .bind(event_id)
                    .fetch_all(&self.db.pool)
                    .await?
            }
        };
        rows.into_iter().map(Guest::try_from).collect()
    }

    async fn record_activity(&self, entry: NewActivity) -> Result<(), RegistryError> {
        sqlx::query(
            "INSERT INTO activity_log (event_id, action, guest_id, user_id, details)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.event_id)
        .bind(entry.action.as_str())
        .bind(entry.guest_id)
        .bind(entry.user_id)
        .bind(entry.details)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    async fn recent_activity(
        &self,
        event_id: i64,
        limit: i64,
    ) -> Result<Vec<ActivityEntry>, RegistryError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT al.id, al.event_id, al.action, al.guest_id, al.user_id, al.details,
                   g.name AS guest_name, o.display_name AS user_name, al.created_at
            FROM activity_log al
            LEFT JOIN guests g ON g.id = al.guest_id
            LEFT JOIN operators o ON o.id = al.user_id
            WHERE al.event_id = $1
            ORDER BY al.created_at DESC, al.id DESC
            LIMIT $2
            "#,
        )
        .bind(event_id)
        .bind(limit.max(0))
        .fetch_all(&self.db.pool)
        .await?;
        rows.into_iter().map(ActivityEntry::try_from).collect()
    }

    async fn stats(&self, event_id: i64) -> Result<AttendanceStats, RegistryError> {
        let (total, checked_in, total_people, checked_in_people) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE checked_in) AS checked_in,
                    COALESCE(SUM(CASE WHEN category = 'family' THEN GREATEST(family_size, 1) ELSE 1 END), 0)::BIGINT
                        AS total_people,
                    COALESCE(SUM(CASE WHEN category = 'family' THEN GREATEST(family_size, 1) ELSE 1 END)
                        FILTER (WHERE checked_in), 0)::BIGINT AS checked_in_people
                FROM guests
                WHERE event_id = $1
                "#,
            )
            .bind(event_id)
            .fetch_one(&self.db.pool)
            .await?;

        Ok(AttendanceStats {
            total,
            checked_in,
            total_people,
            checked_in_people,
        })
    }

    async fn timeline(&self, event_id: i64) -> Result<Vec<TimelineBucket>, RegistryError> {
        let rows = sqlx::query_as::<_, (DateTime<Utc>, i64)>(
            r#"
            SELECT date_trunc('minute', checked_in_at) AS minute, COUNT(*) AS count
            FROM guests
            WHERE event_id = $1 AND checked_in = true
            GROUP BY minute
            ORDER BY minute
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.db.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(minute, count)| TimelineBucket { minute, count })
            .collect())
    }

    async fn find_operator(&self, id: i64) -> Result<Option<Operator>, RegistryError> {
        let sql = format!("SELECT {OPERATOR_COLUMNS} FROM operators WHERE id = $1");
        sqlx::query_as::<_, OperatorRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?
            .map(Operator::try_from)
            .transpose()
    }

    async fn find_operator_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Operator>, RegistryError> {
        let sql = format!("SELECT {OPERATOR_COLUMNS} FROM operators WHERE username = $1");
        sqlx::query_as::<_, OperatorRow>(&sql)
            .bind(normalize_username(username))
            .fetch_optional(&self.db.pool)
            .await?
            .map(Operator::try_from)
            .transpose()
    }

    async fn create_operator(&self, operator: NewOperator) -> Result<Operator, RegistryError> {
        let username = normalize_username(&operator.username);
        let sql = format!(
            "INSERT INTO operators (username, display_name, password_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING {OPERATOR_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OperatorRow>(&sql)
            .bind(&username)
            .bind(&operator.display_name)
            .bind(&operator.password_hash)
            .bind(operator.role.as_str())
            .fetch_one(&self.db.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RegistryError::DuplicateUsername(username.clone())
                } else {
                    RegistryError::Database(e)
                }
            })?;
        Operator::try_from(row)
    }

    async fn list_operators(&self) -> Result<Vec<Operator>, RegistryError> {
        let sql = format!("SELECT {OPERATOR_COLUMNS} FROM operators ORDER BY username");
        sqlx::query_as::<_, OperatorRow>(&sql)
            .fetch_all(&self.db.pool)
            .await?
            .into_iter()
            .map(Operator::try_from)
            .collect()
    }

    async fn toggle_operator_active(&self, id: i64) -> Result<Option<Operator>, RegistryError> {
        // переключение в самом UPDATE, без чтения перед записью
        let sql = format!(
            "UPDATE operators SET is_active = NOT is_active
             WHERE id = $1
             RETURNING {OPERATOR_COLUMNS}"
        );
        sqlx::query_as::<_, OperatorRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?
            .map(Operator::try_from)
            .transpose()
    }

    async fn touch_last_login(&self, id: i64) -> Result<(), RegistryError> {
        sqlx::query("UPDATE operators SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.db.pool)
            .await?;
        Ok(())
    }

    async fn ensure_admin(&self, admin: NewOperator) -> Result<bool, RegistryError> {
        let has_admin = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM operators WHERE role = 'admin')",
        )
        .fetch_one(&self.db.pool)
        .await?;
        if has_admin {
            return Ok(false);
        }

        self.create_operator(NewOperator {
            role: crate::models::OperatorRole::Admin,
            ..admin
        })
        .await?;
        Ok(true)
    }
}

/// Escapes LIKE wildcards so a search for "50%" matches literally.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
