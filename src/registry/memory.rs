use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{normalize_username, GuestRegistry, RegistryError};
use crate::models::{
    guest::generate_token, ActivityEntry, AttendanceStats, Event, Guest, NewActivity, NewGuest,
    NewOperator, Operator, OperatorRole, TimelineBucket,
};

/// In-process registry. Every mutation happens under a single write lock, so
/// the check-in test-and-set is atomic per token.
pub struct MemoryRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    events: Vec<Event>,
    guests: BTreeMap<i64, Guest>,
    tokens: HashMap<String, i64>,
    activity: Vec<ActivityEntry>,
    operators: BTreeMap<i64, Operator>,
    next_guest_id: i64,
    next_activity_id: i64,
    next_operator_id: i64,
}

impl Inner {
    fn guest_id_for(&self, token: &str) -> Option<i64> {
        self.tokens.get(token).copied()
    }

    fn fresh_token(&self) -> String {
        loop {
            let token = generate_token();
            if !self.tokens.contains_key(&token) {
                return token;
            }
        }
    }
}

impl MemoryRegistry {
    /// An empty registry with one active default event (id 1).
    pub fn new() -> Self {
        Self::with_event(Event {
            id: 1,
            name: "Community Iftar".to_string(),
            event_date: Some("2026-03-15".to_string()),
            venue: Some("School Hall".to_string()),
            is_active: true,
        })
    }

    pub fn with_event(event: Event) -> Self {
        let inner = Inner {
            events: vec![event],
            next_guest_id: 1,
            next_activity_id: 1,
            next_operator_id: 1,
            ..Inner::default()
        };
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Inserts a guest with a caller-chosen token. Used for fixtures and demos
    /// where a known token has to be printed in advance.
    pub async fn insert_guest_with_token(
        &self,
        event_id: i64,
        token: &str,
        guest: &NewGuest,
    ) -> Result<Guest, RegistryError> {
        let mut inner = self.inner.write().await;
        if !inner.events.iter().any(|e| e.id == event_id) {
            return Err(RegistryError::UnknownEvent(event_id));
        }
        let guest = build_guest(&mut inner, event_id, token.to_string(), guest);
        Ok(guest)
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_guest(inner: &mut Inner, event_id: i64, token: String, row: &NewGuest) -> Guest {
    let id = inner.next_guest_id;
    inner.next_guest_id += 1;
    let guest = Guest {
        id,
        event_id,
        token: token.clone(),
        name: row.cleaned_name().unwrap_or(&row.name).to_string(),
        category: row.category,
        family_size: row.stored_family_size(),
        dietary_restrictions: row.dietary_restrictions.clone(),
        table_number: row.table_number.clone(),
        phone: row.phone.clone(),
        email: row.email.clone(),
        checked_in: false,
        checked_in_at: None,
        checked_in_by: None,
        scan_count: 0,
        last_scanned_at: None,
        created_at: Utc::now(),
    };
    inner.tokens.insert(token, id);
    inner.guests.insert(id, guest.clone());
    guest
}

fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

#[async_trait]
impl GuestRegistry for MemoryRegistry {
    async fn active_event(&self) -> Result<Option<Event>, RegistryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.is_active)
            .min_by_key(|e| e.id)
            .cloned())
    }

    async fn update_event(&self, event: &Event) -> Result<Option<Event>, RegistryError> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.events.iter_mut().find(|e| e.id == event.id) else {
            return Ok(None);
        };
        stored.name = event.name.clone();
        stored.event_date = event.event_date.clone();
        stored.venue = event.venue.clone();
        Ok(Some(stored.clone()))
    }

    async fn find_guest_by_token(&self, token: &str) -> Result<Option<Guest>, RegistryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .guest_id_for(token)
            .and_then(|id| inner.guests.get(&id))
            .cloned())
    }

    async fn find_guest_by_id(&self, id: i64) -> Result<Option<Guest>, RegistryError> {
        Ok(self.inner.read().await.guests.get(&id).cloned())
    }

    async fn mark_checked_in(
        &self,
        token: &str,
        actor: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Option<Guest>, RegistryError> {
        let mut inner = self.inner.write().await;
        let Some(id) = inner.guest_id_for(token) else {
            return Ok(None);
        };
        let Some(guest) = inner.guests.get_mut(&id) else {
            return Ok(None);
        };
        if guest.checked_in {
            return Ok(None);
        }
        guest.checked_in = true;
        guest.checked_in_at = Some(now);
        guest.checked_in_by = actor;
        guest.scan_count += 1;
        guest.last_scanned_at = Some(now);
        Ok(Some(guest.clone()))
    }

    async fn record_rescan(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Guest>, RegistryError> {
        let mut inner = self.inner.write().await;
        let Some(id) = inner.guest_id_for(token) else {
            return Ok(None);
        };
        let Some(guest) = inner.guests.get_mut(&id) else {
            return Ok(None);
        };
        if !guest.checked_in {
            return Ok(None);
        }
        guest.scan_count += 1;
        guest.last_scanned_at = Some(now);
        Ok(Some(guest.clone()))
    }

    async fn register_guests(
        &self,
        event_id: i64,
        guests: &[NewGuest],
    ) -> Result<Vec<Guest>, RegistryError> {
        let mut inner = self.inner.write().await;
        if !inner.events.iter().any(|e| e.id == event_id) {
            return Err(RegistryError::UnknownEvent(event_id));
        }
        let mut created = Vec::with_capacity(guests.len());
        for row in guests.iter().filter(|row| row.cleaned_name().is_some()) {
            let token = inner.fresh_token();
            created.push(build_guest(&mut inner, event_id, token, row));
        }
        Ok(created)
    }

    async fn list_guests(
        &self,
        event_id: i64,
        search: Option<&str>,
    ) -> Result<Vec<Guest>, RegistryError> {
        let inner = self.inner.read().await;
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let mut guests: Vec<Guest> = inner
            .guests
            .values()
            .filter(|g| g.event_id == event_id)
            .filter(|g| match &needle {
                Some(n) => g.name.to_lowercase().contains(n),
                None => true,
            })
            .cloned()
            .collect();
        guests.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(guests)
    }

    async fn record_activity(&self, entry: NewActivity) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        let id = inner.next_activity_id;
        inner.next_activity_id += 1;
        inner.activity.push(ActivityEntry {
            id,
            event_id: entry.event_id,
            action: entry.action,
            guest_id: entry.guest_id,
            user_id: entry.user_id,
            details: entry.details,
            guest_name: None,
            user_name: None,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_activity(
        &self,
        event_id: i64,
        limit: i64,
    ) -> Result<Vec<ActivityEntry>, RegistryError> {
        let inner = self.inner.read().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(inner
            .activity
            .iter()
            .rev()
            .filter(|a| a.event_id == event_id)
            .take(limit)
            .map(|a| {
                let mut entry = a.clone();
                entry.guest_name = a
                    .guest_id
                    .and_then(|id| inner.guests.get(&id))
                    .map(|g| g.name.clone());
                entry.user_name = a
                    .user_id
                    .and_then(|id| inner.operators.get(&id))
                    .map(|op| op.display_name.clone());
                entry
            })
            .collect())
    }

    async fn stats(&self, event_id: i64) -> Result<AttendanceStats, RegistryError> {
        let inner = self.inner.read().await;
        let mut stats = AttendanceStats::default();
        for guest in inner.guests.values().filter(|g| g.event_id == event_id) {
            stats.total += 1;
            stats.total_people += guest.headcount();
            if guest.checked_in {
                stats.checked_in += 1;
                stats.checked_in_people += guest.headcount();
            }
        }
        Ok(stats)
    }

    async fn timeline(&self, event_id: i64) -> Result<Vec<TimelineBucket>, RegistryError> {
        let inner = self.inner.read().await;
        let mut buckets: BTreeMap<DateTime<Utc>, i64> = BTreeMap::new();
        for at in inner
            .guests
            .values()
            .filter(|g| g.event_id == event_id && g.checked_in)
            .filter_map(|g| g.checked_in_at)
        {
            *buckets.entry(truncate_to_minute(at)).or_default() += 1;
        }
        Ok(buckets
            .into_iter()
            .map(|(minute, count)| TimelineBucket { minute, count })
            .collect())
    }

    async fn find_operator(&self, id: i64) -> Result<Option<Operator>, RegistryError> {
        Ok(self.inner.read().await.operators.get(&id).cloned())
    }

    async fn find_operator_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Operator>, RegistryError> {
        let username = normalize_username(username);
        let inner = self.inner.read().await;
        Ok(inner
            .operators
            .values()
            .find(|op| op.username == username)
            .cloned())
    }

    async fn create_operator(&self, operator: NewOperator) -> Result<Operator, RegistryError> {
        let username = normalize_username(&operator.username);
        let mut inner = self.inner.write().await;
        if inner.operators.values().any(|op| op.username == username) {
            return Err(RegistryError::DuplicateUsername(username));
        }
        let id = inner.next_operator_id;
        inner.next_operator_id += 1;
        let created = Operator {
            id,
            username,
            display_name: operator.display_name,
            password_hash: operator.password_hash,
            role: operator.role,
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
        };
        inner.operators.insert(id, created.clone());
        Ok(created)
    }

    async fn list_operators(&self) -> Result<Vec<Operator>, RegistryError> {
        let inner = self.inner.read().await;
        let mut operators: Vec<Operator> = inner.operators.values().cloned().collect();
        operators.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(operators)
    }

    async fn toggle_operator_active(&self, id: i64) -> Result<Option<Operator>, RegistryError> {
        let mut inner = self.inner.write().await;
        Ok(inner.operators.get_mut(&id).map(|op| {
            op.is_active = !op.is_active;
            op.clone()
        }))
    }

    async fn touch_last_login(&self, id: i64) -> Result<(), RegistryError> {
        if let Some(op) = self.inner.write().await.operators.get_mut(&id) {
            op.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn ensure_admin(&self, admin: NewOperator) -> Result<bool, RegistryError> {
        let has_admin = self
            .inner
            .read()
            .await
            .operators
            .values()
            .any(|op| op.role == OperatorRole::Admin);
        if has_admin {
            return Ok(false);
        }
        self.create_operator(NewOperator {
            role: OperatorRole::Admin,
            ..admin
        })
        .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityAction, GuestCategory};
    use chrono::TimeZone;

    #[tokio::test]
    async fn registration_skips_blank_names_and_issues_unique_tokens() {
        let registry = MemoryRegistry::new();
        let rows = vec![
            NewGuest::named("Amina"),
            NewGuest::named("   "),
            NewGuest::family("Haddad family", 4),
        ];
        let created = registry.register_guests(1, &rows).await.unwrap();

        assert_eq!(created.len(), 2);
        assert_ne!(created[0].token, created[1].token);
        assert!(created.iter().all(|g| !g.checked_in && g.checked_in_at.is_none()));
        assert_eq!(created[1].category, GuestCategory::Family);
        assert_eq!(created[1].family_size, 4);
    }

    #[tokio::test]
    async fn registration_into_unknown_event_fails() {
        let registry = MemoryRegistry::new();
        let err = registry
            .register_guests(99, &[NewGuest::named("Amina")])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownEvent(99)));
    }

    #[tokio::test]
    async fn mark_checked_in_is_a_one_shot_transition() {
        let registry = MemoryRegistry::new();
        registry
            .insert_guest_with_token(1, "abc123", &NewGuest::named("Amina"))
            .await
            .unwrap();
        let now = Utc::now();

        let first = registry.mark_checked_in("abc123", Some(3), now).await.unwrap();
        let second = registry.mark_checked_in("abc123", None, now).await.unwrap();

        let guest = first.expect("first call wins");
        assert!(guest.checked_in);
        assert_eq!(guest.checked_in_at, Some(now));
        assert_eq!(guest.checked_in_by, Some(3));
        assert_eq!(guest.scan_count, 1);
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn rescan_leaves_check_in_fields_alone() {
        let registry = MemoryRegistry::new();
        registry
            .insert_guest_with_token(1, "abc123", &NewGuest::named("Amina"))
            .await
            .unwrap();
        let first_at = Utc.with_ymd_and_hms(2026, 3, 15, 18, 30, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 3, 15, 18, 45, 0).unwrap();
        registry.mark_checked_in("abc123", Some(3), first_at).await.unwrap();

        let guest = registry.record_rescan("abc123", later).await.unwrap().unwrap();
        assert_eq!(guest.checked_in_at, Some(first_at));
        assert_eq!(guest.checked_in_by, Some(3));
        assert_eq!(guest.last_scanned_at, Some(later));
        assert_eq!(guest.scan_count, 2);

        assert!(registry.record_rescan("missing", later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rescan_ignores_guests_not_yet_checked_in() {
        let registry = MemoryRegistry::new();
        registry
            .insert_guest_with_token(1, "abc123", &NewGuest::named("Amina"))
            .await
            .unwrap();

        assert!(registry.record_rescan("abc123", Utc::now()).await.unwrap().is_none());

        let stored = registry.find_guest_by_token("abc123").await.unwrap().unwrap();
        assert!(!stored.checked_in);
        assert_eq!(stored.scan_count, 0);
        assert_eq!(stored.last_scanned_at, None);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_sorted() {
        let registry = MemoryRegistry::new();
        registry
            .register_guests(
                1,
                &[
                    NewGuest::named("Zainab"),
                    NewGuest::named("amir"),
                    NewGuest::named("Amina"),
                ],
            )
            .await
            .unwrap();

        let names: Vec<String> = registry
            .list_guests(1, Some("AMI"))
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["Amina".to_string(), "amir".to_string()]);
        assert_eq!(registry.list_guests(1, Some("  ")).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stats_and_timeline_weight_families() {
        let registry = MemoryRegistry::new();
        registry
            .insert_guest_with_token(1, "fam", &NewGuest::family("Haddad", 4))
            .await
            .unwrap();
        registry
            .insert_guest_with_token(1, "solo", &NewGuest::named("Omar"))
            .await
            .unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 15, 18, 30, 42).unwrap();
        registry.mark_checked_in("fam", None, at).await.unwrap();

        let stats = registry.stats(1).await.unwrap();
        assert_eq!(
            stats,
            AttendanceStats {
                total: 2,
                checked_in: 1,
                total_people: 5,
                checked_in_people: 4,
            }
        );

        let timeline = registry.timeline(1).await.unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(
            timeline[0].minute,
            Utc.with_ymd_and_hms(2026, 3, 15, 18, 30, 0).unwrap()
        );
        assert_eq!(timeline[0].count, 1);
    }

    #[tokio::test]
    async fn activity_feed_is_newest_first_with_names() {
        let registry = MemoryRegistry::new();
        let guest = registry
            .insert_guest_with_token(1, "abc123", &NewGuest::named("Amina"))
            .await
            .unwrap();
        for action in [ActivityAction::Import, ActivityAction::Checkin] {
            registry
                .record_activity(NewActivity {
                    event_id: 1,
                    action,
                    guest_id: Some(guest.id),
                    user_id: None,
                    details: action.as_str().to_string(),
                })
                .await
                .unwrap();
        }

        let feed = registry.recent_activity(1, 1).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].action, ActivityAction::Checkin);
        assert_eq!(feed[0].guest_name.as_deref(), Some("Amina"));
    }

    #[tokio::test]
    async fn ensure_admin_only_seeds_once() {
        let registry = MemoryRegistry::new();
        let admin = NewOperator {
            username: "Admin".into(),
            display_name: "Administrator".into(),
            password_hash: "hash".into(),
            role: OperatorRole::Volunteer,
        };
        assert!(registry.ensure_admin(admin.clone()).await.unwrap());
        assert!(!registry.ensure_admin(admin.clone()).await.unwrap());

        let stored = registry.find_operator_by_username("ADMIN").await.unwrap().unwrap();
        assert!(stored.is_admin());
        assert!(matches!(
            registry.create_operator(admin).await,
            Err(RegistryError::DuplicateUsername(_))
        ));
    }

    #[tokio::test]
    async fn toggling_flips_active_flag_and_lists_sorted() {
        let registry = MemoryRegistry::new();
        for username in ["zara", "adam"] {
            registry
                .create_operator(NewOperator {
                    username: username.into(),
                    display_name: username.into(),
                    password_hash: "hash".into(),
                    role: OperatorRole::Volunteer,
                })
                .await
                .unwrap();
        }

        let names: Vec<String> = registry
            .list_operators()
            .await
            .unwrap()
            .into_iter()
            .map(|op| op.username)
            .collect();
        assert_eq!(names, ["adam", "zara"]);

        let zara = registry.toggle_operator_active(1).await.unwrap().unwrap();
        assert!(!zara.is_active);
        let zara = registry.toggle_operator_active(1).await.unwrap().unwrap();
        assert!(zara.is_active);
        assert!(registry.toggle_operator_active(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn event_details_can_be_updated() {
        let registry = MemoryRegistry::new();
        let mut event = registry.active_event().await.unwrap().unwrap();
        event.name = "Spring Iftar".into();
        event.venue = None;

        let updated = registry.update_event(&event).await.unwrap().unwrap();
        assert_eq!(updated.name, "Spring Iftar");
        assert_eq!(updated.venue, None);
        assert_eq!(registry.active_event().await.unwrap(), Some(updated));

        event.id = 404;
        assert!(registry.update_event(&event).await.unwrap().is_none());
    }
}
