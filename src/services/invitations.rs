//! invitations.rs
//!
//! Отправка приглашений через внешний workflow (n8n-style webhook).
//!
//! The service does not send email itself. It posts the guest list with each
//! guest's personal check-in URL to the configured webhook and lets the
//! workflow render and deliver the messages. Calls go through a
//! [`CircuitBreaker`] so a dead workflow host is not hammered by repeated
//! clicks on "send invitations".

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{CircuitBreakerConfig, InvitationConfig};
use crate::models::{Event, Guest, GuestCategory};

/// Состояния автоматического выключателя.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass.
    Closed,
    /// Too many consecutive failures; requests are rejected until the timeout passes.
    Open,
    /// Timeout passed; the next request is a probe.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerState>,
    failure_threshold: u32,
    open_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            failure_threshold: failure_threshold.max(1),
            open_timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Может ли следующий запрос уйти во внешний сервис.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        let current = inner.state;
        match current {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let expired = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.open_timeout)
                    .unwrap_or(true);
                if expired {
                    inner.state = CircuitState::HalfOpen;
                    info!("Circuit breaker transitioning to HalfOpen state");
                }
                expired
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            info!("Circuit breaker recovered - transitioning to Closed state");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        let current = inner.state;
        match current {
            CircuitState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                error!(
                    "Circuit breaker OPENED - {} failures reached threshold {}",
                    inner.consecutive_failures, self.failure_threshold
                );
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!("Circuit breaker probe failed - returning to Open state");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }
}

#[derive(Debug, Error)]
pub enum InvitationError {
    #[error("invitation webhook is not configured")]
    NotConfigured,

    #[error("invitation workflow temporarily unavailable (circuit open)")]
    CircuitOpen,

    #[error("invitation workflow request failed: {0}")]
    Gateway(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct InvitationBatch<'a> {
    event: EventSummary<'a>,
    guests: Vec<InvitationRecipient<'a>>,
}

#[derive(Debug, Serialize)]
struct EventSummary<'a> {
    id: i64,
    name: &'a str,
    event_date: Option<&'a str>,
    venue: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct InvitationRecipient<'a> {
    id: i64,
    name: &'a str,
    email: &'a str,
    category: GuestCategory,
    family_size: i32,
    checkin_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvitationReceipt {
    pub sent: usize,
    pub skipped: usize,
}

/// HTTP client for the invitation workflow. One instance is shared by all
/// requests so the breaker sees every failure.
pub struct InvitationClient {
    http: reqwest::Client,
    webhook_url: Option<String>,
    public_base_url: String,
    breaker: CircuitBreaker,
}

impl InvitationClient {
    pub fn from_config(
        config: &InvitationConfig,
        breaker: &CircuitBreakerConfig,
        public_base_url: &str,
    ) -> Result<Self, InvitationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            webhook_url: config.webhook_url.clone(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            breaker: CircuitBreaker::new(
                breaker.failure_threshold,
                Duration::from_secs(breaker.timeout_seconds),
            ),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn checkin_url(&self, token: &str) -> String {
        format!("{}/checkin/{}", self.public_base_url, token)
    }

    /// Posts every guest with an email address to the workflow webhook.
    /// Guests without email are counted as skipped; an empty batch makes no call.
    pub async fn dispatch(
        &self,
        event: &Event,
        guests: &[Guest],
    ) -> Result<InvitationReceipt, InvitationError> {
        let url = self
            .webhook_url
            .as_deref()
            .ok_or(InvitationError::NotConfigured)?;

        let recipients: Vec<InvitationRecipient<'_>> = guests
            .iter()
            .filter_map(|g| {
                let email = g.email.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
                Some(InvitationRecipient {
                    id: g.id,
                    name: &g.name,
                    email,
                    category: g.category,
                    family_size: g.family_size,
                    checkin_url: self.checkin_url(&g.token),
                })
            })
            .collect();

        let receipt = InvitationReceipt {
            sent: recipients.len(),
            skipped: guests.len() - recipients.len(),
        };
        if recipients.is_empty() {
            info!("No guests with email addresses, nothing to send");
            return Ok(receipt);
        }

        if !self.breaker.can_execute() {
            warn!("Circuit breaker is OPEN - blocking invitation webhook request");
            return Err(InvitationError::CircuitOpen);
        }

        let batch = InvitationBatch {
            event: EventSummary {
                id: event.id,
                name: &event.name,
                event_date: event.event_date.as_deref(),
                venue: event.venue.as_deref(),
            },
            guests: recipients,
        };

        let result = async {
            self.http
                .post(url)
                .json(&batch)
                .send()
                .await?
                .error_for_status()
        }
        .await;

        match result {
            Ok(_) => {
                self.breaker.record_success();
                info!(
                    "Invitation batch accepted by workflow: {} sent, {} skipped",
                    receipt.sent, receipt.skipped
                );
                Ok(receipt)
            }
            Err(e) => {
                error!("Invitation webhook request failed: {:?}", e);
                self.breaker.record_failure();
                Err(InvitationError::Gateway(e))
            }
        }
    }
}
