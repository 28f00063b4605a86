use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::services::checkin::CheckinOutcome;
use crate::AppState;

pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/checkin/{token}", get(public_checkin))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/checkin/{token}", post(checkin_by_token))
        .route("/guests/{id}/checkin", post(checkin_by_id))
}

// GET /checkin/{token} - скан QR-кода гостем, без авторизации
async fn public_checkin(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let outcome = state.checkin.check_in(&token, None).await?;
    after_checkin(&state, &outcome).await;

    let status = match outcome {
        CheckinOutcome::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };
    Ok((status, Html(render_outcome(&outcome))).into_response())
}

// POST /api/checkin/{token}
async fn checkin_by_token(
    State(state): State<Arc<AppState>>,
    AuthUser(operator): AuthUser,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let outcome = state.checkin.check_in(&token, Some(&operator)).await?;
    after_checkin(&state, &outcome).await;
    Ok(outcome_response(outcome))
}

// POST /api/guests/{id}/checkin
async fn checkin_by_id(
    State(state): State<Arc<AppState>>,
    AuthUser(operator): AuthUser,
    Path(guest_id): Path<i64>,
) -> Result<Response, AppError> {
    let outcome = state
        .checkin
        .check_in_by_id(guest_id, Some(&operator))
        .await?;
    after_checkin(&state, &outcome).await;
    Ok(outcome_response(outcome))
}

async fn after_checkin(state: &AppState, outcome: &CheckinOutcome) {
    if let (CheckinOutcome::Success { guest }, Some(cache)) = (outcome, &state.cache) {
        cache.invalidate_stats(guest.event_id).await;
    }
}

fn outcome_response(outcome: CheckinOutcome) -> Response {
    let status = match outcome {
        CheckinOutcome::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };
    (status, Json(outcome)).into_response()
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

struct Page {
    status: &'static str,
    icon: &'static str,
    heading: String,
    message: String,
    subtitle: Option<String>,
}

/// Result page shown on the guest's phone after scanning the QR code.
pub fn render_outcome(outcome: &CheckinOutcome) -> String {
    let page = match outcome {
        CheckinOutcome::NotFound => Page {
            status: "error",
            icon: "&#10060;",
            heading: "Invalid QR Code".to_string(),
            message: "This QR code is not recognized. Please see a volunteer for help."
                .to_string(),
            subtitle: None,
        },
        CheckinOutcome::AlreadyCheckedIn {
            guest,
            checked_in_by,
        } => {
            let time = guest
                .checked_in_at
                .map(|at| at.format("%H:%M UTC").to_string())
                .unwrap_or_else(|| "earlier".to_string());
            let by = checked_in_by
                .as_ref()
                .map(|op| op.display_name.as_str())
                .unwrap_or("QR scan");
            Page {
                status: "already",
                icon: "&#9888;&#65039;",
                heading: "Already Checked In".to_string(),
                message: format!(
                    "{} was checked in at {} by {}.",
                    escape_html(&guest.name),
                    time,
                    escape_html(by)
                ),
                subtitle: Some(format!("Scan count: {}", guest.scan_count)),
            }
        }
        CheckinOutcome::Success { guest } => Page {
            status: "success",
            icon: "&#9989;",
            heading: format!("Welcome, {}!", escape_html(&guest.name)),
            message: if guest.is_family_unit() {
                format!(
                    "All {} family members are checked in. Enjoy the event!",
                    guest.family_size
                )
            } else {
                "You're checked in. Enjoy the event!".to_string()
            },
            subtitle: guest
                .table_number
                .as_deref()
                .map(|table| format!("Table: {}", escape_html(table))),
        },
    };

    let subtitle = page
        .subtitle
        .map(|s| format!("<p class=\"checkin-subtitle\">{s}</p>"))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Check-in</title>
</head>
<body>
  <div class="checkin-page">
    <div class="checkin-card {status}">
      <div class="checkin-icon">{icon}</div>
      <h1>{heading}</h1>
      <p>{message}</p>
      {subtitle}
    </div>
  </div>
</body>
</html>"#,
        status = page.status,
        icon = page.icon,
        heading = page.heading,
        message = page.message,
    )
}
