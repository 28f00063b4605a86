use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use guest_checkin::config::Config;
use guest_checkin::models::{NewGuest, NewOperator, OperatorRole};
use guest_checkin::registry::{GuestRegistry, MemoryRegistry};
use guest_checkin::{app, AppState};

const PASSWORD: &str = "door-pass-1";

async fn test_app() -> (Router, Arc<MemoryRegistry>) {
    let registry = Arc::new(MemoryRegistry::new());
    registry
        .insert_guest_with_token(1, "abc123", &NewGuest::named("Amina"))
        .await
        .unwrap();

    let hash = bcrypt::hash(PASSWORD, 4).unwrap();
    for (username, role) in [("door1", OperatorRole::Volunteer), ("boss", OperatorRole::Admin)] {
        registry
            .create_operator(NewOperator {
                username: username.into(),
                display_name: format!("{username} display"),
                password_hash: hash.clone(),
                role,
            })
            .await
            .unwrap();
    }

    let config = Config::from_lookup(|_| None).unwrap();
    let state = AppState::new(config, registry.clone(), None).unwrap();
    (app(state), registry)
}

fn basic(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{username}:{password}"))
    )
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn public_qr_page_checks_in_then_reports_duplicate() {
    let (app, _) = test_app().await;

    let response = app
        .clone()
        .oneshot(Request::get("/checkin/abc123").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Welcome, Amina!"));

    let response = app
        .oneshot(Request::get("/checkin/abc123").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let html = body_text(response).await;
    assert!(html.contains("Already Checked In"));
    assert!(html.contains("Scan count: 2"));
}

#[tokio::test]
async fn public_qr_page_rejects_unknown_token() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(Request::get("/checkin/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("Invalid QR Code"));
}

#[tokio::test]
async fn api_requires_basic_auth() {
    let (app, _) = test_app().await;

    let response = app
        .clone()
        .oneshot(Request::post("/api/checkin/abc123").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let response = app
        .oneshot(
            Request::post("/api/checkin/abc123")
                .header(header::AUTHORIZATION, basic("door1", "wrong-password"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn operator_check_in_returns_json_outcome() {
    let (app, registry) = test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/checkin/abc123")
                .header(header::AUTHORIZATION, basic("door1", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["guest"]["name"], "Amina");

    let stored = registry.find_guest_by_token("abc123").await.unwrap().unwrap();
    let operator = registry.find_operator_by_username("door1").await.unwrap().unwrap();
    assert_eq!(stored.checked_in_by, Some(operator.id));

    let response = app
        .oneshot(
            Request::post("/api/guests/1/checkin")
                .header(header::AUTHORIZATION, basic("door1", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["status"], "already");
    assert_eq!(json["checked_in_by"]["display_name"], "door1 display");
}

#[tokio::test]
async fn unknown_token_is_404_json() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(
            Request::post("/api/checkin/missing")
                .header(header::AUTHORIZATION, basic("door1", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({ "status": "not_found" }));
}

#[tokio::test]
async fn stats_reflect_check_ins() {
    let (app, _) = test_app().await;
    app.clone()
        .oneshot(Request::get("/checkin/abc123").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::get("/api/stats")
                .header(header::AUTHORIZATION, basic("door1", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["checked_in"], 1);
}

#[tokio::test]
async fn registering_guests_is_admin_only() {
    let (app, registry) = test_app().await;
    let body = json!({ "guests": [
        { "name": "Omar" },
        { "name": "Khan Family", "category": "family", "family_size": 5 }
    ] })
    .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/guests")
                .header(header::AUTHORIZATION, basic("door1", PASSWORD))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(
            Request::post("/api/guests")
                .header(header::AUTHORIZATION, basic("boss", PASSWORD))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["imported"], 2);

    let stats = registry.stats(1).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.total_people, 7);
}

#[tokio::test]
async fn invalid_guest_rows_are_rejected() {
    let (app, _) = test_app().await;
    let body = json!({ "guests": [{ "name": "Bad", "email": "not-an-email" }] }).to_string();

    let response = app
        .oneshot(
            Request::post("/api/guests")
                .header(header::AUTHORIZATION, basic("boss", PASSWORD))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["success"], false);
}

#[tokio::test]
async fn invitations_without_webhook_are_a_conflict() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(
            Request::post("/api/invitations")
                .header(header::AUTHORIZATION, basic("boss", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_username_is_rejected_like_a_wrong_password() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(
            Request::get("/api/guests")
                .header(header::AUTHORIZATION, basic("ghost", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await["message"],
        "authentication required"
    );
}

#[tokio::test]
async fn empty_guest_list_is_rejected() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(
            Request::post("/api/guests")
                .header(header::AUTHORIZATION, basic("boss", PASSWORD))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "guests": [] }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_lists_operators_without_hashes() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(
            Request::get("/api/operators")
                .header(header::AUTHORIZATION, basic("boss", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let operators = body_json(response).await;
    let usernames: Vec<&str> = operators
        .as_array()
        .unwrap()
        .iter()
        .map(|op| op["username"].as_str().unwrap())
        .collect();
    assert_eq!(usernames, ["boss", "door1"]);
    assert!(operators[0].get("password_hash").is_none());
}

#[tokio::test]
async fn deactivated_operator_can_no_longer_sign_in() {
    let (app, registry) = test_app().await;
    let door1 = registry.find_operator_by_username("door1").await.unwrap().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/api/operators/{}/toggle", door1.id))
                .header(header::AUTHORIZATION, basic("boss", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["is_active"], false);

    let response = app
        .oneshot(
            Request::get("/api/guests")
                .header(header::AUTHORIZATION, basic("door1", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_cannot_toggle_own_account() {
    let (app, registry) = test_app().await;
    let boss = registry.find_operator_by_username("boss").await.unwrap().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/api/operators/{}/toggle", boss.id))
                .header(header::AUTHORIZATION, basic("boss", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(registry.find_operator(boss.id).await.unwrap().unwrap().is_active);

    let response = app
        .oneshot(
            Request::post("/api/operators/999/toggle")
                .header(header::AUTHORIZATION, basic("boss", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn guest_export_is_csv_for_admins() {
    let (app, _) = test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/guests/export")
                .header(header::AUTHORIZATION, basic("door1", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(
            Request::get("/api/guests/export")
                .header(header::AUTHORIZATION, basic("boss", PASSWORD))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("guests.csv"));

    let csv = body_text(response).await;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "Name,Category,Table,Dietary,Phone,Email,Checked In,Checked In At"
    );
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("Amina,guest,"));
    assert!(lines[1].ends_with(",No,"));
}

#[tokio::test]
async fn admin_updates_event_details() {
    let (app, registry) = test_app().await;
    let body = json!({ "name": "Eid Dinner", "venue": "  " }).to_string();

    let response = app
        .clone()
        .oneshot(
            Request::put("/api/event")
                .header(header::AUTHORIZATION, basic("door1", PASSWORD))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(
            Request::put("/api/event")
                .header(header::AUTHORIZATION, basic("boss", PASSWORD))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let event = body_json(response).await;
    assert_eq!(event["name"], "Eid Dinner");
    assert_eq!(event["venue"], "School Hall");

    let stored = registry.active_event().await.unwrap().unwrap();
    assert_eq!(stored.name, "Eid Dinner");
}
