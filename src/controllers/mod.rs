pub mod checkin;
pub mod dashboard;
pub mod event;
pub mod guests;
pub mod invitations;
pub mod live;
pub mod operators;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

// Операторские и админские маршруты под /api
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(checkin::routes())
        .merge(guests::routes())
        .merge(dashboard::routes())
        .merge(event::routes())
        .merge(invitations::routes())
        .merge(operators::routes())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Guest Check-in API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .merge(checkin::public_routes())
        .merge(live::routes())
        .nest("/api", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
