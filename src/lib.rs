pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod registry;
pub mod services;

use axum::Router;
use std::sync::Arc;

use crate::registry::GuestRegistry;
use crate::services::broadcast::ActivityBroadcaster;
use crate::services::checkin::CheckinService;
use crate::services::invitations::{InvitationClient, InvitationError};

// Shared state для всего приложения
pub struct AppState {
    pub config: config::Config,
    pub registry: Arc<dyn GuestRegistry>,
    pub checkin: CheckinService,
    pub broadcaster: ActivityBroadcaster,
    pub cache: Option<cache::CacheService>,
    pub invitations: InvitationClient,
}

impl AppState {
    pub fn new(
        config: config::Config,
        registry: Arc<dyn GuestRegistry>,
        cache: Option<cache::CacheService>,
    ) -> Result<Arc<Self>, InvitationError> {
        let broadcaster = ActivityBroadcaster::new(config.live.channel_capacity);
        let checkin = CheckinService::new(registry.clone(), broadcaster.clone());
        let invitations = InvitationClient::from_config(
            &config.invitations,
            &config.circuit_breaker,
            &config.app.public_base_url,
        )?;

        Ok(Arc::new(Self {
            config,
            registry,
            checkin,
            broadcaster,
            cache,
            invitations,
        }))
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    controllers::router(state)
}
