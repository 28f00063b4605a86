use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use guest_checkin::{
    app,
    cache::CacheService,
    config::{Config, LogFormat, StorageBackend, DEFAULT_ADMIN_PASSWORD},
    database::Database,
    registry::{GuestRegistry, MemoryRegistry, PostgresRegistry},
    services::accounts::seed_admin,
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;

    let filter = tracing_subscriber::EnvFilter::new(&config.app.rust_log);
    match config.app.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    info!(environment = %config.app.environment, "Starting Guest Check-in API");

    let registry: Arc<dyn GuestRegistry> = match (config.storage, &config.database) {
        (StorageBackend::Postgres, Some(db_config)) => {
            let db = Database::connect(db_config)
                .await
                .context("failed to connect to database")?;
            db.run_migrations()
                .await
                .context("failed to run migrations")?;
            Arc::new(PostgresRegistry::new(db))
        }
        (StorageBackend::Postgres, None) => anyhow::bail!("DATABASE_URL must be set"),
        (StorageBackend::Memory, _) => {
            warn!("Using in-memory storage, data is lost on restart");
            Arc::new(MemoryRegistry::new())
        }
    };

    if config.auth.admin_password == DEFAULT_ADMIN_PASSWORD {
        warn!("ADMIN_PASSWORD not set, using the default password");
    }
    seed_admin(registry.as_ref(), &config.auth, bcrypt::DEFAULT_COST)
        .await
        .context("failed to seed admin account")?;

    // Redis необязателен: без него статистика читается напрямую
    let cache = match &config.redis {
        Some(redis_config) => match CacheService::connect(redis_config).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!("Redis unavailable, stats cache disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("invalid HOST/PORT")?;

    let state = AppState::new(config, registry, cache).context("failed to build app state")?;
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
