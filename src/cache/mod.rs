//! Redis cache-aside for dashboard reads.
//!
//! The registry stays authoritative; a Redis outage only costs a trip to the
//! database. Every cache error is logged and swallowed.

use redis::{aio::MultiplexedConnection, Client};
use tracing::info;

use crate::config::RedisConfig;

pub mod stats;

#[derive(Clone)]
pub struct CacheService {
    conn: MultiplexedConnection,
    stats_ttl_seconds: u64,
}

impl CacheService {
    pub async fn connect(config: &RedisConfig) -> redis::RedisResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        info!(ttl_seconds = config.stats_ttl_seconds, "Redis stats cache connected");
        Ok(Self::new(conn, config.stats_ttl_seconds))
    }

    pub fn new(conn: MultiplexedConnection, stats_ttl_seconds: u64) -> Self {
        Self {
            conn,
            stats_ttl_seconds: stats_ttl_seconds.max(1),
        }
    }
}
