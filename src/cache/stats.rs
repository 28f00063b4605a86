use crate::cache::CacheService;
use crate::models::AttendanceStats;
use redis::AsyncCommands;
use tracing::{debug, warn};

fn stats_key(event_id: i64) -> String {
    format!("stats:event:{}", event_id)
}

impl CacheService {
    /// Закешированная статистика, если есть и читается
    pub async fn get_stats(&self, event_id: i64) -> Option<AttendanceStats> {
        let mut conn = self.conn.clone();
        let data: Option<String> = match conn.get(stats_key(event_id)).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Stats cache read failed: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&data?) {
            Ok(stats) => {
                debug!(event_id, "Stats cache hit");
                Some(stats)
            }
            Err(e) => {
                warn!("Stats cache entry unreadable: {}", e);
                None
            }
        }
    }

    pub async fn store_stats(&self, event_id: i64, stats: &AttendanceStats) {
        let data = match serde_json::to_string(stats) {
            Ok(data) => data,
            Err(e) => {
                warn!("Could not serialize stats for cache: {}", e);
                return;
            }
        };
        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = conn
            .set_ex(stats_key(event_id), data, self.stats_ttl_seconds)
            .await;
        if let Err(e) = result {
            warn!("Stats cache write failed: {}", e);
        }
    }

    // Вызывается после каждого успешного check-in
    pub async fn invalidate_stats(&self, event_id: i64) {
        let mut conn = self.conn.clone();
        let result: Result<(), redis::RedisError> = conn.del(stats_key(event_id)).await;
        if let Err(e) = result {
            warn!("Stats cache invalidation failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped_per_event() {
        assert_eq!(stats_key(1), "stats:event:1");
        assert_ne!(stats_key(1), stats_key(2));
    }
}
