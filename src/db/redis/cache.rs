use std::fmt::Display;

use redis::AsyncCommands;
use redis::Client;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// One user's recommendation set at a given list length
    Recommendations { user_id: i32, count: usize },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Recommendations { user_id, count } => {
                write!(f, "recs:{}:{}", user_id, count)
            }
        }
    }
}

pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

struct PendingWrite {
    key: String,
    payload: String,
    ttl: u64,
}

/// JSON values in Redis with expiry; writes go through a background task
#[derive(Clone)]
pub struct Cache {
    client: Client,
    writes: mpsc::UnboundedSender<PendingWrite>,
}

/// Stops the background writer once queued writes are flushed
pub struct CacheWriterHandle {
    stop: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) {
        let _ = self.stop.send(()).await;
        tracing::info!("Cache writer asked to stop");
    }
}

impl Cache {
    pub async fn new(client: Client) -> (Self, CacheWriterHandle) {
        let (writes, queue) = mpsc::unbounded_channel();
        let (stop, stop_rx) = mpsc::channel(1);

        tokio::spawn(Self::run_writer(client.clone(), queue, stop_rx));

        (Self { client, writes }, CacheWriterHandle { stop })
    }

    async fn run_writer(
        client: Client,
        mut queue: mpsc::UnboundedReceiver<PendingWrite>,
        mut stop: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer started");
        let mut failed = 0usize;

        loop {
            tokio::select! {
                Some(write) = queue.recv() => {
                    if let Err(e) = Self::store(&client, write).await {
                        failed += 1;
                        tracing::error!(error = %e, failed, "Cache write failed");
                    }
                }
                _ = stop.recv() => {
                    // drain what was queued before the stop signal
                    queue.close();
                    while let Some(write) = queue.recv().await {
                        if let Err(e) = Self::store(&client, write).await {
                            tracing::error!(error = %e, "Cache write failed during shutdown");
                        }
                    }
                    tracing::info!(failed, "Cache writer stopped");
                    break;
                }
            }
        }
    }

    async fn store(client: &Client, write: PendingWrite) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(write.key, write.payload, write.ttl).await?;
        Ok(())
    }

    /// `Ok(None)` on a miss
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(key.to_string()).await?;

        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| AppError::Internal(format!("Cached value for {} is unreadable: {}", key, e)))
        })
        .transpose()
    }

    /// Queues a write and returns immediately; failures are only logged
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let payload = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Could not serialize value for cache");
                return;
            }
        };

        let write = PendingWrite {
            key: key.to_string(),
            payload,
            ttl,
        };
        if self.writes.send(write).is_err() {
            tracing::warn!(key = %key, "Cache writer has stopped; dropping write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecommendationSet;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    #[test]
    fn test_recommendation_key_format() {
        let key = CacheKey::Recommendations {
            user_id: 42,
            count: 5,
        };
        assert_eq!(key.to_string(), "recs:42:5");
    }

    #[test]
    fn test_keys_differ_by_count() {
        let five = CacheKey::Recommendations {
            user_id: 1,
            count: 5,
        };
        let ten = CacheKey::Recommendations {
            user_id: 1,
            count: 10,
        };
        assert_ne!(five.to_string(), ten.to_string());
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(create_redis_client("not a url").is_err());
    }

    #[tokio::test]
    #[ignore = "needs a running Redis"]
    async fn test_cache_miss() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, _handle) = Cache::new(client).await;

        let key = CacheKey::Recommendations {
            user_id: -1,
            count: 5,
        };
        let retrieved: Option<RecommendationSet> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, None);
    }

    #[tokio::test]
    #[ignore = "needs a running Redis"]
    async fn test_background_write_survives_shutdown() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, handle) = Cache::new(client.clone()).await;

        let key = CacheKey::Recommendations {
            user_id: -2,
            count: 3,
        };
        let value = RecommendationSet {
            user_id: -2,
            collaborative: vec![1, 2],
            association: vec![],
            content: vec![3],
        };

        cache.set_in_background(&key, &value, 60);
        handle.shutdown().await;
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        let retrieved: Option<RecommendationSet> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(value));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }
}
