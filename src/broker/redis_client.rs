//! Redis connection management.
//!
//! Wraps a [`ConnectionManager`] with reconnect-and-retry semantics for
//! the queue and publish operations, and hands out dedicated pub/sub
//! connections for subscribers (a subscribing connection cannot issue
//! regular commands).

use redis::aio::{ConnectionManager, PubSub};
use redis::{AsyncCommands, Client, RedisError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g. redis://localhost:6379)
    pub url: String,
    /// Maximum retry attempts for operations.
    pub max_retries: u32,
    /// Base retry delay; backoff is linear in the attempt number.
    pub retry_delay_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

/// Shared Redis handle, safe for concurrent use.
pub struct RedisClient {
    config: RedisConfig,
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    client: Client,
}

impl RedisClient {
    pub async fn new(config: RedisConfig) -> Result<Self, RedisError> {
        let client = Client::open(config.url.as_str())?;

        let redis_client = Self {
            config,
            connection: Arc::new(RwLock::new(None)),
            client,
        };

        redis_client.ensure_connected().await?;

        Ok(redis_client)
    }

    pub async fn from_url(url: &str) -> Result<Self, RedisError> {
        Self::new(RedisConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .await
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    async fn ensure_connected(&self) -> Result<(), RedisError> {
        let mut conn = self.connection.write().await;
        if conn.is_none() {
            tracing::info!("Establishing Redis connection to {}", self.config.url);
            let manager = ConnectionManager::new(self.client.clone()).await?;
            *conn = Some(manager);
            tracing::info!("Redis connection established");
        }
        Ok(())
    }

    async fn get_connection(&self) -> Result<ConnectionManager, RedisError> {
        self.ensure_connected().await?;
        let conn = self.connection.read().await;
        conn.clone()
            .ok_or_else(|| RedisError::from((redis::ErrorKind::IoError, "Connection not available")))
    }

    /// Execute an operation with reconnect-and-retry.
    async fn with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T, RedisError>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            match self.get_connection().await {
                Ok(conn) => match operation(conn).await {
                    Ok(result) => return Ok(result),
                    Err(e) => {
                        tracing::warn!(
                            "Redis operation failed (attempt {}/{}): {}",
                            attempt + 1,
                            self.config.max_retries,
                            e
                        );
                        last_error = Some(e);

                        // Clear connection on error to force reconnect
                        if attempt < self.config.max_retries - 1 {
                            let mut conn = self.connection.write().await;
                            *conn = None;
                            tokio::time::sleep(Duration::from_millis(
                                self.config.retry_delay_ms * (attempt as u64 + 1),
                            ))
                            .await;
                        }
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        "Redis connection failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.config.max_retries,
                        e
                    );
                    last_error = Some(e);

                    if attempt < self.config.max_retries - 1 {
                        tokio::time::sleep(Duration::from_millis(
                            self.config.retry_delay_ms * (attempt as u64 + 1),
                        ))
                        .await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| RedisError::from((redis::ErrorKind::IoError, "Max retries exceeded"))))
    }

    // ==================== Queue Operations ====================

    /// LPUSH onto a list queue.
    pub async fn push(&self, queue: &str, payload: String) -> Result<(), RedisError> {
        self.with_retry(|mut conn| {
            let queue = queue.to_string();
            let payload = payload.clone();
            async move { conn.lpush(&queue, payload).await }
        })
        .await
    }

    /// BRPOP with a timeout in seconds; `None` when the timeout elapsed
    /// with nothing to pop. Not retried: the caller loops anyway and a
    /// retry here could double-pop nothing but delay shutdown.
    pub async fn pop(&self, queue: &str, timeout_secs: usize) -> Result<Option<String>, RedisError> {
        let mut conn = self.get_connection().await?;
        let popped: Option<(String, String)> = conn.brpop(queue, timeout_secs as f64).await?;
        Ok(popped.map(|(_, payload)| payload))
    }

    // ==================== Pub/Sub Operations ====================

    /// PUBLISH; returns the subscriber count.
    pub async fn publish(&self, channel: &str, payload: String) -> Result<i32, RedisError> {
        self.with_retry(|mut conn| {
            let channel = channel.to_string();
            let payload = payload.clone();
            async move { conn.publish(&channel, payload).await }
        })
        .await
    }

    /// Open a dedicated pub/sub connection. Dropping it releases all of
    /// its subscriptions server-side.
    pub async fn pubsub_connection(&self) -> Result<PubSub, RedisError> {
        let conn = self.client.get_async_connection().await?;
        Ok(conn.into_pubsub())
    }

    // ==================== Utility Operations ====================

    /// PING health check.
    pub async fn ping(&self) -> Result<bool, RedisError> {
        self.with_retry(|mut conn| async move {
            let result: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(result == "PONG")
        })
        .await
    }

    pub async fn is_available(&self) -> bool {
        self.ping().await.unwrap_or(false)
    }
}
