//! Request/reply over the broker.
//!
//! Replies from the engine are asynchronous and out of order with
//! respect to requests, so each request gets its own uniquely named
//! reply channel. The subscription must be active before the envelope is
//! pushed, otherwise the reply races the subscriber and is lost.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::broker::channels::{self, WORK_QUEUE};
use crate::broker::RedisClient;
use crate::error::ExchangeError;
use crate::messages::{Command, EngineReply, WorkEnvelope};

pub struct RequestClient {
    broker: Arc<RedisClient>,
    timeout: Duration,
    max_retries: u32,
}

impl RequestClient {
    pub fn new(broker: Arc<RedisClient>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            broker,
            timeout,
            max_retries: max_retries.max(1),
        }
    }

    /// Send a command and await the engine's reply.
    ///
    /// Transport errors are retried with linear backoff. A timeout means
    /// the fabric worked but the engine never answered, so it is not
    /// retried and surfaces as `GatewayTimeout`.
    pub async fn send_and_await(&self, command: Command) -> Result<EngineReply, ExchangeError> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                debug!(attempt, "retrying engine request");
                tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
            }

            match self.attempt(&command).await {
                Ok(reply) => return Ok(reply),
                Err(e @ ExchangeError::GatewayTimeout) => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "engine request attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(ExchangeError::GatewayTimeout))
    }

    async fn attempt(&self, command: &Command) -> Result<EngineReply, ExchangeError> {
        let reply_id = channels::reply_channel_id();

        // Subscribe first; only then push the work.
        let mut pubsub = self.broker.pubsub_connection().await?;
        pubsub.subscribe(&reply_id).await?;

        let envelope = WorkEnvelope {
            client_id: reply_id.clone(),
            message: command.clone(),
        };
        self.broker
            .push(WORK_QUEUE, serde_json::to_string(&envelope)?)
            .await?;

        debug!(reply_id = %reply_id, "awaiting engine reply");

        let frame = {
            let mut stream = pubsub.on_message();
            match tokio::time::timeout(self.timeout, stream.next()).await {
                Err(_) => return Err(ExchangeError::GatewayTimeout),
                Ok(None) => {
                    return Err(ExchangeError::BrokerUnavailable(
                        "reply stream closed".to_string(),
                    ))
                }
                Ok(Some(frame)) => frame,
            }
        };

        let payload: String = frame.get_payload().map_err(ExchangeError::from)?;
        let reply: EngineReply = serde_json::from_str(&payload)?;

        // Best-effort: dropping the connection releases the channel anyway.
        let _ = pubsub.unsubscribe(&reply_id).await;

        Ok(reply)
    }
}
