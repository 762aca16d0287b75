//! Engine runtime: the single work-queue consumer.
//!
//! Pops command envelopes from the work queue, applies them to the
//! engine, publishes the reply on the caller's channel, and fans the
//! handler's publications out to the trade queue and market-data
//! channels. Snapshots are written on a timer between messages.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use super::{snapshot, Engine, Outbound};
use crate::broker::channels::{TRADE_QUEUE, WORK_QUEUE};
use crate::broker::RedisClient;
use crate::messages::WorkEnvelope;

/// How long one BRPOP blocks before the loop re-checks the snapshot
/// deadline.
const POP_TIMEOUT_SECS: usize = 1;

pub struct EngineService {
    engine: Engine,
    broker: Arc<RedisClient>,
    snapshot_path: PathBuf,
    snapshot_interval: Duration,
}

impl EngineService {
    pub fn new(
        engine: Engine,
        broker: Arc<RedisClient>,
        snapshot_path: PathBuf,
        snapshot_interval: Duration,
    ) -> Self {
        Self {
            engine,
            broker,
            snapshot_path,
            snapshot_interval,
        }
    }

    /// Consume the work queue forever. Broker failures back off and
    /// retry; command failures are absorbed by the engine's safe replies.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(
            markets = self.engine.orderbooks.len(),
            "engine consuming work queue"
        );
        let mut last_snapshot = Instant::now();

        loop {
            if last_snapshot.elapsed() >= self.snapshot_interval {
                if let Err(e) = snapshot::save(&self.engine, &self.snapshot_path).await {
                    warn!(error = %e, "snapshot write failed");
                }
                last_snapshot = Instant::now();
            }

            let raw = match self.broker.pop(WORK_QUEUE, POP_TIMEOUT_SECS).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "work queue pop failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let envelope: WorkEnvelope = match serde_json::from_str(&raw) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "discarding malformed work envelope");
                    continue;
                }
            };

            self.handle(envelope).await;
        }
    }

    async fn handle(&mut self, envelope: WorkEnvelope) {
        let (reply, outbound) = self.engine.apply(envelope.message);
        metrics::counter!("spotx_engine_commands_total").increment(1);

        // The reply goes out first: the gateway is waiting on it, the
        // fan-out traffic is fire-and-forget.
        match serde_json::to_string(&reply) {
            Ok(payload) => {
                if let Err(e) = self.broker.publish(&envelope.client_id, payload).await {
                    warn!(client_id = %envelope.client_id, error = %e, "reply publish failed");
                }
            }
            Err(e) => error!(error = %e, "reply serialization failed"),
        }

        for event in outbound {
            self.publish(event).await;
        }
    }

    async fn publish(&self, event: Outbound) {
        match event {
            Outbound::Trade(message) => match serde_json::to_string(&message) {
                Ok(payload) => {
                    metrics::counter!("spotx_engine_trades_total").increment(1);
                    if let Err(e) = self.broker.push(TRADE_QUEUE, payload).await {
                        warn!(error = %e, "trade queue push failed");
                    }
                }
                Err(e) => error!(error = %e, "trade record serialization failed"),
            },
            Outbound::Market { channel, frame } => match serde_json::to_string(&frame) {
                Ok(payload) => {
                    if let Err(e) = self.broker.publish(&channel, payload).await {
                        warn!(channel = %channel, error = %e, "market-data publish failed");
                    }
                }
                Err(e) => error!(error = %e, "market-data serialization failed"),
            },
        }
    }
}
