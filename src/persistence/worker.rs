//! Persistence worker loops.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::TradeStore;
use crate::broker::channels::TRADE_QUEUE;
use crate::broker::RedisClient;
use crate::messages::DbMessage;

/// Blocking-pop loop over the trade queue. Persistence is best-effort
/// from the engine's perspective: bad items are dropped with a log line,
/// database errors are logged and the loop continues.
pub async fn run_trade_worker(broker: Arc<RedisClient>, store: TradeStore) -> anyhow::Result<()> {
    info!("persistence worker consuming trade queue");

    loop {
        let raw = match broker.pop(TRADE_QUEUE, 0).await {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "trade queue pop failed, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let message: DbMessage = match serde_json::from_str(&raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "discarding malformed trade record");
                continue;
            }
        };

        let DbMessage::TradeAdded(row) = message;
        match store.insert_trade(&row).await {
            Ok(()) => {
                metrics::counter!("spotx_persisted_trades_total").increment(1);
                debug!(trade_id = %row.id, market = %row.market, "trade persisted");
            }
            Err(e) => {
                error!(trade_id = %row.id, error = %e, "trade insert failed");
            }
        }
    }
}

/// Refresh the kline materialized views at a fixed cadence.
pub async fn run_view_refresher(store: TradeStore, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "kline view refresher started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        store.refresh_kline_views().await;
    }
}
