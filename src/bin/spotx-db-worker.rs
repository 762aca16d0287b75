//! Trade persistence process: drains the trade queue into TimescaleDB
//! and refreshes the kline materialized views on a timer.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spotx::broker::RedisClient;
use spotx::config::AppConfig;
use spotx::persistence::{worker, TradeStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spotx=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting db worker v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);

    spotx::metrics::init(config.metrics_port)?;

    let broker = Arc::new(RedisClient::from_url(&config.redis_url).await?);
    tracing::info!("Broker connected at {}", config.redis_url);

    let store = TradeStore::connect(&config.database_url).await?;
    tracing::info!("Trade store connected");

    tokio::spawn(worker::run_view_refresher(
        store.clone(),
        Duration::from_secs(config.view_refresh_secs),
    ));

    worker::run_trade_worker(broker, store).await
}
