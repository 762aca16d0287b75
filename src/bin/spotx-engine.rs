//! Matching engine process: the single consumer of the work queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spotx::broker::RedisClient;
use spotx::config::AppConfig;
use spotx::engine::{snapshot, Engine, EngineService};

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

    tracing::info!("Starting engine v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);

    spotx::metrics::init(config.metrics_port)?;

    let broker = Arc::new(RedisClient::from_url(&config.redis_url).await?);
    tracing::info!("Broker connected at {}", config.redis_url);

    let snapshot_path = PathBuf::from(&config.snapshot_path);
    let engine = match snapshot::load(&snapshot_path).await {
        Some(mut engine) => {
            engine.set_scale(config.display_scale);
            engine
        }
        None => {
            let markets = config.get_markets();
            let mut engine = Engine::new(&markets, config.display_scale)?;
            tracing::info!("No snapshot, fresh engine for {:?}", markets);

            let seed_users = config.get_seed_users();
            if !seed_users.is_empty() {
                engine.seed_balances(&seed_users, Decimal::from(10_000_000));
            }
            engine
        }
    };

    EngineService::new(
        engine,
        broker,
        snapshot_path,
        Duration::from_secs(config.snapshot_interval_secs),
    )
    .run()
    .await
}
