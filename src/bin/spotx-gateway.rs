//! HTTP gateway process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spotx::broker::RedisClient;
use spotx::config::AppConfig;
use spotx::gateway::{self, reply::RequestClient, GatewayState};
use spotx::persistence::TradeStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spotx=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);

    spotx::metrics::init(config.metrics_port)?;

    let broker = Arc::new(RedisClient::from_url(&config.redis_url).await?);
    tracing::info!("Broker connected at {}", config.redis_url);

    let store = TradeStore::connect(&config.database_url).await?;
    tracing::info!("Trade store connected");

    let request_client = RequestClient::new(
        broker,
        Duration::from_secs(config.reply_timeout_secs),
        config.reply_retries,
    );

    let state = Arc::new(GatewayState {
        request_client,
        store,
    });

    let app = gateway::create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
