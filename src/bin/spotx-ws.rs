//! Realtime stream server process.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spotx::broker::RedisClient;
use spotx::config::AppConfig;
use spotx::ws::{self, dispatcher, SessionRegistry, SubscriptionManager, WsState};

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

    tracing::info!("Starting stream server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);

    spotx::metrics::init(config.metrics_port)?;

    let broker = Arc::new(RedisClient::from_url(&config.redis_url).await?);
    tracing::info!("Broker connected at {}", config.redis_url);

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let subscriptions = Arc::new(SubscriptionManager::new(control_tx));
    let registry = Arc::new(SessionRegistry::new());

    tokio::spawn({
        let broker = broker.clone();
        let subscriptions = subscriptions.clone();
        let registry = registry.clone();
        async move {
            if let Err(e) = dispatcher::run(broker, control_rx, subscriptions, registry).await {
                tracing::error!(error = %e, "dispatcher stopped");
            }
        }
    });

    let state = Arc::new(WsState {
        registry,
        subscriptions,
        jwt_secret: config.jwt_secret.clone(),
    });

    let app = ws::create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.ws_port));
    tracing::info!("Stream server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
