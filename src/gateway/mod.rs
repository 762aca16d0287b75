//! HTTP gateway.
//!
//! Stateless: every command is enqueued for the engine with a fresh
//! reply channel, and the first frame on that channel becomes the HTTP
//! response. The auxiliary market-history endpoints read the trade store
//! directly.

pub mod handlers;
pub mod reply;
pub mod response;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::persistence::TradeStore;
use reply::RequestClient;

pub struct GatewayState {
    pub request_client: RequestClient,
    pub store: TradeStore,
}

pub fn create_router(state: Arc<GatewayState>) -> Router {
    let v1 = Router::new()
        .route(
            "/order",
            post(handlers::create_order).delete(handlers::cancel_order),
        )
        .route("/order/open", get(handlers::get_open_orders))
        .route("/depth", get(handlers::get_depth))
        .route("/onramp", post(handlers::on_ramp))
        .route("/klines/:interval", get(handlers::get_klines))
        .route("/latestprice", get(handlers::get_latest_price))
        .route("/trades", get(handlers::get_recent_trades))
        .route("/trades/:market", get(handlers::get_market_trades));

    Router::new()
        .route("/health", get(health_check))
        .nest("/v1", v1)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
