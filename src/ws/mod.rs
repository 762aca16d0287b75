//! Realtime stream server.
//!
//! Long-lived websocket sessions subscribe to market-data channels; one
//! broker consumer demultiplexes everything the server is subscribed to
//! and fans frames out to sessions verbatim.

pub mod dispatcher;
pub mod session;
pub mod subscriptions;

use std::sync::Arc;

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::debug;

pub use session::SessionRegistry;
pub use subscriptions::{BrokerCommand, SubscriptionManager};

pub struct WsState {
    pub registry: Arc<SessionRegistry>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

impl WsState {
    /// Session identity: the `sub` claim of a valid token, otherwise a
    /// fresh anonymous id.
    pub fn session_id(&self, token: Option<&str>) -> String {
        if let Some(token) = token {
            let mut validation = Validation::new(Algorithm::HS256);
            validation.validate_exp = false;
            validation.required_spec_claims.clear();
            match jsonwebtoken::decode::<Claims>(
                token,
                &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
                &validation,
            ) {
                Ok(data) if !data.claims.sub.is_empty() => return data.claims.sub,
                Ok(_) => debug!("token missing sub claim, assigning anonymous id"),
                Err(e) => debug!(error = %e, "invalid token, assigning anonymous id"),
            }
        }
        crate::broker::channels::reply_channel_id()
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

pub fn create_router(state: Arc<WsState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<Arc<WsState>>,
) -> Response {
    ws.on_upgrade(move |socket| session::handle_socket(socket, state, query.token))
}
