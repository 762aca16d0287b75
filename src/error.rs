//! Error taxonomy shared by every component.
//!
//! The gateway maps each variant to an HTTP status; the engine maps
//! failures to the safe, zero-valued reply shape for the command it was
//! handling and keeps running.

use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("unknown market: {0}")]
    UnknownMarket(String),

    #[error("insufficient {asset} funds for user {user}")]
    InsufficientFunds { user: String, asset: String },

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("timed out waiting for engine reply")]
    GatewayTimeout,

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ExchangeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ExchangeError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
            ExchangeError::UnknownMarket(_) => StatusCode::NOT_FOUND,
            ExchangeError::InsufficientFunds { .. } => StatusCode::CONFLICT,
            ExchangeError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            ExchangeError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            ExchangeError::BrokerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ExchangeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ExchangeError::InvalidOrder(_) => "INVALID_ORDER",
            ExchangeError::UnknownMarket(_) => "UNKNOWN_MARKET",
            ExchangeError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            ExchangeError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            ExchangeError::GatewayTimeout => "GATEWAY_TIMEOUT",
            ExchangeError::BrokerUnavailable(_) => "BROKER_UNAVAILABLE",
            ExchangeError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<redis::RedisError> for ExchangeError {
    fn from(err: redis::RedisError) -> Self {
        ExchangeError::BrokerUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Internal(err.to_string())
    }
}
