//! Gateway HTTP handlers.
//!
//! Engine-backed routes forward a command over the work queue and return
//! the engine's reply payload verbatim; history routes read the trade
//! store.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::response::validation_error;
use super::GatewayState;
use crate::error::ExchangeError;
use crate::messages::{
    CancelOrderData, Command, CreateOrderData, EngineReply, GetDepthData, GetOpenOrdersData,
    OnRampData,
};
use crate::persistence::{KlineInterval, TradeRecord};

fn reply_payload(reply: &EngineReply) -> Result<serde_json::Value, ExchangeError> {
    let mut value = serde_json::to_value(reply)?;
    match value.get_mut("payload") {
        Some(payload) => Ok(payload.take()),
        None => Err(ExchangeError::Internal("reply missing payload".to_string())),
    }
}

fn internal(e: sqlx::Error) -> ExchangeError {
    ExchangeError::Internal(e.to_string())
}

// ============================================================================
// Engine-backed routes
// ============================================================================

/// POST /v1/order
pub async fn create_order(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<CreateOrderData>,
) -> Result<(StatusCode, Json<serde_json::Value>), ExchangeError> {
    req.validate().map_err(validation_error)?;
    let reply = state
        .request_client
        .send_and_await(Command::CreateOrder(req))
        .await?;
    Ok((StatusCode::CREATED, Json(reply_payload(&reply)?)))
}

/// DELETE /v1/order
pub async fn cancel_order(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<CancelOrderData>,
) -> Result<Json<serde_json::Value>, ExchangeError> {
    req.validate().map_err(validation_error)?;
    let reply = state
        .request_client
        .send_and_await(Command::CancelOrder(req))
        .await?;
    Ok(Json(reply_payload(&reply)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrdersQuery {
    pub user_id: String,
    pub market: String,
}

/// GET /v1/order/open?userId=..&market=..
pub async fn get_open_orders(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<OpenOrdersQuery>,
) -> Result<Json<serde_json::Value>, ExchangeError> {
    let reply = state
        .request_client
        .send_and_await(Command::GetOpenOrders(GetOpenOrdersData {
            user_id: query.user_id,
            market: query.market,
        }))
        .await?;
    Ok(Json(reply_payload(&reply)?))
}

#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    pub market: String,
}

/// GET /v1/depth?market=..
pub async fn get_depth(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<DepthQuery>,
) -> Result<Json<serde_json::Value>, ExchangeError> {
    let reply = state
        .request_client
        .send_and_await(Command::GetDepth(GetDepthData {
            market: query.market,
        }))
        .await?;
    Ok(Json(reply_payload(&reply)?))
}

/// POST /v1/onramp
pub async fn on_ramp(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<OnRampData>,
) -> Result<Json<serde_json::Value>, ExchangeError> {
    req.validate().map_err(validation_error)?;
    let reply = state
        .request_client
        .send_and_await(Command::OnRamp(req))
        .await?;
    Ok(Json(reply_payload(&reply)?))
}

// ============================================================================
// Trade-store-backed routes
// ============================================================================

/// GET /v1/klines/{interval}
pub async fn get_klines(
    State(state): State<Arc<GatewayState>>,
    Path(interval): Path<String>,
) -> Result<Json<serde_json::Value>, ExchangeError> {
    let interval = KlineInterval::parse(&interval)
        .ok_or_else(|| ExchangeError::InvalidOrder(format!("invalid interval: {interval}")))?;
    let klines = state.store.get_klines(interval).await.map_err(internal)?;
    Ok(Json(serde_json::to_value(klines)?))
}

#[derive(Debug, Serialize)]
pub struct LatestPriceResponse {
    pub price: Decimal,
    pub time: DateTime<Utc>,
}

/// GET /v1/latestprice
pub async fn get_latest_price(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<LatestPriceResponse>, ExchangeError> {
    let price = state
        .store
        .latest_price()
        .await
        .map_err(internal)?
        .ok_or_else(|| ExchangeError::OrderNotFound("no trades recorded".to_string()))?;
    Ok(Json(LatestPriceResponse {
        price,
        time: Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub limit: Option<i64>,
    pub market: Option<String>,
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 1000)
}

#[derive(Debug, Serialize)]
pub struct TradesResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    pub trades: Vec<TradeRecord>,
    pub count: usize,
}

/// GET /v1/trades?limit=..&market=..
pub async fn get_recent_trades(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<TradesResponse>, ExchangeError> {
    let trades = state
        .store
        .recent_trades(clamp_limit(query.limit), query.market.as_deref())
        .await
        .map_err(internal)?;
    Ok(Json(TradesResponse {
        market: None,
        count: trades.len(),
        trades,
    }))
}

/// GET /v1/trades/{market}
pub async fn get_market_trades(
    State(state): State<Arc<GatewayState>>,
    Path(market): Path<String>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<TradesResponse>, ExchangeError> {
    let trades = state
        .store
        .recent_trades(clamp_limit(query.limit), Some(&market))
        .await
        .map_err(internal)?;
    Ok(Json(TradesResponse {
        market: Some(market),
        count: trades.len(),
        trades,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reply_payload_extracts_body() {
        let reply = EngineReply::OnRamp {
            user_id: "A".to_string(),
            balance: dec!(100),
        };
        let payload = reply_payload(&reply).unwrap();
        assert_eq!(payload["userId"], "A");
        assert_eq!(payload["balance"], "100");
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(5000)), 1000);
        assert_eq!(clamp_limit(Some(200)), 200);
    }
}
