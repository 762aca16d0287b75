//! Wire types for the message fabric.
//!
//! Everything that crosses Redis is defined here as a closed sum type
//! with an explicit discriminator tag, so every process decodes the same
//! shapes: gateway commands, engine replies, persistence records, and the
//! market-data frames fanned out to stream subscribers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Fill, Order, Side};

// ============================================================================
// Work queue (gateway -> engine)
// ============================================================================

/// Envelope pushed onto the work queue. `client_id` doubles as the name
/// of the pub/sub channel the engine replies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkEnvelope {
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub message: Command,
}

/// Commands the engine consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Command {
    #[serde(rename = "CREATE_ORDER")]
    CreateOrder(CreateOrderData),
    #[serde(rename = "CANCEL_ORDER")]
    CancelOrder(CancelOrderData),
    #[serde(rename = "GET_OPEN_ORDERS")]
    GetOpenOrders(GetOpenOrdersData),
    #[serde(rename = "ON_RAMP")]
    OnRamp(OnRampData),
    #[serde(rename = "GET_DEPTH")]
    GetDepth(GetDepthData),
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderData {
    #[validate(length(min = 1))]
    pub market: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub side: Side,
    #[validate(length(min = 1))]
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderData {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[validate(length(min = 1))]
    pub market: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOpenOrdersData {
    pub user_id: String,
    pub market: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OnRampData {
    #[validate(length(min = 1))]
    pub user_id: String,
    pub amount: Decimal,
    #[validate(length(min = 1))]
    pub txn_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDepthData {
    pub market: String,
}

// ============================================================================
// Reply channel (engine -> gateway)
// ============================================================================

/// Engine replies, published on the per-request reply channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineReply {
    #[serde(rename = "ORDER_PLACED")]
    #[serde(rename_all = "camelCase")]
    OrderPlaced {
        order_id: String,
        executed_qty: Decimal,
        fills: Vec<Fill>,
    },
    #[serde(rename = "ORDER_CANCELLED")]
    #[serde(rename_all = "camelCase")]
    OrderCancelled {
        order_id: String,
        executed_qty: Decimal,
        remaining_qty: Decimal,
    },
    #[serde(rename = "OPEN_ORDERS")]
    OpenOrders { orders: Vec<Order> },
    #[serde(rename = "ON_RAMP")]
    #[serde(rename_all = "camelCase")]
    OnRamp { user_id: String, balance: Decimal },
    #[serde(rename = "GET_DEPTH")]
    Depth(DepthPayload),
}

impl EngineReply {
    /// Failure-shaped reply for CREATE_ORDER: nothing executed, nothing
    /// resting.
    pub fn order_rejected() -> Self {
        EngineReply::OrderCancelled {
            order_id: String::new(),
            executed_qty: Decimal::ZERO,
            remaining_qty: Decimal::ZERO,
        }
    }
}

/// Aggregated depth, prices formatted at display scale, bids descending
/// and asks ascending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepthPayload {
    pub bids: Vec<[String; 2]>,
    pub asks: Vec<[String; 2]>,
}

// ============================================================================
// Trade queue (engine -> persistence worker)
// ============================================================================

/// Records pushed onto the persistence queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DbMessage {
    #[serde(rename = "TRADE_ADDED")]
    TradeAdded(TradeRow),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRow {
    pub id: String,
    pub market: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub quote_quantity: Decimal,
    pub is_buyer_maker: bool,
    /// Unix seconds.
    pub timestamp: i64,
}

// ============================================================================
// Market-data channels (engine -> stream server -> clients)
// ============================================================================

/// A frame published on `depth@<market>` or `trade@<market>` and relayed
/// verbatim to subscribed stream clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFrame {
    pub stream: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DepthEvent>,
    #[serde(rename = "tradeData", skip_serializing_if = "Option::is_none")]
    pub trade_data: Option<TradeEvent>,
}

impl StreamFrame {
    pub fn depth(stream: String, bids: Vec<[String; 2]>, asks: Vec<[String; 2]>) -> Self {
        StreamFrame {
            stream,
            data: Some(DepthEvent {
                bids,
                asks,
                event: "depth".to_string(),
            }),
            trade_data: None,
        }
    }

    pub fn trade(stream: String, trade: TradeEvent) -> Self {
        StreamFrame {
            stream,
            data: None,
            trade_data: Some(trade),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthEvent {
    #[serde(rename = "b")]
    pub bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    pub asks: Vec<[String; 2]>,
    #[serde(rename = "e")]
    pub event: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    #[serde(rename = "e")]
    pub event: String,
    pub market: String,
    pub id: String,
    pub is_buyer_maker: bool,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: i64,
}

// ============================================================================
// Stream client protocol
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamMethod {
    #[serde(rename = "SUBSCRIBE")]
    Subscribe,
    #[serde(rename = "UNSUBSCRIBE")]
    Unsubscribe,
}

/// Inbound client frame: `{"method":"SUBSCRIBE","params":["depth@SOL_USD"]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRequest {
    pub method: StreamMethod,
    #[serde(default)]
    pub params: Vec<String>,
}
