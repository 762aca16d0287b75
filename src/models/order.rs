//! Order and fill types shared by the engine and the wire.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// A resting or incoming limit order.
///
/// Identity is immutable; only `filled` moves, from zero up to `quantity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub price: Decimal,
    pub quantity: Decimal,
    pub order_id: String,
    pub filled: Decimal,
    pub side: Side,
    pub user_id: String,
}

impl Order {
    pub fn remaining(&self) -> Decimal {
        self.quantity - self.filled
    }

    pub fn is_open(&self) -> bool {
        self.filled < self.quantity
    }
}

/// One match between an incoming taker order and a resting maker order,
/// executed at the maker's price.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub price: Decimal,
    pub qty: Decimal,
    pub trade_id: u64,
    pub maker_order_id: String,
    pub maker_user_id: String,
}

/// Short order ids: the first segment of a v4 UUID.
pub fn generate_order_id() -> String {
    let full = uuid::Uuid::new_v4().to_string();
    full.split('-').next().unwrap_or(&full).to_string()
}
