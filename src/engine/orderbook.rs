//! Limit order book with price-time priority.
//!
//! Each side is an ordered sequence: bids by price descending, asks by
//! price ascending, FIFO among orders at the same price. Trades always
//! execute at the resting (maker) order's price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ExchangeError;
use crate::messages::DepthPayload;
use crate::models::{fmt_scaled, Fill, Order, Side};

/// Result of matching one incoming order.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub executed_qty: Decimal,
    pub fills: Vec<Fill>,
}

/// Derived book view.
#[derive(Debug, Clone, Serialize)]
pub struct BookStats {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub current_price: Decimal,
    pub last_trade_id: u64,
    pub open_bids: usize,
    pub open_asks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Orderbook {
    pub base_asset: String,
    pub quote_asset: String,
    /// Sorted by price descending, FIFO within a level.
    pub bids: Vec<Order>,
    /// Sorted by price ascending, FIFO within a level.
    pub asks: Vec<Order>,
    pub last_trade_id: u64,
    pub current_price: Decimal,
}

impl Orderbook {
    pub fn new(base_asset: &str, quote_asset: &str) -> Self {
        Self {
            base_asset: base_asset.to_string(),
            quote_asset: quote_asset.to_string(),
            bids: Vec::new(),
            asks: Vec::new(),
            last_trade_id: 0,
            current_price: Decimal::ZERO,
        }
    }

    pub fn ticker(&self) -> String {
        format!("{}_{}", self.base_asset, self.quote_asset)
    }

    /// Match an incoming order and rest any residual at its price-time
    /// position. Returns the executed quantity and the fills produced.
    pub fn add(&mut self, order: Order) -> Result<MatchResult, ExchangeError> {
        self.validate(&order)?;

        let result = match order.side {
            Side::Buy => self.match_bid(&order),
            Side::Sell => self.match_ask(&order),
        };

        if result.executed_qty < order.quantity {
            let residual = Order {
                quantity: order.quantity - result.executed_qty,
                filled: Decimal::ZERO,
                ..order
            };
            match residual.side {
                Side::Buy => Self::insert_bid(&mut self.bids, residual),
                Side::Sell => Self::insert_ask(&mut self.asks, residual),
            }
        }

        Ok(result)
    }

    fn match_bid(&mut self, order: &Order) -> MatchResult {
        let mut fills = Vec::new();
        let mut executed = Decimal::ZERO;

        for ask in self.asks.iter_mut() {
            if executed >= order.quantity {
                break;
            }
            // Asks are sorted ascending: past the limit, nothing matches.
            if ask.price > order.price {
                break;
            }
            let maker_remaining = ask.quantity - ask.filled;
            if maker_remaining <= Decimal::ZERO {
                continue;
            }

            let qty = (order.quantity - executed).min(maker_remaining);
            ask.filled += qty;
            executed += qty;
            self.current_price = ask.price;
            self.last_trade_id += 1;

            fills.push(Fill {
                price: ask.price,
                qty,
                trade_id: self.last_trade_id,
                maker_order_id: ask.order_id.clone(),
                maker_user_id: ask.user_id.clone(),
            });
        }

        self.asks.retain(Order::is_open);

        MatchResult {
            executed_qty: executed,
            fills,
        }
    }

    fn match_ask(&mut self, order: &Order) -> MatchResult {
        let mut fills = Vec::new();
        let mut executed = Decimal::ZERO;

        for bid in self.bids.iter_mut() {
            if executed >= order.quantity {
                break;
            }
            // Bids are sorted descending: below the limit, nothing matches.
            if bid.price < order.price {
                break;
            }
            let maker_remaining = bid.quantity - bid.filled;
            if maker_remaining <= Decimal::ZERO {
                continue;
            }

            let qty = (order.quantity - executed).min(maker_remaining);
            bid.filled += qty;
            executed += qty;
            self.current_price = bid.price;
            self.last_trade_id += 1;

            fills.push(Fill {
                price: bid.price,
                qty,
                trade_id: self.last_trade_id,
                maker_order_id: bid.order_id.clone(),
                maker_user_id: bid.user_id.clone(),
            });
        }

        self.bids.retain(Order::is_open);

        MatchResult {
            executed_qty: executed,
            fills,
        }
    }

    /// Remove a resting order. Returns it so the engine can unlock the
    /// residual funds and emit a depth delta at its price.
    pub fn cancel(&mut self, order_id: &str) -> Option<Order> {
        if let Some(pos) = self.bids.iter().position(|o| o.order_id == order_id) {
            return Some(self.bids.remove(pos));
        }
        if let Some(pos) = self.asks.iter().position(|o| o.order_id == order_id) {
            return Some(self.asks.remove(pos));
        }
        None
    }

    pub fn find(&self, order_id: &str) -> Option<&Order> {
        self.bids
            .iter()
            .chain(self.asks.iter())
            .find(|o| o.order_id == order_id)
    }

    /// Aggregate remaining quantity per price level, bids descending and
    /// asks ascending, truncated to `limit` levels per side.
    pub fn depth(&self, limit: usize, scale: u32) -> DepthPayload {
        let mut bid_levels: BTreeMap<Decimal, Decimal> = BTreeMap::new();
        for order in &self.bids {
            if order.is_open() {
                *bid_levels.entry(order.price).or_default() += order.remaining();
            }
        }

        let mut ask_levels: BTreeMap<Decimal, Decimal> = BTreeMap::new();
        for order in &self.asks {
            if order.is_open() {
                *ask_levels.entry(order.price).or_default() += order.remaining();
            }
        }

        let bids = bid_levels
            .iter()
            .rev()
            .take(limit)
            .map(|(price, qty)| [fmt_scaled(*price, scale), fmt_scaled(*qty, scale)])
            .collect();
        let asks = ask_levels
            .iter()
            .take(limit)
            .map(|(price, qty)| [fmt_scaled(*price, scale), fmt_scaled(*qty, scale)])
            .collect();

        DepthPayload { bids, asks }
    }

    /// All of one user's resting orders, asks first (insertion order
    /// within each side).
    pub fn open_orders(&self, user_id: &str) -> Vec<Order> {
        self.asks
            .iter()
            .chain(self.bids.iter())
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.iter().map(|o| o.price).max()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.iter().map(|o| o.price).min()
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn stats(&self) -> BookStats {
        BookStats {
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            spread: self.spread(),
            current_price: self.current_price,
            last_trade_id: self.last_trade_id,
            open_bids: self.bids.len(),
            open_asks: self.asks.len(),
        }
    }

    /// Validation is public so the engine can reject an order before any
    /// funds are locked for it.
    pub fn validate(&self, order: &Order) -> Result<(), ExchangeError> {
        if order.price <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(format!(
                "price must be positive, got {}",
                order.price
            )));
        }
        if order.quantity <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(format!(
                "quantity must be positive, got {}",
                order.quantity
            )));
        }
        if order.order_id.is_empty() {
            return Err(ExchangeError::InvalidOrder("order id cannot be empty".into()));
        }
        if order.user_id.is_empty() {
            return Err(ExchangeError::InvalidOrder("user id cannot be empty".into()));
        }
        Ok(())
    }

    fn insert_bid(bids: &mut Vec<Order>, order: Order) {
        // Strictly-greater keeps FIFO among equal prices.
        let pos = bids
            .iter()
            .position(|b| order.price > b.price)
            .unwrap_or(bids.len());
        bids.insert(pos, order);
    }

    fn insert_ask(asks: &mut Vec<Order>, order: Order) {
        let pos = asks
            .iter()
            .position(|a| order.price < a.price)
            .unwrap_or(asks.len());
        asks.insert(pos, order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(id: &str, user: &str, side: Side, price: Decimal, qty: Decimal) -> Order {
        Order {
            price,
            quantity: qty,
            order_id: id.to_string(),
            filled: Decimal::ZERO,
            side,
            user_id: user.to_string(),
        }
    }

    fn book() -> Orderbook {
        Orderbook::new("SOL", "USD")
    }

    #[test]
    fn test_trade_executes_at_maker_price() {
        let mut book = book();
        book.add(order("s1", "B", Side::Sell, dec!(100), dec!(1))).unwrap();

        let result = book
            .add(order("b1", "A", Side::Buy, dec!(120), dec!(1)))
            .unwrap();

        assert_eq!(result.executed_qty, dec!(1));
        assert_eq!(result.fills.len(), 1);
        assert_eq!(result.fills[0].price, dec!(100));
        assert_eq!(result.fills[0].maker_order_id, "s1");
        assert_eq!(book.current_price, dec!(100));
        assert!(book.bids.is_empty());
        assert!(book.asks.is_empty());
    }

    #[test]
    fn test_partial_fill_leaves_residual_maker() {
        let mut book = book();
        book.add(order("s1", "B", Side::Sell, dec!(100), dec!(5))).unwrap();

        let result = book
            .add(order("b1", "A", Side::Buy, dec!(100), dec!(3)))
            .unwrap();

        assert_eq!(result.executed_qty, dec!(3));
        assert_eq!(result.fills[0].qty, dec!(3));
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.asks[0].remaining(), dec!(2));
        assert!(book.bids.is_empty());
    }

    #[test]
    fn test_unmatched_residual_rests_on_taker_side() {
        let mut book = book();
        book.add(order("s1", "B", Side::Sell, dec!(100), dec!(2))).unwrap();

        let result = book
            .add(order("b1", "A", Side::Buy, dec!(100), dec!(5)))
            .unwrap();

        assert_eq!(result.executed_qty, dec!(2));
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.bids[0].quantity, dec!(3));
        assert_eq!(book.bids[0].filled, Decimal::ZERO);
        assert!(book.asks.is_empty());
    }

    #[test]
    fn test_price_time_priority() {
        let mut book = book();
        book.add(order("s1", "C", Side::Sell, dec!(100), dec!(5))).unwrap();
        book.add(order("s2", "D", Side::Sell, dec!(100), dec!(5))).unwrap();

        let result = book
            .add(order("b1", "A", Side::Buy, dec!(100), dec!(7)))
            .unwrap();

        assert_eq!(result.fills.len(), 2);
        assert_eq!(result.fills[0].maker_user_id, "C");
        assert_eq!(result.fills[0].qty, dec!(5));
        assert_eq!(result.fills[1].maker_user_id, "D");
        assert_eq!(result.fills[1].qty, dec!(2));
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.asks[0].order_id, "s2");
        assert_eq!(book.asks[0].remaining(), dec!(3));
    }

    #[test]
    fn test_best_price_first_across_levels() {
        let mut book = book();
        book.add(order("s1", "B", Side::Sell, dec!(101), dec!(1))).unwrap();
        book.add(order("s2", "B", Side::Sell, dec!(100), dec!(1))).unwrap();

        let result = book
            .add(order("b1", "A", Side::Buy, dec!(101), dec!(2)))
            .unwrap();

        assert_eq!(result.fills[0].price, dec!(100));
        assert_eq!(result.fills[1].price, dec!(101));
    }

    #[test]
    fn test_trade_ids_strictly_increase() {
        let mut book = book();
        book.add(order("s1", "B", Side::Sell, dec!(100), dec!(1))).unwrap();
        book.add(order("s2", "B", Side::Sell, dec!(101), dec!(1))).unwrap();

        let result = book
            .add(order("b1", "A", Side::Buy, dec!(101), dec!(2)))
            .unwrap();

        assert_eq!(result.fills[0].trade_id, 1);
        assert_eq!(result.fills[1].trade_id, 2);
        assert_eq!(book.last_trade_id, 2);
    }

    #[test]
    fn test_no_cross_after_matching() {
        let mut book = book();
        book.add(order("b1", "A", Side::Buy, dec!(99), dec!(1))).unwrap();
        book.add(order("s1", "B", Side::Sell, dec!(101), dec!(1))).unwrap();
        book.add(order("b2", "A", Side::Buy, dec!(100), dec!(1))).unwrap();
        book.add(order("s2", "B", Side::Sell, dec!(100), dec!(3))).unwrap();

        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            assert!(bid < ask);
        }
    }

    #[test]
    fn test_depth_aggregates_levels() {
        let mut book = book();
        book.add(order("b1", "A", Side::Buy, dec!(100), dec!(2))).unwrap();
        book.add(order("b2", "B", Side::Buy, dec!(100), dec!(3))).unwrap();
        book.add(order("b3", "A", Side::Buy, dec!(99), dec!(1))).unwrap();

        let depth = book.depth(20, 2);
        assert_eq!(
            depth.bids,
            vec![
                ["100.00".to_string(), "5.00".to_string()],
                ["99.00".to_string(), "1.00".to_string()],
            ]
        );
        assert!(depth.asks.is_empty());
    }

    #[test]
    fn test_depth_counts_only_unfilled_and_truncates() {
        let mut book = book();
        book.add(order("s1", "B", Side::Sell, dec!(100), dec!(5))).unwrap();
        book.add(order("b1", "A", Side::Buy, dec!(100), dec!(3))).unwrap();
        for i in 0..25 {
            let price = dec!(101) + Decimal::from(i);
            book.add(order(&format!("s{}", i + 2), "B", Side::Sell, price, dec!(1)))
                .unwrap();
        }

        let depth = book.depth(20, 2);
        assert_eq!(depth.asks.len(), 20);
        assert_eq!(depth.asks[0], ["100.00".to_string(), "2.00".to_string()]);
    }

    #[test]
    fn test_cancel_removes_order() {
        let mut book = book();
        book.add(order("b1", "A", Side::Buy, dec!(100), dec!(2))).unwrap();

        let cancelled = book.cancel("b1").expect("order should be resting");
        assert_eq!(cancelled.price, dec!(100));
        assert!(book.bids.is_empty());
        assert!(book.cancel("b1").is_none());
    }

    #[test]
    fn test_open_orders_filters_by_user() {
        let mut book = book();
        book.add(order("b1", "A", Side::Buy, dec!(99), dec!(1))).unwrap();
        book.add(order("s1", "A", Side::Sell, dec!(101), dec!(1))).unwrap();
        book.add(order("s2", "B", Side::Sell, dec!(102), dec!(1))).unwrap();

        let orders = book.open_orders("A");
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|o| o.user_id == "A"));
    }

    #[test]
    fn test_validation_rejects_bad_orders() {
        let mut book = book();
        assert!(book.add(order("o", "A", Side::Buy, dec!(0), dec!(1))).is_err());
        assert!(book.add(order("o", "A", Side::Buy, dec!(-1), dec!(1))).is_err());
        assert!(book.add(order("o", "A", Side::Buy, dec!(100), dec!(0))).is_err());
        assert!(book.add(order("", "A", Side::Buy, dec!(100), dec!(1))).is_err());
        assert!(book.add(order("o", "", Side::Buy, dec!(100), dec!(1))).is_err());
        assert!(book.bids.is_empty() && book.asks.is_empty());
    }

    #[test]
    fn test_fractional_quantities_match_exactly() {
        let mut book = book();
        book.add(order("s1", "B", Side::Sell, dec!(100), dec!(0.75))).unwrap();

        let result = book
            .add(order("b1", "A", Side::Buy, dec!(100), dec!(0.5)))
            .unwrap();

        assert_eq!(result.executed_qty, dec!(0.5));
        assert_eq!(book.asks[0].remaining(), dec!(0.25));
    }

    #[test]
    fn test_spread_and_stats() {
        let mut book = book();
        book.add(order("b1", "A", Side::Buy, dec!(99), dec!(1))).unwrap();
        book.add(order("s1", "B", Side::Sell, dec!(101), dec!(1))).unwrap();

        assert_eq!(book.spread(), Some(dec!(2)));
        let stats = book.stats();
        assert_eq!(stats.best_bid, Some(dec!(99)));
        assert_eq!(stats.best_ask, Some(dec!(101)));
        assert_eq!(stats.open_bids, 1);
        assert_eq!(stats.open_asks, 1);
    }
}
