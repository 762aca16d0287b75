//! Matching engine.
//!
//! [`Engine`] owns all order books and balances and is mutated by exactly
//! one consumer of the work queue. Command handlers are pure with respect
//! to the broker: each returns the reply plus the publications it wants
//! made, and the runtime performs the IO. A handler either applies all of
//! its state changes or none; failures map to the command's safe,
//! zero-valued reply shape.

pub mod orderbook;
pub mod runtime;
pub mod snapshot;

pub use orderbook::{BookStats, MatchResult, Orderbook};
pub use runtime::EngineService;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::broker::channels;
use crate::error::ExchangeError;
use crate::messages::{
    CancelOrderData, Command, CreateOrderData, DbMessage, DepthPayload, EngineReply, GetDepthData,
    GetOpenOrdersData, OnRampData, StreamFrame, TradeEvent, TradeRow,
};
use crate::models::order::generate_order_id;
use crate::models::{split_market, Fill, Order, Side, UserBalance};
use crate::QUOTE_CURRENCY;

const DEPTH_LIMIT: usize = 20;

fn default_scale() -> u32 {
    2
}

/// A publication the runtime must perform after a command settles.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Push onto the trade persistence queue.
    Trade(DbMessage),
    /// Publish on a market-data channel.
    Market { channel: String, frame: StreamFrame },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    pub orderbooks: HashMap<String, Orderbook>,
    pub balances: HashMap<String, HashMap<String, UserBalance>>,
    #[serde(default = "default_scale")]
    scale: u32,
}

impl Engine {
    pub fn new(markets: &[String], scale: u32) -> Result<Self, ExchangeError> {
        let mut orderbooks = HashMap::new();
        for market in markets {
            let (base, quote) = split_market(market)?;
            let book = Orderbook::new(base, quote);
            orderbooks.insert(book.ticker(), book);
        }
        Ok(Self {
            orderbooks,
            balances: HashMap::new(),
            scale,
        })
    }

    pub fn set_scale(&mut self, scale: u32) {
        self.scale = scale;
    }

    /// Credit development users with a large starting balance in the
    /// quote asset and every base asset.
    pub fn seed_balances(&mut self, users: &[String], amount: Decimal) {
        let bases: Vec<String> = self
            .orderbooks
            .values()
            .map(|b| b.base_asset.clone())
            .collect();
        for user in users {
            let entry = Self::balance_entry(&mut self.balances, user, QUOTE_CURRENCY);
            entry.available += amount;
            for base in &bases {
                let entry = Self::balance_entry(&mut self.balances, user, base);
                entry.available += amount;
            }
            info!(%user, "seeded development balances");
        }
    }

    /// Apply one command, returning the reply and the publications to
    /// perform. Never panics on bad input; failures produce the safe
    /// reply shape for the command.
    pub fn apply(&mut self, command: Command) -> (EngineReply, Vec<Outbound>) {
        match command {
            Command::CreateOrder(data) => self.create_order(&data).unwrap_or_else(|e| {
                warn!(market = %data.market, user = %data.user_id, error = %e, "order rejected");
                (EngineReply::order_rejected(), Vec::new())
            }),
            Command::CancelOrder(data) => self.cancel_order(&data).unwrap_or_else(|e| {
                warn!(order_id = %data.order_id, market = %data.market, error = %e, "cancel failed");
                (
                    EngineReply::OrderCancelled {
                        order_id: data.order_id.clone(),
                        executed_qty: Decimal::ZERO,
                        remaining_qty: Decimal::ZERO,
                    },
                    Vec::new(),
                )
            }),
            Command::GetOpenOrders(data) => self.get_open_orders(&data).unwrap_or_else(|e| {
                warn!(market = %data.market, error = %e, "open orders lookup failed");
                (EngineReply::OpenOrders { orders: Vec::new() }, Vec::new())
            }),
            Command::OnRamp(data) => self.on_ramp(&data).unwrap_or_else(|e| {
                warn!(user = %data.user_id, error = %e, "on-ramp rejected");
                let balance = self
                    .balances
                    .get(&data.user_id)
                    .and_then(|assets| assets.get(QUOTE_CURRENCY))
                    .map(|b| b.available)
                    .unwrap_or_default();
                (
                    EngineReply::OnRamp {
                        user_id: data.user_id.clone(),
                        balance,
                    },
                    Vec::new(),
                )
            }),
            Command::GetDepth(data) => self.get_depth(&data).unwrap_or_else(|e| {
                warn!(market = %data.market, error = %e, "depth lookup failed");
                (EngineReply::Depth(DepthPayload::default()), Vec::new())
            }),
        }
    }

    fn create_order(
        &mut self,
        data: &CreateOrderData,
    ) -> Result<(EngineReply, Vec<Outbound>), ExchangeError> {
        if !self.orderbooks.contains_key(&data.market) {
            return Err(ExchangeError::UnknownMarket(data.market.clone()));
        }
        let (base, quote) = split_market(&data.market)?;
        let (base, quote) = (base.to_string(), quote.to_string());

        let order = Order {
            price: data.price,
            quantity: data.quantity,
            order_id: generate_order_id(),
            filled: Decimal::ZERO,
            side: data.side,
            user_id: data.user_id.clone(),
        };

        // Validate before touching any balance so a rejection leaves no
        // trace.
        self.orderbooks[&data.market].validate(&order)?;
        self.lock_funds(&data.user_id, &base, &quote, data.side, data.price, data.quantity)?;

        let book = self
            .orderbooks
            .get_mut(&data.market)
            .expect("market checked above");
        let result = match book.add(order.clone()) {
            Ok(result) => result,
            Err(e) => {
                // Validated above, so this is unreachable in practice;
                // release the lock to keep the no-half-mutation rule.
                self.unlock_funds(&data.user_id, &base, &quote, data.side, data.price, data.quantity);
                return Err(e);
            }
        };

        self.settle_fills(&data.user_id, &base, &quote, data.side, data.price, &result.fills);

        let mut outbound = self.trade_publications(&data.market, data.side, &result.fills);
        outbound.push(self.depth_snapshot_publication(&data.market));

        info!(
            market = %data.market,
            order_id = %order.order_id,
            side = %data.side,
            executed = %result.executed_qty,
            fills = result.fills.len(),
            "order placed"
        );

        Ok((
            EngineReply::OrderPlaced {
                order_id: order.order_id,
                executed_qty: result.executed_qty,
                fills: result.fills,
            },
            outbound,
        ))
    }

    fn cancel_order(
        &mut self,
        data: &CancelOrderData,
    ) -> Result<(EngineReply, Vec<Outbound>), ExchangeError> {
        let (base, quote) = split_market(&data.market)?;
        let (base, quote) = (base.to_string(), quote.to_string());
        let book = self
            .orderbooks
            .get_mut(&data.market)
            .ok_or_else(|| ExchangeError::UnknownMarket(data.market.clone()))?;

        let order = book
            .cancel(&data.order_id)
            .ok_or_else(|| ExchangeError::OrderNotFound(data.order_id.clone()))?;

        let remaining = order.remaining();
        match order.side {
            Side::Buy => {
                let entry = Self::balance_entry(&mut self.balances, &order.user_id, &quote);
                entry.unlock(remaining * order.price);
            }
            Side::Sell => {
                let entry = Self::balance_entry(&mut self.balances, &order.user_id, &base);
                entry.unlock(remaining);
            }
        }

        let outbound = vec![self.depth_delta_publication(&data.market, order.price)];

        info!(
            market = %data.market,
            order_id = %order.order_id,
            remaining = %remaining,
            "order cancelled"
        );

        Ok((
            EngineReply::OrderCancelled {
                order_id: order.order_id,
                executed_qty: order.filled,
                remaining_qty: remaining,
            },
            outbound,
        ))
    }

    fn get_open_orders(
        &self,
        data: &GetOpenOrdersData,
    ) -> Result<(EngineReply, Vec<Outbound>), ExchangeError> {
        let book = self
            .orderbooks
            .get(&data.market)
            .ok_or_else(|| ExchangeError::UnknownMarket(data.market.clone()))?;
        Ok((
            EngineReply::OpenOrders {
                orders: book.open_orders(&data.user_id),
            },
            Vec::new(),
        ))
    }

    fn on_ramp(&mut self, data: &OnRampData) -> Result<(EngineReply, Vec<Outbound>), ExchangeError> {
        if data.user_id.is_empty() {
            return Err(ExchangeError::InvalidOrder("user id cannot be empty".into()));
        }
        if data.amount <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(format!(
                "on-ramp amount must be positive, got {}",
                data.amount
            )));
        }

        let entry = Self::balance_entry(&mut self.balances, &data.user_id, QUOTE_CURRENCY);
        entry.available += data.amount;
        let balance = entry.available;

        info!(user = %data.user_id, amount = %data.amount, txn = %data.txn_id, "on-ramp credited");

        Ok((
            EngineReply::OnRamp {
                user_id: data.user_id.clone(),
                balance,
            },
            Vec::new(),
        ))
    }

    fn get_depth(&self, data: &GetDepthData) -> Result<(EngineReply, Vec<Outbound>), ExchangeError> {
        let book = self
            .orderbooks
            .get(&data.market)
            .ok_or_else(|| ExchangeError::UnknownMarket(data.market.clone()))?;
        Ok((
            EngineReply::Depth(book.depth(DEPTH_LIMIT, self.scale)),
            Vec::new(),
        ))
    }

    // ========================================================================
    // Balance movement
    // ========================================================================

    fn balance_entry<'a>(
        balances: &'a mut HashMap<String, HashMap<String, UserBalance>>,
        user_id: &str,
        asset: &str,
    ) -> &'a mut UserBalance {
        balances
            .entry(user_id.to_string())
            .or_default()
            .entry(asset.to_string())
            .or_default()
    }

    /// Reserve the funds an order could consume: `qty x price` of quote
    /// for a buy, `qty` of base for a sell.
    fn lock_funds(
        &mut self,
        user_id: &str,
        base: &str,
        quote: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<(), ExchangeError> {
        match side {
            Side::Buy => {
                let cost = quantity * price;
                let entry = Self::balance_entry(&mut self.balances, user_id, quote);
                if !entry.lock(cost) {
                    return Err(ExchangeError::InsufficientFunds {
                        user: user_id.to_string(),
                        asset: quote.to_string(),
                    });
                }
            }
            Side::Sell => {
                let entry = Self::balance_entry(&mut self.balances, user_id, base);
                if !entry.lock(quantity) {
                    return Err(ExchangeError::InsufficientFunds {
                        user: user_id.to_string(),
                        asset: base.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn unlock_funds(
        &mut self,
        user_id: &str,
        base: &str,
        quote: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) {
        match side {
            Side::Buy => {
                Self::balance_entry(&mut self.balances, user_id, quote).unlock(quantity * price);
            }
            Side::Sell => {
                Self::balance_entry(&mut self.balances, user_id, base).unlock(quantity);
            }
        }
    }

    /// Move value for each fill. The taker's reservation was made at the
    /// taker's limit price; the trade executes at the maker's price, so a
    /// buying taker gets the price improvement back into available.
    fn settle_fills(
        &mut self,
        taker_id: &str,
        base: &str,
        quote: &str,
        taker_side: Side,
        taker_price: Decimal,
        fills: &[Fill],
    ) {
        for fill in fills {
            let paid = fill.qty * fill.price;
            match taker_side {
                Side::Buy => {
                    let reserved = fill.qty * taker_price;
                    let taker_quote = Self::balance_entry(&mut self.balances, taker_id, quote);
                    taker_quote.locked -= reserved;
                    taker_quote.available += reserved - paid;
                    Self::balance_entry(&mut self.balances, taker_id, base).available += fill.qty;

                    Self::balance_entry(&mut self.balances, &fill.maker_user_id, quote).available +=
                        paid;
                    Self::balance_entry(&mut self.balances, &fill.maker_user_id, base).locked -=
                        fill.qty;
                }
                Side::Sell => {
                    Self::balance_entry(&mut self.balances, taker_id, base).locked -= fill.qty;
                    Self::balance_entry(&mut self.balances, taker_id, quote).available += paid;

                    // The maker's buy reservation was made at the maker's
                    // own price, which is the trade price.
                    Self::balance_entry(&mut self.balances, &fill.maker_user_id, quote).locked -=
                        paid;
                    Self::balance_entry(&mut self.balances, &fill.maker_user_id, base).available +=
                        fill.qty;
                }
            }
        }
    }

    // ========================================================================
    // Publications
    // ========================================================================

    fn trade_publications(&self, market: &str, taker_side: Side, fills: &[Fill]) -> Vec<Outbound> {
        let timestamp = chrono::Utc::now().timestamp();
        // The maker rests on the opposite side of the taker.
        let is_buyer_maker = taker_side == Side::Sell;
        let channel = channels::trade_channel(market);

        let mut outbound = Vec::with_capacity(fills.len() * 2);
        for fill in fills {
            outbound.push(Outbound::Trade(DbMessage::TradeAdded(TradeRow {
                id: fill.trade_id.to_string(),
                market: market.to_string(),
                price: fill.price,
                quantity: fill.qty,
                quote_quantity: fill.qty * fill.price,
                is_buyer_maker,
                timestamp,
            })));
            outbound.push(Outbound::Market {
                channel: channel.clone(),
                frame: StreamFrame::trade(
                    channel.clone(),
                    TradeEvent {
                        event: "trade".to_string(),
                        market: market.to_string(),
                        id: fill.trade_id.to_string(),
                        is_buyer_maker,
                        price: fill.price,
                        quantity: fill.qty,
                        timestamp,
                    },
                ),
            });
        }
        outbound
    }

    fn depth_snapshot_publication(&self, market: &str) -> Outbound {
        let depth = self.orderbooks[market].depth(DEPTH_LIMIT, self.scale);
        let channel = channels::depth_channel(market);
        Outbound::Market {
            channel: channel.clone(),
            frame: StreamFrame::depth(channel, depth.bids, depth.asks),
        }
    }

    /// Depth delta scoped to one price: only the levels still resting at
    /// that price, empty when the level vanished.
    fn depth_delta_publication(&self, market: &str, price: Decimal) -> Outbound {
        let depth = self.orderbooks[market].depth(DEPTH_LIMIT, self.scale);
        let price_str = crate::models::fmt_scaled(price, self.scale);
        let bids = depth
            .bids
            .into_iter()
            .filter(|level| level[0] == price_str)
            .collect();
        let asks = depth
            .asks
            .into_iter()
            .filter(|level| level[0] == price_str)
            .collect();
        let channel = channels::depth_channel(market);
        Outbound::Market {
            channel: channel.clone(),
            frame: StreamFrame::depth(channel, bids, asks),
        }
    }

    // ========================================================================
    // Derived views
    // ========================================================================

    pub fn book_stats(&self, market: &str) -> Option<BookStats> {
        self.orderbooks.get(market).map(Orderbook::stats)
    }

    /// Total circulating supply of an asset across all users. Constant
    /// under matching and cancellation; only on-ramp changes it.
    pub fn total_supply(&self, asset: &str) -> Decimal {
        self.balances
            .values()
            .filter_map(|assets| assets.get(asset))
            .map(UserBalance::total)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn engine() -> Engine {
        Engine::new(&["SOL_USD".to_string()], 2).unwrap()
    }

    fn on_ramp(engine: &mut Engine, user: &str, amount: Decimal) {
        let (reply, _) = engine.apply(Command::OnRamp(OnRampData {
            user_id: user.to_string(),
            amount,
            txn_id: "txn-1".to_string(),
        }));
        assert!(matches!(reply, EngineReply::OnRamp { .. }));
    }

    fn credit_base(engine: &mut Engine, user: &str, asset: &str, amount: Decimal) {
        Engine::balance_entry(&mut engine.balances, user, asset).available += amount;
    }

    fn create(
        engine: &mut Engine,
        user: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> (EngineReply, Vec<Outbound>) {
        engine.apply(Command::CreateOrder(CreateOrderData {
            market: "SOL_USD".to_string(),
            price,
            quantity,
            side,
            user_id: user.to_string(),
        }))
    }

    fn balance(engine: &Engine, user: &str, asset: &str) -> UserBalance {
        engine
            .balances
            .get(user)
            .and_then(|assets| assets.get(asset))
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn test_cross_at_maker_price_with_refund() {
        let mut engine = engine();
        on_ramp(&mut engine, "A", dec!(1000));
        credit_base(&mut engine, "B", "SOL", dec!(10));

        let (reply, _) = create(&mut engine, "B", Side::Sell, dec!(100), dec!(1));
        assert!(matches!(reply, EngineReply::OrderPlaced { .. }));

        let (reply, _) = create(&mut engine, "A", Side::Buy, dec!(120), dec!(1));
        match reply {
            EngineReply::OrderPlaced {
                executed_qty, fills, ..
            } => {
                assert_eq!(executed_qty, dec!(1));
                assert_eq!(fills.len(), 1);
                assert_eq!(fills[0].price, dec!(100));
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        // Taker paid the maker price; the reservation at 120 was fully
        // released, so the 20 of price improvement is available again.
        let a_usd = balance(&engine, "A", "USD");
        assert_eq!(a_usd.available, dec!(900));
        assert_eq!(a_usd.locked, Decimal::ZERO);
        assert_eq!(balance(&engine, "A", "SOL").available, dec!(1));

        let b_usd = balance(&engine, "B", "USD");
        assert_eq!(b_usd.available, dec!(100));
        let b_sol = balance(&engine, "B", "SOL");
        assert_eq!(b_sol.available, dec!(9));
        assert_eq!(b_sol.locked, Decimal::ZERO);
    }

    #[test]
    fn test_partial_fill_then_rest() {
        let mut engine = engine();
        on_ramp(&mut engine, "A", dec!(1000));
        credit_base(&mut engine, "B", "SOL", dec!(10));

        create(&mut engine, "B", Side::Sell, dec!(100), dec!(5));
        let (reply, _) = create(&mut engine, "A", Side::Buy, dec!(100), dec!(3));

        match reply {
            EngineReply::OrderPlaced {
                executed_qty, fills, ..
            } => {
                assert_eq!(executed_qty, dec!(3));
                assert_eq!(fills[0].qty, dec!(3));
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let book = &engine.orderbooks["SOL_USD"];
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.asks[0].remaining(), dec!(2));

        assert_eq!(balance(&engine, "A", "SOL").available, dec!(3));
        assert_eq!(balance(&engine, "B", "SOL").locked, dec!(2));
        assert_eq!(balance(&engine, "B", "USD").available, dec!(300));
    }

    #[test]
    fn test_insufficient_funds_rejected_before_book() {
        let mut engine = engine();
        on_ramp(&mut engine, "A", dec!(50));

        let (reply, outbound) = create(&mut engine, "A", Side::Buy, dec!(100), dec!(1));
        match reply {
            EngineReply::OrderCancelled {
                executed_qty,
                remaining_qty,
                ..
            } => {
                assert_eq!(executed_qty, Decimal::ZERO);
                assert_eq!(remaining_qty, Decimal::ZERO);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert!(outbound.is_empty());
        assert!(engine.orderbooks["SOL_USD"].bids.is_empty());

        let a_usd = balance(&engine, "A", "USD");
        assert_eq!(a_usd.available, dec!(50));
        assert_eq!(a_usd.locked, Decimal::ZERO);
    }

    #[test]
    fn test_cancel_unlocks_funds() {
        let mut engine = engine();
        on_ramp(&mut engine, "A", dec!(1000));

        let (reply, _) = create(&mut engine, "A", Side::Buy, dec!(100), dec!(1));
        let order_id = match reply {
            EngineReply::OrderPlaced { order_id, .. } => order_id,
            other => panic!("unexpected reply: {other:?}"),
        };
        assert_eq!(balance(&engine, "A", "USD").locked, dec!(100));

        let (reply, outbound) = engine.apply(Command::CancelOrder(CancelOrderData {
            order_id: order_id.clone(),
            market: "SOL_USD".to_string(),
        }));
        match reply {
            EngineReply::OrderCancelled {
                order_id: cancelled,
                remaining_qty,
                ..
            } => {
                assert_eq!(cancelled, order_id);
                assert_eq!(remaining_qty, dec!(1));
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let a_usd = balance(&engine, "A", "USD");
        assert_eq!(a_usd.available, dec!(1000));
        assert_eq!(a_usd.locked, Decimal::ZERO);
        assert!(engine.orderbooks["SOL_USD"].bids.is_empty());
        assert_eq!(outbound.len(), 1);
    }

    #[test]
    fn test_cancel_unknown_order_acknowledges_with_zeros() {
        let mut engine = engine();
        let (reply, outbound) = engine.apply(Command::CancelOrder(CancelOrderData {
            order_id: "missing".to_string(),
            market: "SOL_USD".to_string(),
        }));
        match reply {
            EngineReply::OrderCancelled {
                executed_qty,
                remaining_qty,
                ..
            } => {
                assert_eq!(executed_qty, Decimal::ZERO);
                assert_eq!(remaining_qty, Decimal::ZERO);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert!(outbound.is_empty());
    }

    #[test]
    fn test_unknown_market_rejected() {
        let mut engine = engine();
        on_ramp(&mut engine, "A", dec!(1000));
        let (reply, _) = engine.apply(Command::CreateOrder(CreateOrderData {
            market: "BTC_USD".to_string(),
            price: dec!(100),
            quantity: dec!(1),
            side: Side::Buy,
            user_id: "A".to_string(),
        }));
        assert!(matches!(reply, EngineReply::OrderCancelled { .. }));
        assert_eq!(balance(&engine, "A", "USD").available, dec!(1000));
    }

    #[test]
    fn test_supply_conservation_across_trading() {
        let mut engine = engine();
        on_ramp(&mut engine, "A", dec!(1000));
        on_ramp(&mut engine, "B", dec!(500));
        credit_base(&mut engine, "B", "SOL", dec!(10));

        let usd_before = engine.total_supply("USD");
        let sol_before = engine.total_supply("SOL");

        create(&mut engine, "B", Side::Sell, dec!(100), dec!(4));
        create(&mut engine, "A", Side::Buy, dec!(110), dec!(2));
        let (reply, _) = create(&mut engine, "A", Side::Buy, dec!(90), dec!(1));
        let resting = match reply {
            EngineReply::OrderPlaced { order_id, .. } => order_id,
            other => panic!("unexpected reply: {other:?}"),
        };
        engine.apply(Command::CancelOrder(CancelOrderData {
            order_id: resting,
            market: "SOL_USD".to_string(),
        }));

        assert_eq!(engine.total_supply("USD"), usd_before);
        assert_eq!(engine.total_supply("SOL"), sol_before);
    }

    #[test]
    fn test_on_ramp_changes_supply_by_exact_amount() {
        let mut engine = engine();
        let before = engine.total_supply("USD");
        on_ramp(&mut engine, "A", dec!(250));
        assert_eq!(engine.total_supply("USD"), before + dec!(250));
    }

    #[test]
    fn test_self_trade_is_a_wash() {
        let mut engine = engine();
        on_ramp(&mut engine, "A", dec!(1000));
        credit_base(&mut engine, "A", "SOL", dec!(10));

        create(&mut engine, "A", Side::Sell, dec!(100), dec!(1));
        let (reply, _) = create(&mut engine, "A", Side::Buy, dec!(100), dec!(1));
        match reply {
            EngineReply::OrderPlaced { executed_qty, .. } => assert_eq!(executed_qty, dec!(1)),
            other => panic!("unexpected reply: {other:?}"),
        }

        let usd = balance(&engine, "A", "USD");
        let sol = balance(&engine, "A", "SOL");
        assert_eq!(usd.available, dec!(1000));
        assert_eq!(usd.locked, Decimal::ZERO);
        assert_eq!(sol.available, dec!(10));
        assert_eq!(sol.locked, Decimal::ZERO);
    }

    #[test]
    fn test_locked_funds_cover_open_orders() {
        let mut engine = engine();
        on_ramp(&mut engine, "A", dec!(1000));
        credit_base(&mut engine, "A", "SOL", dec!(10));

        create(&mut engine, "A", Side::Buy, dec!(90), dec!(3));
        create(&mut engine, "A", Side::Buy, dec!(80), dec!(2));
        create(&mut engine, "A", Side::Sell, dec!(120), dec!(4));

        let book = &engine.orderbooks["SOL_USD"];
        let quote_needed: Decimal = book
            .bids
            .iter()
            .filter(|o| o.user_id == "A")
            .map(|o| o.remaining() * o.price)
            .sum();
        let base_needed: Decimal = book
            .asks
            .iter()
            .filter(|o| o.user_id == "A")
            .map(Order::remaining)
            .sum();

        assert!(balance(&engine, "A", "USD").locked >= quote_needed);
        assert!(balance(&engine, "A", "SOL").locked >= base_needed);
    }

    #[test]
    fn test_create_order_publications() {
        let mut engine = engine();
        on_ramp(&mut engine, "A", dec!(1000));
        credit_base(&mut engine, "B", "SOL", dec!(10));

        create(&mut engine, "B", Side::Sell, dec!(100), dec!(1));
        let (_, outbound) = create(&mut engine, "A", Side::Buy, dec!(100), dec!(1));

        let trades: Vec<_> = outbound
            .iter()
            .filter(|o| matches!(o, Outbound::Trade(_)))
            .collect();
        assert_eq!(trades.len(), 1);

        let market_events: Vec<_> = outbound
            .iter()
            .filter_map(|o| match o {
                Outbound::Market { channel, .. } => Some(channel.as_str()),
                _ => None,
            })
            .collect();
        assert!(market_events.contains(&"trade@SOL_USD"));
        assert!(market_events.contains(&"depth@SOL_USD"));

        // Taker was the buyer, so the maker was the seller.
        if let Some(Outbound::Trade(DbMessage::TradeAdded(row))) = outbound
            .iter()
            .find(|o| matches!(o, Outbound::Trade(_)))
        {
            assert!(!row.is_buyer_maker);
            assert_eq!(row.quote_quantity, dec!(100));
        }
    }

    #[test]
    fn test_cancel_publishes_price_scoped_delta() {
        let mut engine = engine();
        on_ramp(&mut engine, "A", dec!(1000));

        create(&mut engine, "A", Side::Buy, dec!(100), dec!(2));
        let (reply, _) = create(&mut engine, "A", Side::Buy, dec!(100), dec!(3));
        let order_id = match reply {
            EngineReply::OrderPlaced { order_id, .. } => order_id,
            other => panic!("unexpected reply: {other:?}"),
        };

        let (_, outbound) = engine.apply(Command::CancelOrder(CancelOrderData {
            order_id,
            market: "SOL_USD".to_string(),
        }));
        match &outbound[0] {
            Outbound::Market { channel, frame } => {
                assert_eq!(channel, "depth@SOL_USD");
                let depth = frame.data.as_ref().unwrap();
                assert_eq!(depth.bids, vec![["100.00".to_string(), "2.00".to_string()]]);
            }
            other => panic!("unexpected outbound: {other:?}"),
        }
    }

    #[test]
    fn test_get_depth_and_open_orders_replies() {
        let mut engine = engine();
        on_ramp(&mut engine, "A", dec!(1000));
        create(&mut engine, "A", Side::Buy, dec!(100), dec!(2));

        let (reply, _) = engine.apply(Command::GetDepth(GetDepthData {
            market: "SOL_USD".to_string(),
        }));
        match reply {
            EngineReply::Depth(depth) => {
                assert_eq!(depth.bids, vec![["100.00".to_string(), "2.00".to_string()]]);
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let (reply, _) = engine.apply(Command::GetOpenOrders(GetOpenOrdersData {
            user_id: "A".to_string(),
            market: "SOL_USD".to_string(),
        }));
        match reply {
            EngineReply::OpenOrders { orders } => assert_eq!(orders.len(), 1),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_get_depth_unknown_market_safe_reply() {
        let mut engine = engine();
        let (reply, _) = engine.apply(Command::GetDepth(GetDepthData {
            market: "BTC_USD".to_string(),
        }));
        match reply {
            EngineReply::Depth(depth) => {
                assert!(depth.bids.is_empty());
                assert!(depth.asks.is_empty());
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_seed_balances() {
        let mut engine = engine();
        engine.seed_balances(&["1".to_string()], dec!(10000000));
        assert_eq!(balance(&engine, "1", "USD").available, dec!(10000000));
        assert_eq!(balance(&engine, "1", "SOL").available, dec!(10000000));
    }
}
