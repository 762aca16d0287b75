//! Time-series persistence.
//!
//! The worker drains the trade queue into a TimescaleDB hypertable; the
//! read side serves trade history, kline views, and the latest price.

pub mod trade_store;
pub mod worker;

pub use trade_store::{Kline, KlineInterval, TradeRecord, TradeStore};
