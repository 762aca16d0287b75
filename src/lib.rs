//! Spot exchange backend.
//!
//! Four processes share this library: the HTTP gateway, the matching
//! engine, the trade persistence worker, and the realtime stream server.
//! They communicate only through Redis (list work queues + pub/sub).

pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod metrics;
pub mod models;
pub mod persistence;
pub mod ws;

/// System-wide quote currency. Every market is `{base}_{quote}` with this
/// as the quote leg.
pub const QUOTE_CURRENCY: &str = "USD";
