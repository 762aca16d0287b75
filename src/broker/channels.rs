//! Queue keys and channel-name conventions.

/// List queue the gateway pushes command envelopes onto.
pub const WORK_QUEUE: &str = "messages";

/// List queue the engine pushes trade records onto for persistence.
pub const TRADE_QUEUE: &str = "db_processor";

/// Market-data channel carrying depth snapshots and deltas.
pub fn depth_channel(market: &str) -> String {
    format!("depth@{market}")
}

/// Market-data channel carrying trade prints.
pub fn trade_channel(market: &str) -> String {
    format!("trade@{market}")
}

/// Private per-session channel a stream client is auto-subscribed to.
pub fn private_trades_channel(session_id: &str) -> String {
    format!("trades:{session_id}")
}

/// Per-request reply channel name: short, unique, cheap to generate.
/// The first UUID segment gives 32 bits of entropy, plenty for the
/// lifetime of an in-flight request.
pub fn reply_channel_id() -> String {
    let full = uuid::Uuid::new_v4().to_string();
    full.split('-').next().unwrap_or(&full).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        assert_eq!(depth_channel("SOL_USD"), "depth@SOL_USD");
        assert_eq!(trade_channel("SOL_USD"), "trade@SOL_USD");
        assert_eq!(private_trades_channel("a1b2c3d4"), "trades:a1b2c3d4");
    }

    #[test]
    fn test_reply_channel_id() {
        let id = reply_channel_id();
        assert_eq!(id.len(), 8);
        assert_ne!(id, reply_channel_id());
    }
}
