pub mod balance;
pub mod order;

pub use balance::UserBalance;
pub use order::{Fill, Order, Side};

use rust_decimal::Decimal;

use crate::error::ExchangeError;

/// Split a `{base}_{quote}` ticker into its legs.
pub fn split_market(market: &str) -> Result<(&str, &str), ExchangeError> {
    match market.split_once('_') {
        Some((base, quote)) if !base.is_empty() && !quote.is_empty() => Ok((base, quote)),
        _ => Err(ExchangeError::UnknownMarket(market.to_string())),
    }
}

/// Fixed-scale decimal formatting for wire payloads ("100.00", "5.00").
pub fn fmt_scaled(value: Decimal, scale: u32) -> String {
    format!("{:.*}", scale as usize, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_split_market() {
        assert_eq!(split_market("SOL_USD").unwrap(), ("SOL", "USD"));
        assert!(split_market("SOLUSD").is_err());
        assert!(split_market("_USD").is_err());
    }

    #[test]
    fn test_fmt_scaled() {
        assert_eq!(fmt_scaled(dec!(100), 2), "100.00");
        assert_eq!(fmt_scaled(dec!(99.5), 2), "99.50");
        assert_eq!(fmt_scaled(dec!(1.234), 2), "1.23");
    }
}
