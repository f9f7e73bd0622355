//! Exchange trade fills.
//!
//! A fill is an atomic execution report returned by the exchange for a
//! specific order. Fills are immutable once recorded; the journal keeps
//! the raw per-fill records on the deal so aggregates can always be
//! re-derived.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single execution report from the exchange.
///
/// `id` is the exchange-assigned trade id, unique per symbol. The same
/// fill id appears in a deal's fill set at most once regardless of how
/// many import calls are made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFill {
    /// Exchange-assigned trade id (unique per symbol)
    pub id: i64,
    /// Exchange order id this fill belongs to
    pub order_id: i64,
    /// Execution price
    pub price: Decimal,
    /// Executed base quantity
    pub qty: Decimal,
    /// Executed quote quantity
    pub quote_qty: Decimal,
    /// Commission charged
    pub commission: Decimal,
    /// Asset the commission was charged in (e.g., "USDT", "BNB")
    pub commission_asset: String,
    /// Execution time
    pub time: DateTime<Utc>,
    /// Whether the account was the buyer
    pub is_buyer: bool,
    /// Whether the account was the maker
    pub is_maker: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fill_round_trips_as_json() {
        let fill = TradeFill {
            id: 28457,
            order_id: 100234,
            price: dec!(4.00000100),
            qty: dec!(12.00000000),
            quote_qty: dec!(48.000012),
            commission: dec!(10.10000000),
            commission_asset: "BNB".to_string(),
            time: Utc::now(),
            is_buyer: true,
            is_maker: false,
        };

        let json = serde_json::to_string(&fill).unwrap();
        // Decimals travel as strings, never floats
        assert!(json.contains("\"4.00000100\""));
        let parsed: TradeFill = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, fill);
    }
}
