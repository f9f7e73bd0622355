//! The Deal aggregate.
//!
//! A deal is one tracked trading position: its entry legs, exit legs, the
//! raw exchange fills behind exchange-sourced legs, profit reinvestment
//! operations, and a set of derived aggregate fields.
//!
//! The derived fields (`entry_qty_total`, `realized_pnl`, ...) are a cache
//! of a pure function over the leg arrays. They are only ever written by
//! the ledger's recompute functions, never hand-edited.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fills::TradeFill;
use crate::value_objects::{DealStatus, Direction, DomainError, LegSource, Symbol};

/// Unique identifier for a Deal
pub type DealId = Uuid;

/// Unique identifier for a deal owner (journal account)
pub type OwnerId = Uuid;

// =============================================================================
// Legs
// =============================================================================

/// One entry event contributing quantity at a price to a deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryLeg {
    /// Base quantity entered
    pub qty: Decimal,
    /// Entry price
    pub price: Decimal,
    /// Quote spent (qty × price, or derived from fill aggregation)
    pub quote: Decimal,
    /// Fee paid, in quote currency terms (unset when fee assets are mixed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    /// Asset the fee was paid in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_asset: Option<String>,
    /// When the entry happened
    pub opened_at: DateTime<Utc>,
    /// Manual journal input or exchange fill aggregate
    pub source: LegSource,
    /// Exchange order id, for exchange-sourced legs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
}

impl EntryLeg {
    /// Build a manual entry leg, deriving `quote = qty × price`.
    ///
    /// # Errors
    /// Returns `DomainError` if qty or price is not strictly positive.
    pub fn manual(qty: Decimal, price: Decimal, opened_at: DateTime<Utc>) -> Result<Self, DomainError> {
        if qty <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(format!("entry qty must be positive, got {}", qty)));
        }
        if price <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice(format!("entry price must be positive, got {}", price)));
        }
        Ok(Self {
            qty,
            price,
            quote: qty * price,
            fee: None,
            fee_asset: None,
            opened_at,
            source: LegSource::Manual,
            order_id: None,
        })
    }
}

/// One exit event closing part (or all) of a deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitLeg {
    /// Base quantity exited
    pub qty: Decimal,
    /// Exit price
    pub price: Decimal,
    /// Quote received (qty × price, or derived from fill aggregation)
    pub quote: Decimal,
    /// Fee paid, in quote currency terms (unset when fee assets are mixed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    /// Asset the fee was paid in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_asset: Option<String>,
    /// When the exit happened
    pub closed_at: DateTime<Utc>,
    /// Manual journal input or exchange fill aggregate
    pub source: LegSource,
    /// Exchange order id, for exchange-sourced legs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
}

impl ExitLeg {
    /// Build a manual exit leg, deriving `quote = qty × price`.
    ///
    /// # Errors
    /// Returns `DomainError` if qty or price is not strictly positive, or
    /// if the fee is negative.
    pub fn manual(
        qty: Decimal,
        price: Decimal,
        fee: Option<Decimal>,
        closed_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if qty <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(format!("exit qty must be positive, got {}", qty)));
        }
        if price <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice(format!("exit price must be positive, got {}", price)));
        }
        if let Some(fee) = fee {
            if fee < Decimal::ZERO {
                return Err(DomainError::InvalidAmount(format!("exit fee must not be negative, got {}", fee)));
            }
        }
        Ok(Self {
            qty,
            price,
            quote: qty * price,
            fee,
            fee_asset: None,
            closed_at,
            source: LegSource::Manual,
            order_id: None,
        })
    }
}

// =============================================================================
// Profit reinvestment ops
// =============================================================================

/// Append-only record of one profit reinvestment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitOp {
    /// When the reinvestment happened
    pub at: DateTime<Utc>,
    /// Quote amount of realized profit converted back into the position
    pub amount: Decimal,
    /// Price used for the conversion
    pub price: Decimal,
    /// Base quantity added (amount / price)
    pub qty: Decimal,
    /// Free-form annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// =============================================================================
// Deal
// =============================================================================

/// A tracked trading position with entry/exit legs and derived accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    /// Deal identity
    pub id: DealId,
    /// Owning journal account
    pub owner_id: OwnerId,
    /// Trading pair
    pub symbol: Symbol,
    /// LONG or SHORT
    pub direction: Direction,
    /// OPEN or CLOSED (derived from legs, see ledger recompute)
    pub status: DealStatus,
    /// When the deal was opened
    pub opened_at: DateTime<Utc>,
    /// Max exit-leg timestamp, present only while CLOSED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Entry legs, oldest first
    #[serde(default)]
    pub entry_legs: Vec<EntryLeg>,
    /// Exit legs, oldest first
    #[serde(default)]
    pub exit_legs: Vec<ExitLeg>,
    /// Raw exchange fills backing the entry-phase exchange leg
    #[serde(default)]
    pub entry_fills: Vec<TradeFill>,
    /// Raw exchange fills backing the exit-phase exchange leg
    #[serde(default)]
    pub exit_fills: Vec<TradeFill>,
    /// Append-only reinvestment audit trail
    #[serde(default)]
    pub profit_ops: Vec<ProfitOp>,

    // Legacy single-leg document shape, from before multi-leg tracking.
    // Expanded into the leg arrays by `normalize` at load time.
    /// Legacy single entry leg
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<EntryLeg>,
    /// Legacy single exit leg
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<ExitLeg>,

    // Derived aggregates. Written only by the ledger recompute functions.
    /// Σ entry_legs.qty
    #[serde(default)]
    pub entry_qty_total: Decimal,
    /// Σ entry_legs.quote
    #[serde(default)]
    pub entry_quote_total: Decimal,
    /// entry_quote_total / entry_qty_total (0 when no entries)
    #[serde(default)]
    pub entry_avg_price: Decimal,
    /// Σ exit_legs.qty
    #[serde(default)]
    pub closed_qty: Decimal,
    /// entry_qty_total − closed_qty (never negative)
    #[serde(default)]
    pub remaining_qty: Decimal,
    /// Σ per-exit-leg PnL against the current average cost
    #[serde(default)]
    pub realized_pnl: Decimal,
    /// Σ profit_ops.amount
    #[serde(default)]
    pub profit_spent_total: Decimal,
    /// realized_pnl − profit_spent_total (never negative)
    #[serde(default)]
    pub realized_pnl_available: Decimal,

    /// Free-form annotation; reconciliation warnings are appended here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Deal {
    /// Create a new OPEN deal with one entry leg.
    ///
    /// Aggregates start zeroed; the ledger recomputes them immediately
    /// after construction.
    pub fn new(
        owner_id: OwnerId,
        symbol: Symbol,
        direction: Direction,
        opened_at: DateTime<Utc>,
        first_entry: EntryLeg,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner_id,
            symbol,
            direction,
            status: DealStatus::Open,
            opened_at,
            closed_at: None,
            entry_legs: vec![first_entry],
            exit_legs: Vec::new(),
            entry_fills: Vec::new(),
            exit_fills: Vec::new(),
            profit_ops: Vec::new(),
            entry: None,
            exit: None,
            entry_qty_total: Decimal::ZERO,
            entry_quote_total: Decimal::ZERO,
            entry_avg_price: Decimal::ZERO,
            closed_qty: Decimal::ZERO,
            remaining_qty: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            profit_spent_total: Decimal::ZERO,
            realized_pnl_available: Decimal::ZERO,
            note: None,
        }
    }

    /// Expand the legacy single-leg document shape into leg arrays.
    ///
    /// Deals stored before multi-leg tracking carry scalar `entry`/`exit`
    /// fields and empty arrays. Normalizing once at load time means no
    /// downstream operation has to branch on the document vintage.
    pub fn normalize(&mut self) {
        if self.entry_legs.is_empty() {
            if let Some(entry) = self.entry.take() {
                self.entry_legs.push(entry);
            }
        } else {
            self.entry = None;
        }
        if self.exit_legs.is_empty() {
            if let Some(exit) = self.exit.take() {
                self.exit_legs.push(exit);
            }
        } else {
            self.exit = None;
        }
    }

    /// Whether the deal is fully exited
    pub fn is_closed(&self) -> bool {
        self.status == DealStatus::Closed
    }

    /// Whether any exit leg exists
    pub fn has_exits(&self) -> bool {
        !self.exit_legs.is_empty()
    }

    /// Append a line to the deal note, creating it if absent.
    pub fn append_note(&mut self, line: &str) {
        match &mut self.note {
            Some(note) => {
                note.push('\n');
                note.push_str(line);
            },
            None => self.note = Some(line.to_string()),
        }
    }

    /// Reinvest amount validation helper: profit still available to spend.
    pub fn available_profit(&self) -> Decimal {
        self.realized_pnl - self.profit_spent_total
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btcusdt() -> Symbol {
        Symbol::from_pair("BTCUSDT").unwrap()
    }

    #[test]
    fn test_manual_entry_leg_derives_quote() {
        let leg = EntryLeg::manual(dec!(0.5), dec!(40000), Utc::now()).unwrap();
        assert_eq!(leg.quote, dec!(20000));
        assert_eq!(leg.source, LegSource::Manual);
        assert!(leg.order_id.is_none());
    }

    #[test]
    fn test_manual_leg_rejects_non_positive() {
        assert!(EntryLeg::manual(dec!(0), dec!(100), Utc::now()).is_err());
        assert!(EntryLeg::manual(dec!(1), dec!(-100), Utc::now()).is_err());
        assert!(ExitLeg::manual(dec!(1), dec!(100), Some(dec!(-0.1)), Utc::now()).is_err());
    }

    #[test]
    fn test_new_deal_starts_open() {
        let leg = EntryLeg::manual(dec!(1), dec!(100), Utc::now()).unwrap();
        let deal = Deal::new(Uuid::now_v7(), btcusdt(), Direction::Long, Utc::now(), leg);
        assert_eq!(deal.status, DealStatus::Open);
        assert_eq!(deal.entry_legs.len(), 1);
        assert!(deal.closed_at.is_none());
    }

    #[test]
    fn test_normalize_expands_legacy_shape() {
        let leg = EntryLeg::manual(dec!(1), dec!(100), Utc::now()).unwrap();
        let mut deal = Deal::new(Uuid::now_v7(), btcusdt(), Direction::Long, Utc::now(), leg.clone());
        // Fake a legacy document: scalar fields set, arrays empty
        deal.entry_legs.clear();
        deal.entry = Some(leg);
        deal.exit = Some(ExitLeg::manual(dec!(1), dec!(110), None, Utc::now()).unwrap());

        deal.normalize();

        assert_eq!(deal.entry_legs.len(), 1);
        assert_eq!(deal.exit_legs.len(), 1);
        assert!(deal.entry.is_none());
        assert!(deal.exit.is_none());
    }

    #[test]
    fn test_normalize_prefers_arrays_over_legacy() {
        let leg = EntryLeg::manual(dec!(1), dec!(100), Utc::now()).unwrap();
        let stale = EntryLeg::manual(dec!(9), dec!(1), Utc::now()).unwrap();
        let mut deal = Deal::new(Uuid::now_v7(), btcusdt(), Direction::Long, Utc::now(), leg);
        deal.entry = Some(stale);

        deal.normalize();

        assert_eq!(deal.entry_legs.len(), 1);
        assert_eq!(deal.entry_legs[0].qty, dec!(1));
        assert!(deal.entry.is_none());
    }

    #[test]
    fn test_legacy_document_deserializes() {
        // A pre-multi-leg document: no arrays, no aggregates, scalar entry
        let json = r#"{
            "id": "018f2b2e-0000-7000-8000-000000000001",
            "owner_id": "018f2b2e-0000-7000-8000-000000000002",
            "symbol": {"base": "BTC", "quote": "USDT"},
            "direction": "LONG",
            "status": "OPEN",
            "opened_at": "2023-04-01T00:00:00Z",
            "entry": {
                "qty": "1", "price": "100", "quote": "100",
                "opened_at": "2023-04-01T00:00:00Z", "source": "MANUAL"
            }
        }"#;
        let mut deal: Deal = serde_json::from_str(json).unwrap();
        deal.normalize();
        assert_eq!(deal.entry_legs.len(), 1);
        assert_eq!(deal.entry_legs[0].qty, dec!(1));
        assert_eq!(deal.entry_qty_total, Decimal::ZERO); // recompute is the ledger's job
    }

    #[test]
    fn test_append_note() {
        let leg = EntryLeg::manual(dec!(1), dec!(100), Utc::now()).unwrap();
        let mut deal = Deal::new(Uuid::now_v7(), btcusdt(), Direction::Long, Utc::now(), leg);
        deal.append_note("first");
        deal.append_note("second");
        assert_eq!(deal.note.as_deref(), Some("first\nsecond"));
    }
}
