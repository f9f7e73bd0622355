//! Aggregate recomputation for the Deal.
//!
//! The derived fields on a deal are a cache of a pure function over the
//! leg arrays. These functions are the only writers of those fields;
//! every mutation in `ops` ends with the appropriate recompute so the
//! cache can never drift from the legs.
//!
//! Realized PnL is derived against the *current* blended average cost at
//! recompute time. Adding an entry leg after a partial close therefore
//! restates the PnL of exits that already happened; the reinvestment path
//! opts out of that via `preserve_realized_pnl`.

use dealbook_domain::{Deal, DealStatus, Direction, EntryLeg, ExitLeg};
use rust_decimal::Decimal;

/// Derived entry-side aggregate of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryAggregate {
    /// Σ entry legs qty
    pub qty_total: Decimal,
    /// Σ entry legs quote
    pub quote_total: Decimal,
    /// quote_total / qty_total, zero when there is no quantity
    pub avg_price: Decimal,
}

/// Derived exit-side aggregate of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitAggregate {
    /// Σ exit legs qty
    pub closed_qty: Decimal,
    /// Entry total minus closed qty
    pub remaining_qty: Decimal,
    /// Σ per-leg PnL against the current entry average
    pub realized_pnl: Decimal,
}

fn entry_legs_of(deal: &Deal) -> &[EntryLeg] {
    // Legacy single-leg documents act as an implicit one-element leg set.
    // `Deal::normalize` usually expands them at load time; this fallback
    // keeps the recompute correct even on an un-normalized document.
    if deal.entry_legs.is_empty() {
        deal.entry.as_ref().map(std::slice::from_ref).unwrap_or(&[])
    } else {
        &deal.entry_legs
    }
}

fn exit_legs_of(deal: &Deal) -> &[ExitLeg] {
    if deal.exit_legs.is_empty() {
        deal.exit.as_ref().map(std::slice::from_ref).unwrap_or(&[])
    } else {
        &deal.exit_legs
    }
}

/// Compute the entry aggregate without touching the deal.
pub fn entry_aggregate(deal: &Deal) -> EntryAggregate {
    let legs = entry_legs_of(deal);
    let qty_total: Decimal = legs.iter().map(|l| l.qty).sum();
    let quote_total: Decimal = legs.iter().map(|l| l.quote).sum();
    let avg_price = if qty_total.is_zero() {
        Decimal::ZERO
    } else {
        quote_total / qty_total
    };
    EntryAggregate {
        qty_total,
        quote_total,
        avg_price,
    }
}

/// PnL of one exit leg against a given entry average price.
pub fn exit_leg_pnl(direction: Direction, leg: &ExitLeg, entry_avg_price: Decimal) -> Decimal {
    let fee = leg.fee.unwrap_or(Decimal::ZERO);
    match direction {
        Direction::Long => leg.quote - (leg.qty * entry_avg_price) - fee,
        Direction::Short => (leg.qty * entry_avg_price) - leg.quote - fee,
    }
}

/// Compute the exit aggregate without touching the deal.
///
/// Uses the deal's *current* entry aggregate fields, so recompute the
/// entry side first when entries changed.
pub fn exit_aggregate(deal: &Deal) -> ExitAggregate {
    let legs = exit_legs_of(deal);
    let closed_qty: Decimal = legs.iter().map(|l| l.qty).sum();
    let remaining_qty = deal.entry_qty_total - closed_qty;
    let realized_pnl: Decimal = legs
        .iter()
        .map(|l| exit_leg_pnl(deal.direction, l, deal.entry_avg_price))
        .sum();
    ExitAggregate {
        closed_qty,
        remaining_qty,
        realized_pnl,
    }
}

/// Recompute and write the entry-side derived fields.
pub fn recompute_entry(deal: &mut Deal) {
    let agg = entry_aggregate(deal);
    deal.entry_qty_total = agg.qty_total;
    deal.entry_quote_total = agg.quote_total;
    deal.entry_avg_price = agg.avg_price;
}

/// Recompute and write the exit-side derived fields, status, and closed_at.
///
/// When `preserve_realized_pnl` is set the stored `realized_pnl` is left
/// untouched: a reinvestment restates the average cost and must not
/// silently rewrite already-recognized profit. `realized_pnl_available`
/// is always re-derived from whatever `realized_pnl` ends up being.
pub fn recompute_exit(deal: &mut Deal, preserve_realized_pnl: bool) {
    let agg = exit_aggregate(deal);
    deal.closed_qty = agg.closed_qty;
    deal.remaining_qty = agg.remaining_qty;
    if !preserve_realized_pnl {
        deal.realized_pnl = agg.realized_pnl;
    }
    deal.realized_pnl_available = deal.realized_pnl - deal.profit_spent_total;

    let has_exits = !exit_legs_of(deal).is_empty();
    if has_exits && deal.remaining_qty.is_zero() {
        deal.status = DealStatus::Closed;
        deal.closed_at = exit_legs_of(deal).iter().map(|l| l.closed_at).max();
    } else {
        deal.status = DealStatus::Open;
        deal.closed_at = None;
    }

    tracing::debug!(
        deal_id = %deal.id,
        closed_qty = %deal.closed_qty,
        remaining_qty = %deal.remaining_qty,
        realized_pnl = %deal.realized_pnl,
        status = %deal.status,
        "exit aggregate recomputed"
    );
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dealbook_domain::{Direction, EntryLeg, ExitLeg, Symbol};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn deal_with_entry(direction: Direction, qty: Decimal, price: Decimal) -> Deal {
        let leg = EntryLeg::manual(qty, price, Utc::now()).unwrap();
        let mut deal = Deal::new(
            Uuid::now_v7(),
            Symbol::from_pair("BTCUSDT").unwrap(),
            direction,
            Utc::now(),
            leg,
        );
        recompute_entry(&mut deal);
        recompute_exit(&mut deal, false);
        deal
    }

    #[test]
    fn test_entry_aggregate_weighted_average() {
        let mut deal = deal_with_entry(Direction::Long, dec!(1), dec!(100));
        deal.entry_legs
            .push(EntryLeg::manual(dec!(3), dec!(200), Utc::now()).unwrap());
        recompute_entry(&mut deal);

        assert_eq!(deal.entry_qty_total, dec!(4));
        assert_eq!(deal.entry_quote_total, dec!(700)); // 100 + 600
        assert_eq!(deal.entry_avg_price, dec!(175));
        // Exact decimal identity, no epsilon
        assert_eq!(deal.entry_avg_price, deal.entry_quote_total / deal.entry_qty_total);
    }

    #[test]
    fn test_entry_aggregate_empty_is_zero() {
        let mut deal = deal_with_entry(Direction::Long, dec!(1), dec!(100));
        deal.entry_legs.clear();
        recompute_entry(&mut deal);
        assert_eq!(deal.entry_qty_total, Decimal::ZERO);
        assert_eq!(deal.entry_avg_price, Decimal::ZERO);
    }

    #[test]
    fn test_entry_aggregate_falls_back_to_legacy_field() {
        let mut deal = deal_with_entry(Direction::Long, dec!(1), dec!(100));
        let legacy = deal.entry_legs.pop().unwrap();
        deal.entry = Some(legacy);
        recompute_entry(&mut deal);
        assert_eq!(deal.entry_qty_total, dec!(1));
        assert_eq!(deal.entry_avg_price, dec!(100));
    }

    #[test]
    fn test_long_realized_pnl() {
        // Scenario: LONG, entry qty=1 @ 100, exit qty=1 @ 110, fee 0 → pnl 10
        let mut deal = deal_with_entry(Direction::Long, dec!(1), dec!(100));
        deal.exit_legs
            .push(ExitLeg::manual(dec!(1), dec!(110), None, Utc::now()).unwrap());
        recompute_exit(&mut deal, false);

        assert_eq!(deal.realized_pnl, dec!(10));
        assert_eq!(deal.status, DealStatus::Closed);
        assert!(deal.closed_at.is_some());
    }

    #[test]
    fn test_short_realized_pnl_with_fee() {
        // Scenario: SHORT, entry qty=2 @ 50 (quote 100), exit qty=2 @ 40, fee 1
        // pnl = (2×50) − 80 − 1 = 19
        let mut deal = deal_with_entry(Direction::Short, dec!(2), dec!(50));
        deal.exit_legs
            .push(ExitLeg::manual(dec!(2), dec!(40), Some(dec!(1)), Utc::now()).unwrap());
        recompute_exit(&mut deal, false);

        assert_eq!(deal.realized_pnl, dec!(19));
        assert_eq!(deal.status, DealStatus::Closed);
    }

    #[test]
    fn test_partial_exit_stays_open() {
        let mut deal = deal_with_entry(Direction::Long, dec!(3), dec!(100));
        deal.exit_legs
            .push(ExitLeg::manual(dec!(1), dec!(110), None, Utc::now()).unwrap());
        recompute_exit(&mut deal, false);

        assert_eq!(deal.closed_qty, dec!(1));
        assert_eq!(deal.remaining_qty, dec!(2));
        assert_eq!(deal.status, DealStatus::Open);
        assert!(deal.closed_at.is_none());
    }

    #[test]
    fn test_preserve_realized_pnl_keeps_recognized_profit() {
        let mut deal = deal_with_entry(Direction::Long, dec!(2), dec!(100));
        deal.exit_legs
            .push(ExitLeg::manual(dec!(1), dec!(120), None, Utc::now()).unwrap());
        recompute_exit(&mut deal, false);
        assert_eq!(deal.realized_pnl, dec!(20));

        // A later entry at a higher price raises the blended average
        deal.entry_legs
            .push(EntryLeg::manual(dec!(2), dec!(160), Utc::now()).unwrap());
        recompute_entry(&mut deal);
        recompute_exit(&mut deal, true);

        // Recognized profit untouched, remaining qty restated
        assert_eq!(deal.realized_pnl, dec!(20));
        assert_eq!(deal.remaining_qty, dec!(3));

        // Without preserve, the same edit restates history (documented quirk)
        recompute_exit(&mut deal, false);
        assert_eq!(deal.entry_avg_price, dec!(130)); // (200+320)/4
        assert_eq!(deal.realized_pnl, dec!(-10)); // 120 − 130
    }

    #[test]
    fn test_available_profit_tracks_spent() {
        let mut deal = deal_with_entry(Direction::Long, dec!(1), dec!(100));
        deal.exit_legs
            .push(ExitLeg::manual(dec!(1), dec!(150), None, Utc::now()).unwrap());
        deal.profit_spent_total = dec!(30);
        recompute_exit(&mut deal, false);

        assert_eq!(deal.realized_pnl, dec!(50));
        assert_eq!(deal.realized_pnl_available, dec!(20));
    }
}
