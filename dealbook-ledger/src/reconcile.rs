//! Trade fill reconciliation.
//!
//! Deduplicates raw exchange fills by trade id and folds them into one
//! aggregate per deal phase. Merging is idempotent: importing the same
//! fill set twice yields the same merged set and an imported count of
//! zero, which lets a caller tell "nothing new settled yet" apart from a
//! real import.

use dealbook_domain::TradeFill;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};

/// Result of merging incoming fills into an existing set.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Full fill set, ascending by `(time, id)`
    pub merged: Vec<TradeFill>,
    /// How many incoming fills were not previously present
    pub imported_count: usize,
}

/// Merge `incoming` fills into `existing`, deduplicating by trade id.
///
/// Genuinely-new fills are appended, then the whole set is sorted
/// ascending by `(time, id)`. Fill ids already present are skipped no
/// matter how often they are re-imported.
pub fn merge_fills(existing: Vec<TradeFill>, incoming: &[TradeFill]) -> MergeOutcome {
    let mut seen: HashSet<i64> = existing.iter().map(|f| f.id).collect();
    let mut merged = existing;
    let mut imported_count = 0;

    for fill in incoming {
        if seen.insert(fill.id) {
            merged.push(fill.clone());
            imported_count += 1;
        }
    }

    merged.sort_by(|a, b| (a.time, a.id).cmp(&(b.time, b.id)));

    MergeOutcome {
        merged,
        imported_count,
    }
}

/// Aggregate of a fill set: totals plus per-asset commissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillAggregate {
    /// Σ qty
    pub qty: Decimal,
    /// Σ quote_qty
    pub quote: Decimal,
    /// quote / qty, zero for an empty set
    pub price: Decimal,
    /// Commission totals keyed by commission asset
    pub fee_by_asset: BTreeMap<String, Decimal>,
}

impl FillAggregate {
    /// The `(fee, asset)` pair when exactly one commission asset appears.
    ///
    /// With more than one asset the leg-level fee is left unset and the
    /// per-fill records remain the source of truth.
    pub fn single_fee(&self) -> Option<(Decimal, &str)> {
        if self.fee_by_asset.len() == 1 {
            self.fee_by_asset
                .iter()
                .next()
                .map(|(asset, fee)| (*fee, asset.as_str()))
        } else {
            None
        }
    }

    /// Whether commissions were charged in more than one asset.
    pub fn has_mixed_fee_assets(&self) -> bool {
        self.fee_by_asset.len() > 1
    }
}

/// Sum a fill set into quantity/quote totals and per-asset commissions.
///
/// All arithmetic is exact decimal; the derived price is independent of
/// the input order of the fills.
pub fn aggregate_fills(fills: &[TradeFill]) -> FillAggregate {
    let qty: Decimal = fills.iter().map(|f| f.qty).sum();
    let quote: Decimal = fills.iter().map(|f| f.quote_qty).sum();
    let price = if qty.is_zero() { Decimal::ZERO } else { quote / qty };

    let mut fee_by_asset: BTreeMap<String, Decimal> = BTreeMap::new();
    for fill in fills {
        *fee_by_asset
            .entry(fill.commission_asset.clone())
            .or_insert(Decimal::ZERO) += fill.commission;
    }

    FillAggregate {
        qty,
        quote,
        price,
        fee_by_asset,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn fill(id: i64, order_id: i64, qty: Decimal, price: Decimal, offset_secs: i64) -> TradeFill {
        TradeFill {
            id,
            order_id,
            price,
            qty,
            quote_qty: qty * price,
            commission: dec!(0.01),
            commission_asset: "USDT".to_string(),
            time: Utc::now() + Duration::seconds(offset_secs),
            is_buyer: true,
            is_maker: false,
        }
    }

    #[test]
    fn test_merge_dedupes_by_id() {
        let a = fill(1, 10, dec!(1), dec!(100), 0);
        let b = fill(2, 10, dec!(2), dec!(101), 1);

        let first = merge_fills(Vec::new(), &[a.clone(), b.clone()]);
        assert_eq!(first.imported_count, 2);
        assert_eq!(first.merged.len(), 2);

        // Re-importing the same set is a no-op
        let second = merge_fills(first.merged.clone(), &[a, b]);
        assert_eq!(second.imported_count, 0);
        assert_eq!(second.merged, first.merged);
    }

    #[test]
    fn test_merge_sorts_by_time_then_id() {
        let late = fill(5, 10, dec!(1), dec!(100), 60);
        let early = fill(9, 10, dec!(1), dec!(100), 0);
        let mut tied = fill(3, 10, dec!(1), dec!(100), 0);
        tied.time = early.time;

        let outcome = merge_fills(Vec::new(), &[late, early, tied]);
        let ids: Vec<i64> = outcome.merged.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![3, 9, 5]);
    }

    #[test]
    fn test_merge_duplicate_within_incoming_counted_once() {
        let a = fill(1, 10, dec!(1), dec!(100), 0);
        let outcome = merge_fills(Vec::new(), &[a.clone(), a]);
        assert_eq!(outcome.imported_count, 1);
        assert_eq!(outcome.merged.len(), 1);
    }

    #[test]
    fn test_aggregate_totals_and_price() {
        let fills = vec![
            fill(1, 10, dec!(1), dec!(100), 0),
            fill(2, 10, dec!(3), dec!(110), 1),
        ];
        let agg = aggregate_fills(&fills);
        assert_eq!(agg.qty, dec!(4));
        assert_eq!(agg.quote, dec!(430));
        assert_eq!(agg.price, dec!(107.5));
        assert_eq!(agg.single_fee(), Some((dec!(0.02), "USDT")));
    }

    #[test]
    fn test_aggregate_empty_is_zero() {
        let agg = aggregate_fills(&[]);
        assert_eq!(agg.qty, Decimal::ZERO);
        assert_eq!(agg.price, Decimal::ZERO);
        assert!(agg.fee_by_asset.is_empty());
        assert!(agg.single_fee().is_none());
    }

    #[test]
    fn test_aggregate_mixed_fee_assets() {
        let mut a = fill(1, 10, dec!(1), dec!(100), 0);
        a.commission_asset = "BNB".to_string();
        let b = fill(2, 10, dec!(1), dec!(100), 1);

        let agg = aggregate_fills(&[a, b]);
        assert!(agg.has_mixed_fee_assets());
        assert!(agg.single_fee().is_none());
        assert_eq!(agg.fee_by_asset.len(), 2);
    }

    #[test]
    fn test_aggregate_is_order_insensitive() {
        let fills = vec![
            fill(1, 10, dec!(0.3), dec!(100.1), 5),
            fill(2, 10, dec!(0.7), dec!(99.7), 1),
            fill(3, 11, dec!(1.1), dec!(100.4), 3),
        ];
        let mut reversed = fills.clone();
        reversed.reverse();

        let a = aggregate_fills(&merge_fills(Vec::new(), &fills).merged);
        let b = aggregate_fills(&merge_fills(Vec::new(), &reversed).merged);
        assert_eq!(a, b);
    }
}
