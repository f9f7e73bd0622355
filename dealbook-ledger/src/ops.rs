//! Position ledger operations.
//!
//! Pure mutations over a `Deal`. Every operation validates fully before
//! writing anything, so a returned error always leaves the deal exactly
//! as it was. Every successful mutation ends with the appropriate
//! aggregate recompute.

use chrono::{DateTime, Utc};
use dealbook_domain::{
    require_positive, Deal, DealStatus, Direction, DomainError, EntryLeg, ExitLeg, LegSource,
    ProfitOp, Symbol, TradeFill,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{LedgerError, LedgerResult};
use crate::reconcile::{aggregate_fills, merge_fills, FillAggregate};
use crate::recompute::{recompute_entry, recompute_exit};

// =============================================================================
// Input shapes
// =============================================================================

/// Price/fee/time of a manual exit; quantity is supplied separately.
#[derive(Debug, Clone, Deserialize)]
pub struct ExitSpec {
    /// Exit price
    pub price: Decimal,
    /// Fee in quote terms
    #[serde(default)]
    pub fee: Option<Decimal>,
    /// Exit timestamp, defaults to now
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

/// Correction of the first entry leg's numbers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryCorrection {
    /// New quantity
    #[serde(default)]
    pub qty: Option<Decimal>,
    /// New price
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Partial update of a deal's editable fields.
///
/// Touching `direction` or `entry` on a deal that has exit legs restates
/// the realized PnL of those exits under the new average cost, and can
/// push `remaining_qty` back above zero, reopening a closed deal. Both
/// are documented behavior of the edit path, not hidden side effects.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DealPatch {
    /// New trading pair
    #[serde(default)]
    pub symbol: Option<Symbol>,
    /// New direction
    #[serde(default)]
    pub direction: Option<Direction>,
    /// New open timestamp
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    /// Replacement note
    #[serde(default)]
    pub note: Option<String>,
    /// Requested status; CLOSED requires an exit leg to exist
    #[serde(default)]
    pub status: Option<DealStatus>,
    /// Correction of the first entry leg
    #[serde(default)]
    pub entry: Option<EntryCorrection>,
}

/// Which side of the deal a fill import feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradePhase {
    /// Fills open or grow the position
    Entry,
    /// Fills close part or all of the position
    Exit,
}

// =============================================================================
// Leg operations
// =============================================================================

/// Append an entry leg and recompute, preserving recognized profit.
///
/// Rejected with `AlreadyClosed` when the deal is fully exited, unless
/// this is the very first leg ever added.
pub fn add_entry_leg(deal: &mut Deal, leg: EntryLeg) -> LedgerResult<()> {
    let first_ever = deal.entry_legs.is_empty() && deal.entry.is_none();
    if !first_ever && deal.has_exits() && deal.remaining_qty.is_zero() {
        return Err(LedgerError::AlreadyClosed);
    }
    if leg.qty <= Decimal::ZERO {
        return Err(DomainError::InvalidQuantity(format!(
            "entry qty must be positive, got {}",
            leg.qty
        ))
        .into());
    }

    deal.entry_legs.push(leg);
    recompute_entry(deal);
    // Restating the average cost must not silently rewrite profit that
    // was already recognized on earlier exits.
    recompute_exit(deal, true);
    Ok(())
}

/// Append an exit leg and recompute everything, including realized PnL.
///
/// Requires `0 < qty ≤ remaining_qty`; a larger quantity fails with
/// `ExceedsRemaining` and changes nothing.
pub fn add_exit_leg(deal: &mut Deal, leg: ExitLeg) -> LedgerResult<()> {
    if leg.qty <= Decimal::ZERO {
        return Err(DomainError::InvalidQuantity(format!(
            "exit qty must be positive, got {}",
            leg.qty
        ))
        .into());
    }
    if leg.qty > deal.remaining_qty {
        return Err(LedgerError::ExceedsRemaining {
            requested: leg.qty,
            remaining: deal.remaining_qty,
        });
    }

    deal.exit_legs.push(leg);
    recompute_entry(deal);
    // A genuine close re-derives PnL for all legs under the latest average
    recompute_exit(deal, false);
    Ok(())
}

/// Close the whole remaining quantity with one exit leg.
pub fn close_full(deal: &mut Deal, exit: &ExitSpec) -> LedgerResult<()> {
    if deal.is_closed() {
        return Err(LedgerError::AlreadyClosed);
    }
    let closed_at = exit.closed_at.unwrap_or_else(Utc::now);
    let leg = ExitLeg::manual(deal.remaining_qty, exit.price, exit.fee, closed_at)?;
    add_exit_leg(deal, leg)
}

/// Close part of the remaining quantity, with an optional note.
pub fn partial_close(
    deal: &mut Deal,
    qty: Decimal,
    exit: &ExitSpec,
    note: Option<&str>,
) -> LedgerResult<()> {
    let closed_at = exit.closed_at.unwrap_or_else(Utc::now);
    let leg = ExitLeg::manual(qty, exit.price, exit.fee, closed_at)?;
    add_exit_leg(deal, leg)?;
    if let Some(note) = note {
        deal.append_note(note);
    }
    Ok(())
}

/// Convert available realized profit into a synthetic entry leg.
///
/// `qty = amount / price`; the leg's quote is the amount itself, so the
/// reinvested profit is accounted exactly even when `qty × price` would
/// round differently. Requires positive realized profit and
/// `amount ≤ realized_pnl_available`.
pub fn reinvest_profit(
    deal: &mut Deal,
    amount: Decimal,
    price: Decimal,
    at: Option<DateTime<Utc>>,
    note: Option<String>,
) -> LedgerResult<()> {
    require_positive("amount", amount)?;
    require_positive("price", price)?;

    if deal.realized_pnl <= Decimal::ZERO || amount > deal.realized_pnl_available {
        return Err(LedgerError::AmountExceedsAvailableProfit {
            requested: amount,
            available: deal.realized_pnl_available.max(Decimal::ZERO),
        });
    }

    let at = at.unwrap_or_else(Utc::now);
    let qty = amount / price;
    let leg = EntryLeg {
        qty,
        price,
        quote: amount,
        fee: None,
        fee_asset: None,
        opened_at: at,
        source: LegSource::Manual,
        order_id: None,
    };
    add_entry_leg(deal, leg)?;

    deal.profit_ops.push(ProfitOp {
        at,
        amount,
        price,
        qty,
        note,
    });
    deal.profit_spent_total += amount;
    deal.realized_pnl_available = deal.realized_pnl - deal.profit_spent_total;
    Ok(())
}

// =============================================================================
// Edit
// =============================================================================

/// Apply a partial update to a deal and recompute all aggregates.
///
/// Everything is validated before the first field is written.
pub fn update_deal(deal: &mut Deal, patch: &DealPatch) -> LedgerResult<()> {
    // A CLOSED status can only be requested when an exit leg exists;
    // whether it sticks is still decided by the recompute below.
    if patch.status == Some(DealStatus::Closed) && !deal.has_exits() {
        return Err(LedgerError::ExitRequiredForClosed);
    }

    if let Some(corr) = &patch.entry {
        let first = deal
            .entry_legs
            .first()
            .ok_or_else(|| DomainError::InvalidAmount("no entry leg to correct".to_string()))?;
        let new_qty = match corr.qty {
            Some(q) => require_positive("entry qty", q)?,
            None => first.qty,
        };
        if let Some(p) = corr.price {
            require_positive("entry price", p)?;
        }
        // Shrinking the entry below what has already been exited would
        // drive remaining_qty negative.
        let prospective_total = deal.entry_qty_total - first.qty + new_qty;
        if prospective_total < deal.closed_qty {
            return Err(LedgerError::ExceedsRemaining {
                requested: deal.closed_qty,
                remaining: prospective_total,
            });
        }
    }

    if let Some(symbol) = &patch.symbol {
        deal.symbol = symbol.clone();
    }
    if let Some(direction) = patch.direction {
        deal.direction = direction;
    }
    if let Some(opened_at) = patch.opened_at {
        deal.opened_at = opened_at;
    }
    if let Some(note) = &patch.note {
        deal.note = Some(note.clone());
    }
    if let Some(corr) = &patch.entry {
        let first = deal.entry_legs.first_mut().expect("validated above");
        if let Some(q) = corr.qty {
            first.qty = q;
        }
        if let Some(p) = corr.price {
            first.price = p;
        }
        first.quote = first.qty * first.price;
    }

    recompute_entry(deal);
    recompute_exit(deal, false);
    Ok(())
}

// =============================================================================
// Fill import
// =============================================================================

/// Merge exchange fills into a phase and rebuild its aggregate leg.
///
/// Idempotent for overlapping fill sets; returns how many fills were
/// genuinely new so a caller can detect an order whose fills have not
/// settled yet. The phase's single `Exchange`-source leg is rebuilt
/// wholesale from the full stored fill set; manual legs are untouched.
pub fn apply_trades(
    deal: &mut Deal,
    phase: TradePhase,
    incoming: &[TradeFill],
) -> LedgerResult<usize> {
    let existing = match phase {
        TradePhase::Entry => deal.entry_fills.clone(),
        TradePhase::Exit => deal.exit_fills.clone(),
    };
    let outcome = merge_fills(existing, incoming);
    let agg = aggregate_fills(&outcome.merged);

    // One shared order id, or none when fills span orders
    let order_id = match outcome.merged.first().map(|f| f.order_id) {
        Some(first) if outcome.merged.iter().all(|f| f.order_id == first) => Some(first),
        _ => None,
    };

    if phase == TradePhase::Exit && !agg.qty.is_zero() {
        // The rebuilt exchange leg replaces the previous one, so only
        // manual exits count against the entry total here.
        let manual_qty: Decimal = deal
            .exit_legs
            .iter()
            .filter(|l| l.source != LegSource::Exchange)
            .map(|l| l.qty)
            .sum();
        if manual_qty + agg.qty > deal.entry_qty_total {
            return Err(LedgerError::ExceedsRemaining {
                requested: agg.qty,
                remaining: deal.entry_qty_total - manual_qty,
            });
        }
    }

    let mixed_note = format!(
        "mixed fee assets on {} fills; leg fee left unset, reconcile manually",
        match phase {
            TradePhase::Entry => "entry",
            TradePhase::Exit => "exit",
        }
    );
    let (fee, fee_asset) = match agg.single_fee() {
        Some((fee, asset)) => (Some(fee), Some(asset.to_string())),
        None => (None, None),
    };

    match phase {
        TradePhase::Entry => {
            if !agg.qty.is_zero() {
                let opened_at = outcome.merged.first().map(|f| f.time).unwrap_or(deal.opened_at);
                let leg = EntryLeg {
                    qty: agg.qty,
                    price: agg.price,
                    quote: agg.quote,
                    fee,
                    fee_asset,
                    opened_at,
                    source: LegSource::Exchange,
                    order_id,
                };
                match deal
                    .entry_legs
                    .iter_mut()
                    .find(|l| l.source == LegSource::Exchange)
                {
                    Some(existing) => *existing = leg,
                    None => deal.entry_legs.push(leg),
                }
            }
            deal.entry_fills = outcome.merged;
            note_mixed_fees(deal, &agg, &mixed_note);
            recompute_entry(deal);
            recompute_exit(deal, false);
        },
        TradePhase::Exit => {
            if !agg.qty.is_zero() {
                let closed_at = outcome
                    .merged
                    .last()
                    .map(|f| f.time)
                    .unwrap_or_else(Utc::now);
                let leg = ExitLeg {
                    qty: agg.qty,
                    price: agg.price,
                    quote: agg.quote,
                    fee,
                    fee_asset,
                    closed_at,
                    source: LegSource::Exchange,
                    order_id,
                };
                match deal
                    .exit_legs
                    .iter_mut()
                    .find(|l| l.source == LegSource::Exchange)
                {
                    Some(existing) => *existing = leg,
                    None => deal.exit_legs.push(leg),
                }
            }
            deal.exit_fills = outcome.merged;
            note_mixed_fees(deal, &agg, &mixed_note);
            recompute_exit(deal, false);
        },
    }

    Ok(outcome.imported_count)
}

fn note_mixed_fees(deal: &mut Deal, agg: &FillAggregate, note: &str) {
    if agg.has_mixed_fee_assets()
        && !deal.note.as_deref().is_some_and(|n| n.contains(note))
    {
        deal.append_note(note);
    }
}

// =============================================================================
// Tests
// =============================================================================
