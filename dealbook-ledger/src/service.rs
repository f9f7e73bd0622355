//! Deal service: use cases over a `DealRepository`.
//!
//! Every mutation runs as a read-modify-write cycle under optimistic
//! concurrency: read the record with its version, apply the pure `ops`
//! mutation, then write back presenting that version. A version conflict
//! means another writer got there first; the cycle reloads and reapplies
//! on the fresh document, up to a bounded number of attempts.

use chrono::{DateTime, Utc};
use dealbook_domain::{Deal, DealId, Direction, EntryLeg, ExitLeg, OwnerId, Symbol, TradeFill};
use dealbook_store::{DealRepository, StoreError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{LedgerError, LedgerResult};
use crate::ops::{self, DealPatch, ExitSpec, TradePhase};
use crate::recompute::{recompute_entry, recompute_exit};

const MAX_CAS_RETRIES: usize = 5;

/// Bring a freshly loaded document up to date.
///
/// Expands the legacy single-leg shape and re-derives the quantity
/// aggregates, which legacy documents may lack entirely. A stored
/// `realized_pnl` of zero with no profit ops predates the field and is
/// re-derived; any other figure may have been deliberately preserved
/// across a reinvestment and is kept as-is.
fn hydrate(deal: &mut Deal) {
    deal.normalize();
    recompute_entry(deal);
    let preserve = !deal.profit_ops.is_empty() || !deal.realized_pnl.is_zero();
    recompute_exit(deal, preserve);
}

/// Input for creating a new deal.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDealInput {
    /// Trading pair, e.g. "BTCUSDT"
    pub symbol: String,
    /// LONG or SHORT
    pub direction: Direction,
    /// Open timestamp, defaults to now
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    /// First entry quantity
    pub qty: Decimal,
    /// First entry price
    pub price: Decimal,
    /// Optional note
    #[serde(default)]
    pub note: Option<String>,
}

/// Application service exposing the deal use cases.
pub struct DealService<R: DealRepository> {
    repo: Arc<R>,
}

impl<R: DealRepository> DealService<R> {
    /// Build a service over the given repository.
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    // -------------------------------------------------------------------------
    // CRUD
    // -------------------------------------------------------------------------

    /// Create a new OPEN deal with one manual entry leg.
    pub async fn create_deal(&self, owner_id: OwnerId, input: NewDealInput) -> LedgerResult<Deal> {
        let symbol = Symbol::from_pair(&input.symbol)?;
        let opened_at = input.opened_at.unwrap_or_else(Utc::now);
        let first_entry = EntryLeg::manual(input.qty, input.price, opened_at)?;

        let mut deal = Deal::new(owner_id, symbol, input.direction, opened_at, first_entry);
        deal.note = input.note;
        recompute_entry(&mut deal);
        recompute_exit(&mut deal, false);

        let record = self.repo.insert(&deal).await?;
        tracing::info!(deal_id = %record.deal.id, symbol = %record.deal.symbol, "deal created");
        Ok(record.deal)
    }

    /// Fetch one deal, owner-scoped.
    pub async fn get_deal(&self, owner_id: OwnerId, id: DealId) -> LedgerResult<Deal> {
        let record = self
            .repo
            .find(id, owner_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound { id: id.to_string() })?;
        let mut deal = record.deal;
        hydrate(&mut deal);
        Ok(deal)
    }

    /// List all deals for an owner, newest first.
    pub async fn list_deals(&self, owner_id: OwnerId) -> LedgerResult<Vec<Deal>> {
        let records = self.repo.list_by_owner(owner_id).await?;
        Ok(records
            .into_iter()
            .map(|r| {
                let mut deal = r.deal;
                hydrate(&mut deal);
                deal
            })
            .collect())
    }

    /// Hard-delete a deal, owner-scoped.
    pub async fn delete_deal(&self, owner_id: OwnerId, id: DealId) -> LedgerResult<()> {
        self.repo.delete(id, owner_id).await?;
        tracing::info!(deal_id = %id, "deal deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Append a manual entry leg.
    pub async fn add_entry(
        &self,
        owner_id: OwnerId,
        id: DealId,
        qty: Decimal,
        price: Decimal,
        at: Option<DateTime<Utc>>,
    ) -> LedgerResult<Deal> {
        let (deal, _) = self
            .mutate(owner_id, id, |deal| {
                let leg = EntryLeg::manual(qty, price, at.unwrap_or_else(Utc::now))?;
                ops::add_entry_leg(deal, leg)
            })
            .await?;
        Ok(deal)
    }

    /// Append a manual exit leg.
    pub async fn add_exit(
        &self,
        owner_id: OwnerId,
        id: DealId,
        qty: Decimal,
        exit: ExitSpec,
    ) -> LedgerResult<Deal> {
        let (deal, _) = self
            .mutate(owner_id, id, |deal| {
                let leg = ExitLeg::manual(
                    qty,
                    exit.price,
                    exit.fee,
                    exit.closed_at.unwrap_or_else(Utc::now),
                )?;
                ops::add_exit_leg(deal, leg)
            })
            .await?;
        Ok(deal)
    }

    /// Close the entire remaining quantity.
    pub async fn close_full(
        &self,
        owner_id: OwnerId,
        id: DealId,
        exit: ExitSpec,
    ) -> LedgerResult<Deal> {
        let (deal, _) = self
            .mutate(owner_id, id, |deal| ops::close_full(deal, &exit))
            .await?;
        tracing::info!(deal_id = %deal.id, realized_pnl = %deal.realized_pnl, "deal closed");
        Ok(deal)
    }

    /// Close part of the remaining quantity, with an optional note.
    pub async fn partial_close(
        &self,
        owner_id: OwnerId,
        id: DealId,
        qty: Decimal,
        exit: ExitSpec,
        note: Option<String>,
    ) -> LedgerResult<Deal> {
        let (deal, _) = self
            .mutate(owner_id, id, |deal| {
                ops::partial_close(deal, qty, &exit, note.as_deref())
            })
            .await?;
        Ok(deal)
    }

    /// Convert available realized profit back into the position.
    pub async fn reinvest_profit(
        &self,
        owner_id: OwnerId,
        id: DealId,
        amount: Decimal,
        price: Decimal,
        note: Option<String>,
    ) -> LedgerResult<Deal> {
        let (deal, _) = self
            .mutate(owner_id, id, |deal| {
                ops::reinvest_profit(deal, amount, price, None, note.clone())
            })
            .await?;
        tracing::info!(
            deal_id = %deal.id,
            amount = %amount,
            available = %deal.realized_pnl_available,
            "profit reinvested"
        );
        Ok(deal)
    }

    /// Apply a partial update to a deal's editable fields.
    pub async fn update_deal(
        &self,
        owner_id: OwnerId,
        id: DealId,
        patch: DealPatch,
    ) -> LedgerResult<Deal> {
        let (deal, _) = self
            .mutate(owner_id, id, |deal| ops::update_deal(deal, &patch))
            .await?;
        Ok(deal)
    }

    /// Merge exchange fills into a deal phase.
    ///
    /// Returns the updated deal and how many fills were genuinely new.
    pub async fn apply_order_fills(
        &self,
        owner_id: OwnerId,
        id: DealId,
        phase: TradePhase,
        fills: Vec<TradeFill>,
    ) -> LedgerResult<(Deal, usize)> {
        self.mutate(owner_id, id, |deal| ops::apply_trades(deal, phase, &fills))
            .await
    }

    // -------------------------------------------------------------------------
    // CAS loop
    // -------------------------------------------------------------------------

    /// Read-modify-write with bounded retry on version conflicts.
    ///
    /// The closure must be pure over the deal: it is re-run from scratch
    /// against a freshly loaded document on every attempt.
    async fn mutate<T, F>(&self, owner_id: OwnerId, id: DealId, mut f: F) -> LedgerResult<(Deal, T)>
    where
        F: FnMut(&mut Deal) -> LedgerResult<T>,
    {
        for attempt in 1..=MAX_CAS_RETRIES {
            let record = self
                .repo
                .find(id, owner_id)
                .await?
                .ok_or_else(|| LedgerError::NotFound { id: id.to_string() })?;

            let mut deal = record.deal;
            hydrate(&mut deal);
            let out = f(&mut deal)?;

            match self.repo.update(&deal, record.version).await {
                Ok(updated) => return Ok((updated.deal, out)),
                Err(StoreError::VersionConflict { .. }) => {
                    tracing::warn!(
                        deal_id = %id,
                        attempt,
                        "version conflict, reloading and retrying"
                    );
                },
                Err(other) => return Err(other.into()),
            }
        }

        Err(LedgerError::ConcurrencyRetriesExhausted { id: id.to_string() })
    }
}

// =============================================================================
// Tests
// =============================================================================
