//! Checked order submission.
//!
//! `OrderExecutor` runs every safety check against the venue's filters
//! and the account's balances before an order goes out, and turns the
//! fill-polling edge case (order placed, trades not settled yet) into a
//! distinct condition instead of an empty result.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use dealbook_domain::{Symbol, TradeFill};

use crate::cache::{FilterCache, FILTER_TTL};
use crate::error::{ExecError, ExecResult};
use crate::filters::{
    validate_balance, validate_lot_size, validate_notional, validate_price_filter, SymbolFilters,
};
use crate::ports::{ExchangeGateway, OrderAck, OrderKind, OrderRequest};

/// Validates and submits orders through an `ExchangeGateway`.
///
/// Symbol filters are cached in-process with a fixed TTL; ticker price
/// and balances are fetched fresh for every validation.
pub struct OrderExecutor<G> {
    gateway: Arc<G>,
    filters: FilterCache,
}

impl<G: ExchangeGateway> OrderExecutor<G> {
    /// Build an executor with the default filter TTL.
    pub fn new(gateway: Arc<G>) -> Self {
        Self::with_filter_ttl(gateway, FILTER_TTL)
    }

    /// Build an executor with a custom filter TTL.
    pub fn with_filter_ttl(gateway: Arc<G>, ttl: Duration) -> Self {
        Self {
            gateway,
            filters: FilterCache::new(ttl),
        }
    }

    /// Filters for a symbol, cached.
    pub async fn symbol_filters(&self, symbol: &Symbol) -> ExecResult<Arc<SymbolFilters>> {
        let key = symbol.as_pair();
        if let Some(snapshot) = self.filters.get(&key) {
            return Ok(snapshot);
        }
        let fresh = self.gateway.get_exchange_info(symbol).await?;
        Ok(self.filters.insert(&key, fresh))
    }

    /// Run every pre-submission check without placing anything.
    ///
    /// # Errors
    /// `FilterFailure` for a lot-size, price, or notional violation;
    /// `InsufficientBalance` when the account cannot fund the order.
    pub async fn validate_order(&self, order: &OrderRequest) -> ExecResult<()> {
        let filters = self.symbol_filters(&order.symbol).await?;

        if let Some(qty) = order.qty {
            validate_lot_size(&order.symbol, qty, &filters.lot_size)?;
        } else if !matches!((order.kind, order.quote_qty), (OrderKind::Market, Some(_))) {
            return Err(ExecError::InvalidOrder(
                "order is missing a base quantity".to_string(),
            ));
        }

        if let OrderKind::Limit { price } = order.kind {
            validate_price_filter(&order.symbol, price, &filters.price)?;
        }

        // Market sizing needs the current ticker; limit orders do not
        let ticker_price = match order.kind {
            OrderKind::Market => self.gateway.get_ticker_price(&order.symbol).await?,
            OrderKind::Limit { .. } => Decimal::ZERO,
        };

        validate_notional(order, &filters.notional, ticker_price)?;

        let balances = self.gateway.get_account_balances().await?;
        validate_balance(order, &filters, &balances, ticker_price)?;

        Ok(())
    }

    /// Validate, then submit.
    pub async fn submit_checked(&self, order: &OrderRequest) -> ExecResult<OrderAck> {
        self.validate_order(order).await?;
        let ack = self.gateway.place_order(order).await?;
        tracing::info!(
            symbol = %order.symbol,
            side = %order.side,
            order_id = ack.order_id,
            "order submitted"
        );
        Ok(ack)
    }

    /// Fetch the fills settled so far for an order.
    ///
    /// # Errors
    /// `FillsNotSettled` when the exchange reports no trades yet; the
    /// caller should retry after a short delay.
    pub async fn fetch_fills(&self, symbol: &Symbol, order_id: i64) -> ExecResult<Vec<TradeFill>> {
        let fills = self.gateway.get_fills_by_order_id(symbol, order_id).await?;
        if fills.is_empty() {
            return Err(ExecError::FillsNotSettled {
                symbol: symbol.as_pair(),
                order_id,
            });
        }
        Ok(fills)
    }

    /// Cancel an open order.
    pub async fn cancel(&self, symbol: &Symbol, order_id: i64) -> ExecResult<()> {
        self.gateway.cancel_order(symbol, order_id).await
    }
}

// =============================================================================
// Tests
// =============================================================================
