//! Exchange order safety checks.
//!
//! Validates a candidate order against the venue's trading filters
//! (quantity bounds and step, price band and tick, minimum notional)
//! and against account balances, before anything is sent out.
//!
//! All comparisons are exact decimal arithmetic. Step and tick alignment
//! use the decimal remainder, so a quantity that is off by any amount at
//! all fails, with no float tolerance to hide behind.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use dealbook_domain::{OrderSide, Symbol};

use crate::error::{ExecError, ExecResult, FilterKind};
use crate::ports::{OrderKind, OrderRequest};

/// Market BUY notional and balance use the ticker price padded by a
/// fixed 0.2% slippage buffer.
pub fn market_buy_buffer() -> Decimal {
    Decimal::new(1002, 3) // 1.002
}

// =============================================================================
// Filter parameters
// =============================================================================

/// LOT_SIZE filter: quantity bounds and step granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotSizeFilter {
    /// Minimum base quantity
    pub min_qty: Decimal,
    /// Maximum base quantity
    pub max_qty: Decimal,
    /// Quantity granularity; (qty − min_qty) must be a multiple
    pub step_size: Decimal,
}

/// PRICE_FILTER: price bounds and tick granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFilter {
    /// Minimum price
    pub min_price: Decimal,
    /// Maximum price
    pub max_price: Decimal,
    /// Price granularity; price must be a multiple
    pub tick_size: Decimal,
}

/// NOTIONAL filter: minimum order value in quote terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotionalFilter {
    /// Minimum price × qty
    pub min_notional: Decimal,
}

/// Trading filters for one symbol, as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFilters {
    /// Trading pair, e.g. "BTCUSDT"
    pub symbol: String,
    /// Base asset, e.g. "BTC"
    pub base_asset: String,
    /// Quote asset, e.g. "USDT"
    pub quote_asset: String,
    /// Quantity filter
    pub lot_size: LotSizeFilter,
    /// Price filter
    pub price: PriceFilter,
    /// Minimum notional filter
    pub notional: NotionalFilter,
}

// =============================================================================
// Checks
// =============================================================================

/// Check quantity bounds and step alignment.
pub fn validate_lot_size(symbol: &Symbol, qty: Decimal, filter: &LotSizeFilter) -> ExecResult<()> {
    if qty < filter.min_qty || qty > filter.max_qty {
        return Err(ExecError::FilterFailure {
            filter: FilterKind::LotSize,
            symbol: symbol.as_pair(),
            detail: format!(
                "qty {} outside [{}, {}]",
                qty, filter.min_qty, filter.max_qty
            ),
        });
    }
    if !filter.step_size.is_zero() && !((qty - filter.min_qty) % filter.step_size).is_zero() {
        return Err(ExecError::FilterFailure {
            filter: FilterKind::LotSize,
            symbol: symbol.as_pair(),
            detail: format!("qty {} not aligned to step {}", qty, filter.step_size),
        });
    }
    Ok(())
}

/// Check price bounds and tick alignment.
pub fn validate_price_filter(
    symbol: &Symbol,
    price: Decimal,
    filter: &PriceFilter,
) -> ExecResult<()> {
    if price < filter.min_price || price > filter.max_price {
        return Err(ExecError::FilterFailure {
            filter: FilterKind::PriceFilter,
            symbol: symbol.as_pair(),
            detail: format!(
                "price {} outside [{}, {}]",
                price, filter.min_price, filter.max_price
            ),
        });
    }
    if !filter.tick_size.is_zero() && !(price % filter.tick_size).is_zero() {
        return Err(ExecError::FilterFailure {
            filter: FilterKind::PriceFilter,
            symbol: symbol.as_pair(),
            detail: format!("price {} not aligned to tick {}", price, filter.tick_size),
        });
    }
    Ok(())
}

/// Estimated notional value of an order in quote terms.
///
/// LIMIT: price × qty. MARKET BUY: the quote spend directly when
/// spend-sized, otherwise qty × ticker padded by the slippage buffer.
/// MARKET SELL: qty × ticker.
pub fn order_notional(order: &OrderRequest, ticker_price: Decimal) -> ExecResult<Decimal> {
    match order.kind {
        OrderKind::Limit { price } => {
            let qty = require_qty(order)?;
            Ok(price * qty)
        },
        OrderKind::Market => match (order.side, order.quote_qty) {
            (OrderSide::Buy, Some(quote)) => Ok(quote),
            (OrderSide::Buy, None) => {
                let qty = require_qty(order)?;
                Ok(qty * ticker_price * market_buy_buffer())
            },
            (OrderSide::Sell, _) => {
                let qty = require_qty(order)?;
                Ok(qty * ticker_price)
            },
        },
    }
}

/// Check the order's notional against the exchange minimum.
pub fn validate_notional(
    order: &OrderRequest,
    filter: &NotionalFilter,
    ticker_price: Decimal,
) -> ExecResult<()> {
    let notional = order_notional(order, ticker_price)?;
    if notional < filter.min_notional {
        return Err(ExecError::FilterFailure {
            filter: FilterKind::Notional,
            symbol: order.symbol.as_pair(),
            detail: format!(
                "notional {} below minimum {}",
                notional, filter.min_notional
            ),
        });
    }
    Ok(())
}

/// Check that the account can fund the order.
///
/// BUY needs quote balance for the spend amount; SELL needs base
/// balance for the quantity.
pub fn validate_balance(
    order: &OrderRequest,
    filters: &SymbolFilters,
    balances: &HashMap<String, Decimal>,
    ticker_price: Decimal,
) -> ExecResult<()> {
    let (asset, required) = match order.side {
        OrderSide::Buy => {
            let required = match order.kind {
                OrderKind::Limit { price } => require_qty(order)? * price,
                OrderKind::Market => match order.quote_qty {
                    Some(quote) => quote,
                    None => require_qty(order)? * ticker_price * market_buy_buffer(),
                },
            };
            (filters.quote_asset.as_str(), required)
        },
        OrderSide::Sell => (filters.base_asset.as_str(), require_qty(order)?),
    };

    let available = balances.get(asset).copied().unwrap_or(Decimal::ZERO);
    if available < required {
        return Err(ExecError::InsufficientBalance {
            asset: asset.to_string(),
            required,
            available,
        });
    }
    Ok(())
}

fn require_qty(order: &OrderRequest) -> ExecResult<Decimal> {
    order
        .qty
        .ok_or_else(|| ExecError::InvalidOrder("order is missing a base quantity".to_string()))
}

// =============================================================================
// Tests
// =============================================================================
