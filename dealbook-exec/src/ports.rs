//! Execution layer port definitions.
//!
//! The `ExchangeGateway` port is the only surface through which the
//! journal talks to a spot exchange. Adapters implement it for a real
//! venue (see the connectors crate) or as a stub for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use dealbook_domain::{OrderSide, Symbol, TradeFill};

use crate::error::ExecResult;
use crate::filters::SymbolFilters;

// =============================================================================
// Order shapes
// =============================================================================

/// Order pricing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", tag = "type")]
pub enum OrderKind {
    /// Rest on the book at a fixed price
    Limit {
        /// Limit price
        price: Decimal,
    },
    /// Take whatever the book offers
    Market,
}

/// A candidate order, before safety validation.
///
/// Sizing: LIMIT orders carry `qty`. MARKET orders carry either `qty`
/// (base-sized) or `quote_qty` (spend-sized, BUY only), never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Trading pair
    pub symbol: Symbol,
    /// BUY or SELL
    pub side: OrderSide,
    /// LIMIT or MARKET
    pub kind: OrderKind,
    /// Base quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qty: Option<Decimal>,
    /// Quote spend amount, for quote-sized MARKET BUY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_qty: Option<Decimal>,
}

/// Acknowledgement of a placed order.
///
/// Fills are not part of the ack; they are fetched separately and may
/// lag order placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// Exchange-assigned order id
    pub order_id: i64,
    /// Client order id echoed back, when one was sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
    /// Exchange-reported transaction time
    pub transact_time: DateTime<Utc>,
}

// =============================================================================
// Exchange gateway port
// =============================================================================

/// Port for spot exchange operations.
///
/// All monetary fields are exact decimals; adapters parse the venue's
/// decimal strings at the wire boundary and never go through floats.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Current exchange server time.
    async fn get_server_time(&self) -> ExecResult<DateTime<Utc>>;

    /// Latest ticker price for a symbol.
    async fn get_ticker_price(&self, symbol: &Symbol) -> ExecResult<Decimal>;

    /// Trading filters for a symbol.
    async fn get_exchange_info(&self, symbol: &Symbol) -> ExecResult<SymbolFilters>;

    /// Free balances by asset.
    async fn get_account_balances(&self) -> ExecResult<HashMap<String, Decimal>>;

    /// Submit an order.
    async fn place_order(&self, order: &OrderRequest) -> ExecResult<OrderAck>;

    /// Cancel an open order.
    async fn cancel_order(&self, symbol: &Symbol, order_id: i64) -> ExecResult<()>;

    /// Trades settled so far for one order. May legitimately be empty
    /// right after placement.
    async fn get_fills_by_order_id(
        &self,
        symbol: &Symbol,
        order_id: i64,
    ) -> ExecResult<Vec<TradeFill>>;
}

// =============================================================================
// Tests
// =============================================================================
