//! Stub exchange gateway for testing.
//!
//! Simulates the venue in-process: configurable filters, prices,
//! balances, and per-order fill sets, plus a one-shot failure switch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use dealbook_domain::{Symbol, TradeFill};

use crate::error::{ExecError, ExecResult};
use crate::filters::SymbolFilters;
use crate::ports::{ExchangeGateway, OrderAck, OrderRequest};

/// Stub gateway for tests.
pub struct StubGateway {
    filters: RwLock<HashMap<String, SymbolFilters>>,
    prices: RwLock<HashMap<String, Decimal>>,
    balances: RwLock<HashMap<String, Decimal>>,
    fills: RwLock<HashMap<i64, Vec<TradeFill>>>,
    placed: RwLock<Vec<OrderRequest>>,
    order_counter: AtomicI64,
    fail_next: RwLock<bool>,
    info_calls: AtomicI64,
}

impl StubGateway {
    /// Create an empty stub.
    pub fn new() -> Self {
        Self {
            filters: RwLock::new(HashMap::new()),
            prices: RwLock::new(HashMap::new()),
            balances: RwLock::new(HashMap::new()),
            fills: RwLock::new(HashMap::new()),
            placed: RwLock::new(Vec::new()),
            order_counter: AtomicI64::new(1000),
            fail_next: RwLock::new(false),
            info_calls: AtomicI64::new(0),
        }
    }

    /// Configure the filters reported for a symbol.
    pub fn set_filters(&self, filters: SymbolFilters) {
        let key = filters.symbol.to_uppercase();
        self.filters.write().unwrap().insert(key, filters);
    }

    /// Configure the ticker price for a symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices
            .write()
            .unwrap()
            .insert(symbol.to_uppercase(), price);
    }

    /// Configure a free balance.
    pub fn set_balance(&self, asset: &str, free: Decimal) {
        self.balances
            .write()
            .unwrap()
            .insert(asset.to_string(), free);
    }

    /// Configure the fills returned for an order id.
    pub fn set_fills(&self, order_id: i64, fills: Vec<TradeFill>) {
        self.fills.write().unwrap().insert(order_id, fills);
    }

    /// Make the next gateway call fail.
    pub fn set_fail_next(&self, fail: bool) {
        *self.fail_next.write().unwrap() = fail;
    }

    /// Orders placed so far, for assertions.
    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.placed.read().unwrap().clone()
    }

    /// How many times `get_exchange_info` was hit, for cache assertions.
    pub fn exchange_info_calls(&self) -> i64 {
        self.info_calls.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        let mut fail = self.fail_next.write().unwrap();
        std::mem::take(&mut *fail)
    }
}

impl Default for StubGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeGateway for StubGateway {
    async fn get_server_time(&self) -> ExecResult<DateTime<Utc>> {
        if self.should_fail() {
            return Err(ExecError::Upstream {
                code: None,
                message: "simulated time failure".to_string(),
            });
        }
        Ok(Utc::now())
    }

    async fn get_ticker_price(&self, symbol: &Symbol) -> ExecResult<Decimal> {
        if self.should_fail() {
            return Err(ExecError::Upstream {
                code: None,
                message: "simulated ticker failure".to_string(),
            });
        }
        self.prices
            .read()
            .unwrap()
            .get(&symbol.as_pair())
            .copied()
            .ok_or_else(|| ExecError::Upstream {
                code: None,
                message: format!("no price for {}", symbol.as_pair()),
            })
    }

    async fn get_exchange_info(&self, symbol: &Symbol) -> ExecResult<SymbolFilters> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail() {
            return Err(ExecError::Upstream {
                code: None,
                message: "simulated exchangeInfo failure".to_string(),
            });
        }
        self.filters
            .read()
            .unwrap()
            .get(&symbol.as_pair())
            .cloned()
            .ok_or_else(|| ExecError::Upstream {
                code: None,
                message: format!("no filters for {}", symbol.as_pair()),
            })
    }

    async fn get_account_balances(&self) -> ExecResult<HashMap<String, Decimal>> {
        if self.should_fail() {
            return Err(ExecError::Upstream {
                code: None,
                message: "simulated account failure".to_string(),
            });
        }
        Ok(self.balances.read().unwrap().clone())
    }

    async fn place_order(&self, order: &OrderRequest) -> ExecResult<OrderAck> {
        if self.should_fail() {
            return Err(ExecError::OrderRejected(
                "simulated order rejection".to_string(),
            ));
        }
        self.placed.write().unwrap().push(order.clone());
        let order_id = self.order_counter.fetch_add(1, Ordering::SeqCst);
        Ok(OrderAck {
            order_id,
            client_order_id: None,
            transact_time: Utc::now(),
        })
    }

    async fn cancel_order(&self, _symbol: &Symbol, order_id: i64) -> ExecResult<()> {
        if self.should_fail() {
            return Err(ExecError::Upstream {
                code: None,
                message: "simulated cancel failure".to_string(),
            });
        }
        tracing::debug!(order_id, "stub: order cancelled");
        Ok(())
    }

    async fn get_fills_by_order_id(
        &self,
        _symbol: &Symbol,
        order_id: i64,
    ) -> ExecResult<Vec<TradeFill>> {
        if self.should_fail() {
            return Err(ExecError::Upstream {
                code: None,
                message: "simulated trades failure".to_string(),
            });
        }
        Ok(self
            .fills
            .read()
            .unwrap()
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// Tests
// =============================================================================
