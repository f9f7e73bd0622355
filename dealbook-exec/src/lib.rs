//! Dealbook Execution Layer
//!
//! Order safety validation against exchange trading filters, the
//! `ExchangeGateway` port, a TTL filter cache, and the checked order
//! executor. A stub gateway is provided for tests.

#![warn(clippy::all)]

pub mod cache;
pub mod error;
pub mod executor;
pub mod filters;
pub mod ports;
pub mod stub;

pub use cache::{FilterCache, FILTER_TTL};
pub use error::{classify_exchange_error, sanitize_message, ExecError, ExecResult, FilterKind};
pub use executor::OrderExecutor;
pub use filters::{
    order_notional, validate_balance, validate_lot_size, validate_notional, validate_price_filter,
    LotSizeFilter, NotionalFilter, PriceFilter, SymbolFilters,
};
pub use ports::{ExchangeGateway, OrderAck, OrderKind, OrderRequest};
pub use stub::StubGateway;
