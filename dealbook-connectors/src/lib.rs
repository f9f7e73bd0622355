//! Dealbook Exchange Connectors
//!
//! Adapters for exchange APIs. Normalizes exchange-specific wire types
//! to domain types and implements the `ExchangeGateway` port.

#![warn(clippy::all)]

pub mod binance_rest;

pub use binance_rest::BinanceSpotClient;
