//! Dealbook Position Ledger
//!
//! Average-cost position accounting over the Deal aggregate: leg
//! mutations, realized PnL, profit reinvestment, exchange fill
//! reconciliation, and the `DealService` use cases on top of a
//! `DealRepository`.
//!
//! The `ops` and `recompute` modules are pure functions over a `Deal`;
//! all persistence and concurrency control lives in `service`.

#![warn(clippy::all)]

pub mod error;
pub mod ops;
pub mod reconcile;
pub mod recompute;
pub mod service;

pub use error::{LedgerError, LedgerResult};
pub use ops::{DealPatch, EntryCorrection, ExitSpec, TradePhase};
pub use reconcile::{aggregate_fills, merge_fills, FillAggregate, MergeOutcome};
pub use recompute::{recompute_entry, recompute_exit};
pub use service::{DealService, NewDealInput};
