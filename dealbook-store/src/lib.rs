//! Dealbook Storage Layer
//!
//! Persistence for the Deal aggregate as a versioned document.
//!
//! # Architecture
//!
//! - **Repository trait**: the storage interface (port), keyed by
//!   deal id + owner id
//! - **In-memory store**: fast implementation for testing
//! - **PostgreSQL store**: JSONB document store (feature `postgres`)
//!
//! Every update is a compare-and-swap on a per-deal version counter; a
//! stale writer gets `StoreError::VersionConflict` and must reload.

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgDealStore;
pub use repository::{DealRecord, DealRepository};
