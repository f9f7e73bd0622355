//! Ledger errors.

use dealbook_domain::DomainError;
use dealbook_store::StoreError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by position-ledger operations.
///
/// Every variant is detected and returned before any mutation is
/// persisted; a failed operation leaves the stored deal unchanged.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Deal absent, or not owned by the caller
    #[error("Deal not found: {id}")]
    NotFound {
        /// Deal id as presented by the caller
        id: String,
    },

    /// Close requested on a deal that is already fully exited
    #[error("Deal is already closed")]
    AlreadyClosed,

    /// CLOSED status requested without any exit leg present
    #[error("Cannot mark deal closed without an exit leg")]
    ExitRequiredForClosed,

    /// Exit quantity larger than what is still open
    #[error("Exit qty {requested} exceeds remaining qty {remaining}")]
    ExceedsRemaining {
        /// Quantity the caller asked to close
        requested: Decimal,
        /// Quantity still open on the deal
        remaining: Decimal,
    },

    /// Reinvestment amount larger than the profit still available
    #[error("Amount {requested} exceeds available profit {available}")]
    AmountExceedsAvailableProfit {
        /// Amount the caller asked to reinvest
        requested: Decimal,
        /// Realized profit not yet spent
        available: Decimal,
    },

    /// Concurrent writers kept invalidating the read-modify-write cycle
    #[error("Gave up after repeated version conflicts on deal {id}")]
    ConcurrencyRetriesExhausted {
        /// Deal id
        id: String,
    },

    /// Malformed input (decimal, enum, symbol)
    #[error("Validation error: {0}")]
    Domain(#[from] DomainError),

    /// Storage failure
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => LedgerError::NotFound { id },
            other => LedgerError::Store(other),
        }
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
