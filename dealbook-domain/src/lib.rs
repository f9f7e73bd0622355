//! Dealbook Domain Layer
//!
//! Pure domain types with zero I/O dependencies.
//! Contains the Deal aggregate, trade fills, and validated value objects.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod deal;
pub mod decimal;
pub mod fills;
pub mod value_objects;

// Re-export commonly used types
pub use deal::{Deal, DealId, EntryLeg, ExitLeg, OwnerId, ProfitOp};
pub use decimal::{parse_decimal, require_non_negative, require_positive};
pub use fills::TradeFill;
pub use value_objects::{
    DealStatus, Direction, DomainError, LegSource, OrderSide, Symbol,
};
