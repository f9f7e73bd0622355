//! Exact decimal parsing and validation helpers.
//!
//! Every monetary and quantity field in the journal is a `rust_decimal`
//! value; on the wire (and in stored documents) it is a decimal string,
//! never a binary float. These helpers sit at the input boundary and map
//! malformed or out-of-range values to `DomainError`.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::value_objects::DomainError;

/// Parse a decimal string exactly.
///
/// # Errors
/// Returns `DomainError::InvalidDecimal` naming the offending field if the
/// string is not a valid decimal.
pub fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, DomainError> {
    Decimal::from_str(raw.trim())
        .map_err(|_| DomainError::InvalidDecimal(format!("{}: {:?}", field, raw)))
}

/// Require a strictly positive value.
///
/// # Errors
/// Returns `DomainError::InvalidAmount` naming the field if value <= 0.
pub fn require_positive(field: &str, value: Decimal) -> Result<Decimal, DomainError> {
    if value <= Decimal::ZERO {
        return Err(DomainError::InvalidAmount(format!("{} must be positive, got {}", field, value)));
    }
    Ok(value)
}

/// Require a non-negative value.
///
/// # Errors
/// Returns `DomainError::InvalidAmount` naming the field if value < 0.
pub fn require_non_negative(field: &str, value: Decimal) -> Result<Decimal, DomainError> {
    if value < Decimal::ZERO {
        return Err(DomainError::InvalidAmount(format!(
            "{} must not be negative, got {}",
            field, value
        )));
    }
    Ok(value)
}
