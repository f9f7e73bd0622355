//! Execution layer error types.
//!
//! Upstream exchange errors are classified by provider error code where
//! recognized, and otherwise surfaced as a sanitized generic message.
//! Sanitizing strips anything that looks like a signature or API key and
//! bounds the message length, so upstream text can be shown to a user.

use std::fmt;
use thiserror::Error;

/// Which pre-submission filter check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Quantity bounds / step alignment
    LotSize,
    /// Price bounds / tick alignment
    PriceFilter,
    /// Minimum order notional
    Notional,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::LotSize => write!(f, "LOT_SIZE"),
            FilterKind::PriceFilter => write!(f, "PRICE_FILTER"),
            FilterKind::Notional => write!(f, "NOTIONAL"),
        }
    }
}

/// Errors that can occur during order validation and execution.
#[derive(Debug, Error)]
pub enum ExecError {
    /// A pre-submission check against exchange filters failed.
    ///
    /// Carries the filter name, symbol, and offending values so the
    /// caller can present an actionable correction.
    #[error("{filter} check failed for {symbol}: {detail}")]
    FilterFailure {
        /// Which filter rejected the order
        filter: FilterKind,
        /// Trading pair
        symbol: String,
        /// Offending values, e.g. "qty 0.0015 not aligned to step 0.001"
        detail: String,
    },

    /// The account does not hold enough of the required asset.
    #[error("Insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Asset that is short
        asset: String,
        /// Amount the order needs
        required: rust_decimal::Decimal,
        /// Free balance on the account
        available: rust_decimal::Decimal,
    },

    /// The exchange has not settled the order's trades yet.
    ///
    /// Not a failure: the caller should retry after a short delay.
    #[error("No fills settled yet for order {order_id} on {symbol}")]
    FillsNotSettled {
        /// Trading pair
        symbol: String,
        /// Exchange order id being polled
        order_id: i64,
    },

    /// Order rejected by the exchange (recognized rejection code)
    #[error("Order rejected by exchange: {0}")]
    OrderRejected(String),

    /// Exchange-side filter rejection (the order slipped past local checks)
    #[error("Exchange filter rejection: {0}")]
    ExchangeFilter(String),

    /// API key invalid or lacking permissions
    #[error("Exchange credentials rejected: {0}")]
    BadCredentials(String),

    /// Any other exchange or transport failure, sanitized
    #[error("Exchange error{}: {message}", .code.map(|c| format!(" (code {})", c)).unwrap_or_default())]
    Upstream {
        /// Provider error code, when one was returned
        code: Option<i64>,
        /// Sanitized, length-bounded message
        message: String,
    },

    /// Malformed order input (missing qty, bad decimal)
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// Domain validation error
    #[error("Domain error: {0}")]
    Domain(#[from] dealbook_domain::DomainError),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;

const MAX_UPSTREAM_MESSAGE_LEN: usize = 240;

/// Strip secrets from an upstream message and bound its length.
///
/// Long hex-like runs (signatures, API keys) are replaced with
/// `[redacted]`; the result is truncated to a fixed length.
pub fn sanitize_message(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_UPSTREAM_MESSAGE_LEN));
    let mut run = String::new();

    let flush = |run: &mut String, out: &mut String| {
        // 32+ chars of key-like material is never useful to a user
        if run.len() >= 32 && run.chars().all(|c| c.is_ascii_alphanumeric()) {
            out.push_str("[redacted]");
        } else {
            out.push_str(run);
        }
        run.clear();
    };

    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            run.push(c);
        } else {
            flush(&mut run, &mut out);
            out.push(c);
        }
    }
    flush(&mut run, &mut out);

    if out.len() > MAX_UPSTREAM_MESSAGE_LEN {
        // cut must land on a char boundary or truncate panics
        let mut cut = MAX_UPSTREAM_MESSAGE_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out.push_str("...");
    }
    out
}

/// Map a provider error code to a structured error.
///
/// Recognized codes: -2010 (order rejected / insufficient funds),
/// -1013 (filter failure), -2014 and -2015 (bad API key or permissions).
/// Everything else passes through as a sanitized upstream error.
pub fn classify_exchange_error(code: i64, message: &str) -> ExecError {
    let message = sanitize_message(message);
    match code {
        -2010 => ExecError::OrderRejected(message),
        -1013 => ExecError::ExchangeFilter(message),
        -2014 | -2015 => ExecError::BadCredentials(message),
        _ => ExecError::Upstream {
            code: Some(code),
            message,
        },
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_redacts_key_material() {
        let raw = "signature=4f2e1a9b8c7d6e5f4a3b2c1d0e9f8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d2e1f rejected";
        let clean = sanitize_message(raw);
        assert!(clean.contains("[redacted]"));
        assert!(!clean.contains("4f2e1a9b"));
        assert!(clean.contains("rejected"));
    }

    #[test]
    fn test_sanitize_keeps_ordinary_text() {
        let raw = "Filter failure: LOT_SIZE";
        assert_eq!(sanitize_message(raw), raw);
    }

    #[test]
    fn test_sanitize_truncates_long_messages() {
        let raw = "x ".repeat(500);
        let clean = sanitize_message(&raw);
        assert!(clean.len() <= MAX_UPSTREAM_MESSAGE_LEN + 3);
        assert!(clean.ends_with("..."));
    }

    #[test]
    fn test_sanitize_truncates_multibyte_on_char_boundary() {
        // A euro sign is 3 bytes; byte 240 falls mid-character
        let raw = format!("a{}", "€".repeat(100));
        let clean = sanitize_message(&raw);
        assert!(clean.ends_with("..."));
        assert!(clean.len() <= MAX_UPSTREAM_MESSAGE_LEN + 3);
        assert!(clean.trim_end_matches("...").chars().all(|c| c == 'a' || c == '€'));
    }

    #[test]
    fn test_classify_known_codes() {
        assert!(matches!(
            classify_exchange_error(-2010, "Account has insufficient balance"),
            ExecError::OrderRejected(_)
        ));
        assert!(matches!(
            classify_exchange_error(-1013, "Filter failure: PRICE_FILTER"),
            ExecError::ExchangeFilter(_)
        ));
        assert!(matches!(
            classify_exchange_error(-2014, "API-key format invalid"),
            ExecError::BadCredentials(_)
        ));
        assert!(matches!(
            classify_exchange_error(-2015, "Invalid API-key, IP, or permissions"),
            ExecError::BadCredentials(_)
        ));
        assert!(matches!(
            classify_exchange_error(-1021, "Timestamp outside recvWindow"),
            ExecError::Upstream { code: Some(-1021), .. }
        ));
    }

    #[test]
    fn test_filter_kind_display() {
        assert_eq!(FilterKind::LotSize.to_string(), "LOT_SIZE");
        assert_eq!(FilterKind::PriceFilter.to_string(), "PRICE_FILTER");
        assert_eq!(FilterKind::Notional.to_string(), "NOTIONAL");
    }
}
