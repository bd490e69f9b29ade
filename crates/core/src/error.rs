//! Ledger error model.

use thiserror::Error;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Keep this focused on deterministic, business/domain failures. Soft
/// conditions found by batch operations (a suspect match, a negative stock
/// after replay) are reported on the batch report, not raised here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A non-positive quantity was submitted; rejected before any mutation.
    #[error("invalid quantity: {0} (must be a positive integer)")]
    InvalidQuantity(i64),

    /// A strict-mode outbound would drive stock negative; no partial mutation.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { available: i64, requested: i64 },

    /// The outbound target could not be resolved by id or by name.
    #[error("variant not found")]
    VariantNotFound,

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A ledger invariant was violated (stored counters disagree with stock).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl LedgerError {
    pub fn invalid_quantity(quantity: i64) -> Self {
        Self::InvalidQuantity(quantity)
    }

    pub fn insufficient_stock(available: i64, requested: i64) -> Self {
        Self::InsufficientStock {
            available,
            requested,
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn not_found() -> Self {
        Self::VariantNotFound
    }
}
