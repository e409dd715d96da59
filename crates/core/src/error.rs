//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::{ItemId, LocationId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// availability, posting balance, conflicts). Storage concerns belong in the
/// infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Missing or malformed input, rejected before any write.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced item, location, receipt, movement or account is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Requested quantity exceeds what is available at the resolved location.
    #[error(
        "insufficient stock for item {item} at location {location}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        item: ItemId,
        location: LocationId,
        requested: Decimal,
        available: Decimal,
    },

    /// Debit and credit totals of a journal posting differ.
    #[error("unbalanced posting: debits {debit} != credits {credit}")]
    UnbalancedPosting { debit: Decimal, credit: Decimal },

    /// A domain invariant was violated (e.g. illegal status transition).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Stale read detected (optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn insufficient_stock(
        item: ItemId,
        location: LocationId,
        requested: Decimal,
        available: Decimal,
    ) -> Self {
        Self::InsufficientStock {
            item,
            location,
            requested,
            available,
        }
    }

    /// Stable machine-readable code, used in structured logs and by callers
    /// that map failures onto transport-level status codes.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation",
            DomainError::NotFound(_) => "not_found",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::UnbalancedPosting { .. } => "unbalanced_posting",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::Conflict(_) => "conflict",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn insufficient_stock_message_names_both_quantities() {
        let err = DomainError::insufficient_stock(
            ItemId::new(),
            LocationId::new(),
            dec!(20),
            dec!(5.5),
        );
        let msg = err.to_string();
        assert!(msg.contains("requested 20"));
        assert!(msg.contains("available 5.5"));
        assert_eq!(err.code(), "insufficient_stock");
    }
}
