//! Domain error model.

use thiserror::Error;

use crate::id::{ItemId, StockroomId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, stock shortages). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (missing field, bad quantity, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (stale version, purge of an operation still owning transactions).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The source stockroom cannot cover the requested quantity.
    #[error("insufficient stock of item {item} in stockroom {stockroom} (short by {shortfall})")]
    InsufficientStock {
        item: ItemId,
        stockroom: StockroomId,
        shortfall: i64,
    },

    /// An expirable item has no expiration and none can be resolved.
    #[error("item {item} requires an expiration date but none was defined or set to be calculated")]
    MissingExpiration { item: ItemId },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient_stock(item: ItemId, stockroom: StockroomId, shortfall: i64) -> Self {
        Self::InsufficientStock {
            item,
            stockroom,
            shortfall,
        }
    }

    pub fn missing_expiration(item: ItemId) -> Self {
        Self::MissingExpiration { item }
    }
}
