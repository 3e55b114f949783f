//! Engine and store error types.

use thiserror::Error;

use stockops_core::{DomainError, ItemId, StockroomId};
use stockops_inventory::StockOperationStatus;

/// Store operation error.
///
/// These are **infrastructure errors** (stale writes, poisoned locks, refused
/// deletes) as opposed to domain errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Error returned by every engine entry point.
///
/// Any error aborts the whole call; the caller's operation is left untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient stock of item {item} in stockroom {stockroom} (short by {shortfall})")]
    InsufficientStock {
        item: ItemId,
        stockroom: StockroomId,
        shortfall: i64,
    },

    #[error("item {item} requires an expiration date but none was defined or set to be calculated")]
    MissingExpiration { item: ItemId },

    #[error("cannot {action} an operation in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: StockOperationStatus,
    },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            other => EngineError::Store(other),
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::InvariantViolation(msg) => EngineError::InvariantViolation(msg),
            DomainError::NotFound => EngineError::NotFound,
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
            DomainError::InsufficientStock {
                item,
                stockroom,
                shortfall,
            } => EngineError::InsufficientStock {
                item,
                stockroom,
                shortfall,
            },
            DomainError::MissingExpiration { item } => EngineError::MissingExpiration { item },
        }
    }
}
