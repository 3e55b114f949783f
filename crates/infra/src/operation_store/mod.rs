//! Operation store boundary.
//!
//! Operations own their reserved and applied transactions; the store keeps them
//! together and indexes applied transactions by operation identity.

pub mod in_memory;

use std::sync::Arc;

use stockops_core::OperationId;
use stockops_inventory::{StockOperation, StockOperationTransaction};

use crate::error::StoreError;

pub use in_memory::InMemoryOperationStore;

/// Persistence of `StockOperation` aggregates.
///
/// `save` checks the aggregate's version against the stored one, bumps it and
/// returns the stored copy. `purge` refuses operations that still own reserved
/// or applied transactions.
pub trait OperationStore: Send + Sync {
    fn save(&self, operation: StockOperation) -> Result<StockOperation, StoreError>;

    fn get(&self, id: OperationId) -> Result<Option<StockOperation>, StoreError>;

    fn get_by_number(&self, number: &str) -> Result<Option<StockOperation>, StoreError>;

    fn purge(&self, id: OperationId) -> Result<(), StoreError>;

    /// Applied transactions of one operation, in creation order.
    fn transactions_for(&self, id: OperationId) -> Result<Vec<StockOperationTransaction>, StoreError>;
}

impl<S> OperationStore for Arc<S>
where
    S: OperationStore + ?Sized,
{
    fn save(&self, operation: StockOperation) -> Result<StockOperation, StoreError> {
        (**self).save(operation)
    }

    fn get(&self, id: OperationId) -> Result<Option<StockOperation>, StoreError> {
        (**self).get(id)
    }

    fn get_by_number(&self, number: &str) -> Result<Option<StockOperation>, StoreError> {
        (**self).get_by_number(number)
    }

    fn purge(&self, id: OperationId) -> Result<(), StoreError> {
        (**self).purge(id)
    }

    fn transactions_for(&self, id: OperationId) -> Result<Vec<StockOperationTransaction>, StoreError> {
        (**self).transactions_for(id)
    }
}
