use std::collections::HashMap;
use std::sync::RwLock;

use stockops_core::{AggregateRoot, ExpectedVersion, OperationId};
use stockops_inventory::{StockOperation, StockOperationTransaction};

use super::OperationStore;
use crate::error::StoreError;

/// In-memory operation store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOperationStore {
    operations: RwLock<HashMap<OperationId, StockOperation>>,
}

impl InMemoryOperationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperationStore for InMemoryOperationStore {
    fn save(&self, mut operation: StockOperation) -> Result<StockOperation, StoreError> {
        let mut operations = self.operations.write().map_err(|_| StoreError::Poisoned)?;
        let id = operation.id_typed();

        let current = operations.get(&id).map(|op| op.version()).unwrap_or(0);
        ExpectedVersion::Exact(operation.version())
            .check(current)
            .map_err(|e| StoreError::Concurrency(format!("operation {id}: {e}")))?;

        if operations
            .values()
            .any(|op| op.id_typed() != id && op.number() == operation.number())
        {
            return Err(StoreError::Conflict(format!(
                "operation number '{}' is already in use",
                operation.number()
            )));
        }

        operation.mark_persisted(current + 1);
        operations.insert(id, operation.clone());
        Ok(operation)
    }

    fn get(&self, id: OperationId) -> Result<Option<StockOperation>, StoreError> {
        let operations = self.operations.read().map_err(|_| StoreError::Poisoned)?;
        Ok(operations.get(&id).cloned())
    }

    fn get_by_number(&self, number: &str) -> Result<Option<StockOperation>, StoreError> {
        let operations = self.operations.read().map_err(|_| StoreError::Poisoned)?;
        Ok(operations.values().find(|op| op.number() == number).cloned())
    }

    fn purge(&self, id: OperationId) -> Result<(), StoreError> {
        let mut operations = self.operations.write().map_err(|_| StoreError::Poisoned)?;
        if let Some(op) = operations.get(&id) {
            if op.has_transactions() {
                return Err(StoreError::Conflict(
                    "stock operations can not be deleted if there are any associated transactions"
                        .to_string(),
                ));
            }
        }
        operations.remove(&id);
        Ok(())
    }

    fn transactions_for(&self, id: OperationId) -> Result<Vec<StockOperationTransaction>, StoreError> {
        let operations = self.operations.read().map_err(|_| StoreError::Poisoned)?;
        Ok(operations
            .get(&id)
            .map(|op| op.transactions().to_vec())
            .unwrap_or_default())
    }
}
