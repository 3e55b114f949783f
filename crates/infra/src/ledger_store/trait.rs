use std::sync::Arc;

use stockops_core::{ItemId, StockroomId};
use stockops_inventory::ItemStock;

use crate::error::StoreError;

/// Stock ledger store.
///
/// ## Versioning
///
/// Every aggregate carries the version it was loaded at. `save` and `purge`
/// refuse to act when the stored version has moved on, so a caller holding a
/// stale aggregate gets `StoreError::Concurrency` instead of silently
/// overwriting another writer. Callers must reload after any call that may
/// have applied transactions.
///
/// ## Implementation requirements
///
/// - `save` persists the aggregate and all of its lots, assigns identities to
///   new lots in canonical order, bumps the version and returns the stored copy
/// - `purge` removes the aggregate and its lots
/// - `get` returns lots in canonical order (ascending lot identity)
pub trait StockLedger: Send + Sync {
    fn get(&self, stockroom: StockroomId, item: ItemId) -> Result<Option<ItemStock>, StoreError>;

    fn save(&self, stock: ItemStock) -> Result<ItemStock, StoreError>;

    fn purge(&self, stock: &ItemStock) -> Result<(), StoreError>;
}

impl<S> StockLedger for Arc<S>
where
    S: StockLedger + ?Sized,
{
    fn get(&self, stockroom: StockroomId, item: ItemId) -> Result<Option<ItemStock>, StoreError> {
        (**self).get(stockroom, item)
    }

    fn save(&self, stock: ItemStock) -> Result<ItemStock, StoreError> {
        (**self).save(stock)
    }

    fn purge(&self, stock: &ItemStock) -> Result<(), StoreError> {
        (**self).purge(stock)
    }
}
