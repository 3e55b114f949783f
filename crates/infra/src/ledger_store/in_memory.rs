use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use stockops_core::{AggregateRoot, ExpectedVersion, ItemId, StockroomId};
use stockops_inventory::{ItemStock, LotId, StockKey};

use super::r#trait::StockLedger;
use crate::error::StoreError;

/// In-memory stock ledger.
///
/// Intended for tests/dev. Lot identities come from a process-local counter.
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    stocks: RwLock<BTreeMap<StockKey, ItemStock>>,
    next_lot: AtomicU64,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_version(
        stocks: &BTreeMap<StockKey, ItemStock>,
        stock: &ItemStock,
    ) -> Result<(), StoreError> {
        let current = stocks.get(&stock.key()).map(|s| s.version()).unwrap_or(0);
        ExpectedVersion::Exact(stock.version())
            .check(current)
            .map_err(|e| StoreError::Concurrency(format!("item stock {:?}: {e}", stock.key())))
    }
}

impl StockLedger for InMemoryStockLedger {
    fn get(&self, stockroom: StockroomId, item: ItemId) -> Result<Option<ItemStock>, StoreError> {
        let stocks = self.stocks.read().map_err(|_| StoreError::Poisoned)?;
        Ok(stocks.get(&StockKey::new(stockroom, item)).cloned())
    }

    fn save(&self, mut stock: ItemStock) -> Result<ItemStock, StoreError> {
        let mut stocks = self.stocks.write().map_err(|_| StoreError::Poisoned)?;
        Self::check_version(&stocks, &stock)?;

        let version = stock.version() + 1;
        stock.mark_persisted(version, || LotId(self.next_lot.fetch_add(1, Ordering::Relaxed) + 1));

        tracing::debug!(
            stockroom = %stock.stockroom(),
            item = %stock.item(),
            quantity = stock.quantity(),
            lots = stock.lots().len(),
            version,
            "item stock saved"
        );
        stocks.insert(stock.key(), stock.clone());
        Ok(stock)
    }

    fn purge(&self, stock: &ItemStock) -> Result<(), StoreError> {
        let mut stocks = self.stocks.write().map_err(|_| StoreError::Poisoned)?;
        Self::check_version(&stocks, stock)?;

        if stocks.remove(&stock.key()).is_some() {
            tracing::debug!(stockroom = %stock.stockroom(), item = %stock.item(), "item stock purged");
        }
        Ok(())
    }
}
