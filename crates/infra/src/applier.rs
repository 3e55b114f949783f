//! Transaction application.
//!
//! Applies finalized transactions to the stock ledger. Application is not
//! idempotent: applying the same transactions twice doubles their effect.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use stockops_core::AggregateRoot;
use stockops_inventory::{ItemStock, LotDelta, StockKey, StockOperationTransaction};

use crate::error::EngineResult;
use crate::ledger_store::StockLedger;
use crate::lock::{self, OperationLock};

/// Something that can push transactions into the ledger.
///
/// Operation type handlers receive this rather than a concrete applier.
pub trait ApplyTransactions: Send + Sync {
    fn apply_transactions(&self, transactions: &[StockOperationTransaction]) -> EngineResult<()>;
}

pub struct TransactionApplier<L> {
    ledger: L,
    lock: &'static OperationLock,
}

impl<L: StockLedger> TransactionApplier<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            lock: lock::global(),
        }
    }

    fn apply_group(&self, key: StockKey, deltas: &[LotDelta]) -> EngineResult<()> {
        let mut stock = self
            .ledger
            .get(key.stockroom, key.item)?
            .unwrap_or_else(|| ItemStock::empty(key.stockroom, key.item));

        let outcome = stock.apply_deltas(deltas);
        debug!(
            stockroom = %key.stockroom,
            item = %key.item,
            net = outcome.net,
            quantity = stock.quantity(),
            "transactions applied to item stock"
        );

        if stock.quantity() <= 0 {
            if stock.version() > 0 {
                self.ledger.purge(&stock)?;
            }
        } else {
            self.ledger.save(stock)?;
        }
        Ok(())
    }
}

impl<L: StockLedger> ApplyTransactions for TransactionApplier<L> {
    #[instrument(skip(self, transactions), fields(count = transactions.len()), err)]
    fn apply_transactions(&self, transactions: &[StockOperationTransaction]) -> EngineResult<()> {
        if transactions.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.acquire();

        let mut groups: BTreeMap<StockKey, Vec<LotDelta>> = BTreeMap::new();
        for tx in transactions {
            groups
                .entry(StockKey::new(tx.stockroom, tx.item))
                .or_default()
                .push(tx.lot_delta());
        }

        for (key, deltas) in &groups {
            self.apply_group(*key, deltas)?;
        }
        Ok(())
    }
}

impl<A> ApplyTransactions for Arc<A>
where
    A: ApplyTransactions + ?Sized,
{
    fn apply_transactions(&self, transactions: &[StockOperationTransaction]) -> EngineResult<()> {
        (**self).apply_transactions(transactions)
    }
}
