//! Operation lifecycle.
//!
//! `StockOperationService` drives operations through their status machine:
//!
//! ```text
//! submit   : NEW | REQUESTED -> PENDING   (reserve, resolve, on_pending)
//! complete : PENDING -> COMPLETED         (on_completed)
//! cancel   : PENDING -> CANCELLED         (on_cancelled)
//!            NEW | REQUESTED -> CANCELLED (status only)
//! ```
//!
//! Every transition holds the operation lock for its whole duration, works on
//! a copy of the caller's operation and saves it exactly once. The caller's
//! operation is only replaced by the saved copy when the transition succeeds.

use tracing::{info, instrument};

use stockops_core::{AggregateRoot, ItemId, OperationId, StockroomId};
use stockops_inventory::{ItemStock, StockOperation, StockOperationStatus, StockOperationTransaction};

use crate::applier::{ApplyTransactions, TransactionApplier};
use crate::error::{EngineError, EngineResult};
use crate::ledger_store::StockLedger;
use crate::lock;
use crate::operation_store::OperationStore;
use crate::operation_types::{OperationTypeHandler, OperationTypeRegistry};
use crate::resolver::ReservationResolver;

pub struct StockOperationService<L, O> {
    ledger: L,
    operations: O,
    resolver: ReservationResolver<L>,
    applier: TransactionApplier<L>,
    registry: OperationTypeRegistry,
}

impl<L, O> StockOperationService<L, O>
where
    L: StockLedger + Clone,
    O: OperationStore,
{
    /// Service with the built-in operation type handlers.
    pub fn new(ledger: L, operations: O) -> Self {
        Self::with_registry(ledger, operations, OperationTypeRegistry::with_defaults())
    }

    pub fn with_registry(ledger: L, operations: O, registry: OperationTypeRegistry) -> Self {
        Self {
            resolver: ReservationResolver::new(ledger.clone()),
            applier: TransactionApplier::new(ledger.clone()),
            ledger,
            operations,
            registry,
        }
    }

    /// Reserve and resolve the operation's stock, then move it to PENDING.
    #[instrument(
        skip(self, operation),
        fields(operation = %operation.id_typed(), number = %operation.number(), kind = %operation.kind()),
        err
    )]
    pub fn submit(&self, operation: &mut StockOperation) -> EngineResult<()> {
        operation.validate()?;
        let status = operation.status();
        if !status.accepts_submit() {
            return Err(EngineError::InvalidTransition {
                action: "submit",
                status,
            });
        }

        let _guard = lock::global().acquire();
        self.ensure_current(operation)?;
        self.ensure_number_available(operation)?;

        let mut working = operation.clone();
        working.clear_reserved();
        working.create_reservations()?;
        self.resolver.resolve(&mut working)?;

        working.set_status(StockOperationStatus::Pending);
        self.handler_for(&working)?.on_pending(&mut working, &self.applier)?;

        *operation = self.operations.save(working)?;
        info!(
            reserved = operation.reserved().len(),
            applied = operation.transactions().len(),
            "stock operation submitted"
        );
        Ok(())
    }

    /// Finish a PENDING operation.
    #[instrument(
        skip(self, operation),
        fields(operation = %operation.id_typed(), number = %operation.number()),
        err
    )]
    pub fn complete(&self, operation: &mut StockOperation) -> EngineResult<()> {
        let status = operation.status();
        if status != StockOperationStatus::Pending {
            return Err(EngineError::InvalidTransition {
                action: "complete",
                status,
            });
        }

        let _guard = lock::global().acquire();
        self.ensure_current(operation)?;
        let mut working = operation.clone();
        self.handler_for(&working)?.on_completed(&mut working, &self.applier)?;
        working.set_status(StockOperationStatus::Completed);

        *operation = self.operations.save(working)?;
        info!(applied = operation.transactions().len(), "stock operation completed");
        Ok(())
    }

    /// Cancel an operation that has not finished yet.
    #[instrument(
        skip(self, operation),
        fields(operation = %operation.id_typed(), number = %operation.number()),
        err
    )]
    pub fn cancel(&self, operation: &mut StockOperation) -> EngineResult<()> {
        let status = operation.status();
        let _guard = lock::global().acquire();
        self.ensure_current(operation)?;
        let mut working = operation.clone();

        match status {
            StockOperationStatus::Pending => {
                self.handler_for(&working)?.on_cancelled(&mut working, &self.applier)?;
            }
            StockOperationStatus::New | StockOperationStatus::Requested => {}
            _ => {
                return Err(EngineError::InvalidTransition {
                    action: "cancel",
                    status,
                });
            }
        }
        working.set_status(StockOperationStatus::Cancelled);

        *operation = self.operations.save(working)?;
        info!(from = %status, "stock operation cancelled");
        Ok(())
    }

    /// Apply transactions directly to the ledger.
    pub fn apply_transactions(&self, transactions: &[StockOperationTransaction]) -> EngineResult<()> {
        self.applier.apply_transactions(transactions)
    }

    pub fn stock(&self, stockroom: StockroomId, item: ItemId) -> EngineResult<Option<ItemStock>> {
        Ok(self.ledger.get(stockroom, item)?)
    }

    /// Total quantity of an item in a stockroom (0 when none is held).
    pub fn quantity(&self, stockroom: StockroomId, item: ItemId) -> EngineResult<i64> {
        Ok(self.stock(stockroom, item)?.map(|s| s.quantity()).unwrap_or(0))
    }

    pub fn operation(&self, id: OperationId) -> EngineResult<Option<StockOperation>> {
        Ok(self.operations.get(id)?)
    }

    pub fn operation_by_number(&self, number: &str) -> EngineResult<Option<StockOperation>> {
        Ok(self.operations.get_by_number(number)?)
    }

    /// Delete an operation; refused while it owns any transaction.
    pub fn purge_operation(&self, id: OperationId) -> EngineResult<()> {
        let _guard = lock::global().acquire();
        Ok(self.operations.purge(id)?)
    }

    fn handler_for(&self, operation: &StockOperation) -> EngineResult<&dyn OperationTypeHandler> {
        self.registry.handler(operation.kind())
    }

    // A copy that is behind the stored operation must not reach the hooks:
    // the store would reject the save only after the ledger had moved.
    fn ensure_current(&self, operation: &StockOperation) -> EngineResult<()> {
        match self.operations.get(operation.id_typed())? {
            Some(stored)
                if stored.version() != operation.version() || stored.status() != operation.status() =>
            {
                Err(EngineError::Conflict(format!(
                    "operation '{}' is at version {} ({}), caller holds version {} ({})",
                    operation.number(),
                    stored.version(),
                    stored.status(),
                    operation.version(),
                    operation.status()
                )))
            }
            None if operation.version() != 0 => Err(EngineError::Conflict(format!(
                "operation '{}' no longer exists",
                operation.number()
            ))),
            _ => Ok(()),
        }
    }

    // The store checks this too, but only after the hooks have written to the
    // ledger.
    fn ensure_number_available(&self, operation: &StockOperation) -> EngineResult<()> {
        match self.operations.get_by_number(operation.number())? {
            Some(existing) if existing.id() != operation.id() => Err(EngineError::Conflict(format!(
                "operation number '{}' is already in use",
                operation.number()
            ))),
            _ => Ok(()),
        }
    }
}
