//! Operation type handlers.
//!
//! Each operation kind reacts to status transitions by turning its
//! reservations into applied transactions against the right stockroom. Handlers
//! are looked up by kind in an [`OperationTypeRegistry`]; custom handlers can
//! replace the built-in ones.

use std::collections::HashMap;

use stockops_core::StockroomId;
use stockops_inventory::{OperationKind, StockOperation, StockOperationTransaction};

use crate::applier::ApplyTransactions;
use crate::error::{EngineError, EngineResult};
use crate::lock;

/// Status-transition hooks of one operation kind.
///
/// Hooks run while the operation lock is held and may call back into the
/// applier.
pub trait OperationTypeHandler: Send + Sync {
    fn kind(&self) -> OperationKind;

    fn on_pending(&self, operation: &mut StockOperation, applier: &dyn ApplyTransactions) -> EngineResult<()>;

    fn on_completed(&self, operation: &mut StockOperation, applier: &dyn ApplyTransactions) -> EngineResult<()>;

    fn on_cancelled(&self, operation: &mut StockOperation, applier: &dyn ApplyTransactions) -> EngineResult<()>;
}

/// Stock entering a destination (receipts and returns).
///
/// Nothing moves until completion.
#[derive(Debug, Clone, Copy)]
pub struct IncomingType(pub OperationKind);

impl OperationTypeHandler for IncomingType {
    fn kind(&self) -> OperationKind {
        self.0
    }

    fn on_pending(&self, _operation: &mut StockOperation, _applier: &dyn ApplyTransactions) -> EngineResult<()> {
        Ok(())
    }

    fn on_completed(&self, operation: &mut StockOperation, applier: &dyn ApplyTransactions) -> EngineResult<()> {
        let destination = operation.destination();
        apply_reserved(operation, applier, destination, 1)?;
        operation.clear_reserved();
        Ok(())
    }

    fn on_cancelled(&self, operation: &mut StockOperation, _applier: &dyn ApplyTransactions) -> EngineResult<()> {
        operation.clear_reserved();
        Ok(())
    }
}

/// Stock leaving a source (distributions, disposals and adjustments).
///
/// The source is debited as soon as the operation is pending and credited back
/// if it is cancelled. Adjustment reservations carry the negated delta, so the
/// same debit applies the requested change.
#[derive(Debug, Clone, Copy)]
pub struct OutgoingType(pub OperationKind);

impl OperationTypeHandler for OutgoingType {
    fn kind(&self) -> OperationKind {
        self.0
    }

    fn on_pending(&self, operation: &mut StockOperation, applier: &dyn ApplyTransactions) -> EngineResult<()> {
        let source = operation.source();
        apply_reserved(operation, applier, source, -1)
    }

    fn on_completed(&self, operation: &mut StockOperation, _applier: &dyn ApplyTransactions) -> EngineResult<()> {
        operation.clear_reserved();
        Ok(())
    }

    fn on_cancelled(&self, operation: &mut StockOperation, applier: &dyn ApplyTransactions) -> EngineResult<()> {
        let source = operation.source();
        apply_reserved(operation, applier, source, 1)?;
        operation.clear_reserved();
        Ok(())
    }
}

/// Stock moving from a source to a destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferType;

impl OperationTypeHandler for TransferType {
    fn kind(&self) -> OperationKind {
        OperationKind::Transfer
    }

    fn on_pending(&self, operation: &mut StockOperation, applier: &dyn ApplyTransactions) -> EngineResult<()> {
        let source = operation.source();
        apply_reserved(operation, applier, source, -1)
    }

    fn on_completed(&self, operation: &mut StockOperation, applier: &dyn ApplyTransactions) -> EngineResult<()> {
        let destination = operation.destination();
        apply_reserved(operation, applier, destination, 1)?;
        operation.clear_reserved();
        Ok(())
    }

    fn on_cancelled(&self, operation: &mut StockOperation, applier: &dyn ApplyTransactions) -> EngineResult<()> {
        let source = operation.source();
        apply_reserved(operation, applier, source, 1)?;
        operation.clear_reserved();
        Ok(())
    }
}

/// Convert every reservation into an applied transaction of `sign * quantity`
/// against `stockroom`, apply them and record them on the operation.
///
/// Must run under the operation lock so the reservations still match the lots
/// they were resolved against.
fn apply_reserved(
    operation: &mut StockOperation,
    applier: &dyn ApplyTransactions,
    stockroom: Option<StockroomId>,
    sign: i64,
) -> EngineResult<()> {
    if !lock::global().is_held_by_current_thread() {
        return Err(EngineError::InvariantViolation(
            "operation type hooks must run under the operation lock".to_string(),
        ));
    }

    let stockroom = stockroom.ok_or_else(|| {
        EngineError::validation(format!(
            "operation {} has no stockroom to apply its transactions to",
            operation.number()
        ))
    })?;

    let applied = operation
        .reserved()
        .iter()
        .map(|tx| {
            let quantity = tx.quantity.checked_mul(sign).ok_or_else(|| {
                EngineError::validation(format!(
                    "quantity for item '{}' is out of range",
                    tx.item.name
                ))
            })?;
            Ok(tx.to_applied(stockroom, quantity))
        })
        .collect::<EngineResult<Vec<StockOperationTransaction>>>()?;

    applier.apply_transactions(&applied)?;
    for tx in applied {
        operation.record_transaction(tx);
    }
    Ok(())
}

/// Operation kind -> handler lookup.
pub struct OperationTypeRegistry {
    handlers: HashMap<OperationKind, Box<dyn OperationTypeHandler>>,
}

impl OperationTypeRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with a handler for every built-in kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(IncomingType(OperationKind::Receipt));
        registry.register(IncomingType(OperationKind::Return));
        registry.register(OutgoingType(OperationKind::Distribution));
        registry.register(OutgoingType(OperationKind::Disposal));
        registry.register(OutgoingType(OperationKind::Adjustment));
        registry.register(TransferType);
        registry
    }

    /// Register (or replace) the handler for its kind.
    pub fn register<H>(&mut self, handler: H)
    where
        H: OperationTypeHandler + 'static,
    {
        self.handlers.insert(handler.kind(), Box::new(handler));
    }

    pub fn handler(&self, kind: OperationKind) -> EngineResult<&dyn OperationTypeHandler> {
        self.handlers
            .get(&kind)
            .map(|h| h.as_ref())
            .ok_or_else(|| EngineError::validation(format!("no handler registered for operation type {kind}")))
    }
}

impl Default for OperationTypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
