//! Inventory domain module.
//!
//! Items, stockrooms, lot-level stock and stock operations, implemented purely
//! as deterministic domain logic (no IO, no storage, no locking). The engine
//! that drives these types against a ledger lives in `stockops-infra`.

pub mod allocation;
pub mod catalog;
pub mod operation;
pub mod stock;

pub use catalog::{Item, Stockroom};
pub use operation::{
    OperationItem, OperationKind, Recipient, ReservedTransaction, StockOperation,
    StockOperationStatus, StockOperationTransaction,
};
pub use stock::{BatchOrigin, ItemStock, Lot, LotApplyOutcome, LotDelta, LotId, LotQualifier, StockKey};
