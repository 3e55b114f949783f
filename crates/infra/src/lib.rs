//! Stock operations engine.
//!
//! Drives `stockops-inventory` operations against a stock ledger:
//!
//! ```text
//! submit
//!   ↓
//! 1. Validate and create reservations
//!   ↓
//! 2. Resolve reservations against source lots (ReservationResolver)
//!   ↓
//! 3. Run the operation type's status hook
//!   ↓
//! 4. Apply the resulting transactions (TransactionApplier)
//!   ↓
//! 5. Save the operation once
//! ```
//!
//! All of it runs under the one process-wide reentrant lock from
//! [`lock::global`], whichever service or handle started the work.
//! Stores are traits with in-memory implementations; nothing here performs IO
//! of its own.

pub mod applier;
pub mod catalog;
pub mod config;
pub mod dispense;
pub mod error;
pub mod ledger_store;
pub mod lifecycle;
pub mod lock;
pub mod operation_store;
pub mod operation_types;
pub mod resolver;


pub use applier::{ApplyTransactions, TransactionApplier};
pub use catalog::{Catalog, InMemoryCatalog};
pub use config::EngineConfig;
pub use dispense::{CallerContext, DispenseRequest, DispenseService};
pub use error::{EngineError, EngineResult, StoreError};
pub use ledger_store::{InMemoryStockLedger, StockLedger};
pub use lifecycle::StockOperationService;
pub use lock::{OperationGuard, OperationLock};
pub use operation_store::{InMemoryOperationStore, OperationStore};
pub use operation_types::{
    IncomingType, OperationTypeHandler, OperationTypeRegistry, OutgoingType, TransferType,
};
pub use resolver::ReservationResolver;
