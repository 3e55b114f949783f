//! Stock ledger boundary.
//!
//! Persistence of `ItemStock` aggregates and their lots, keyed by
//! (stockroom, item), without making any storage assumptions.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryStockLedger;
pub use r#trait::StockLedger;
