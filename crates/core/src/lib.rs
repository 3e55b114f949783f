//! `stockops-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model and the small traits every inventory
//! aggregate implements.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    InstitutionId, ItemId, LocationId, OperationId, PatientId, StockroomId, TransactionId,
};
pub use value_object::ValueObject;
