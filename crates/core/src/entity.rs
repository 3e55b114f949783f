//! Reference data with a stable identity.

/// Catalog records (items, stockrooms) are looked up by identity and never
/// versioned; edits replace the record under the same id.
///
/// Unlike an [`crate::AggregateRoot`], an entity carries no concurrency
/// version and owns no children.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Identity the catalog indexes this record by.
    fn id(&self) -> &Self::Id;
}
