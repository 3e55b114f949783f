//! Value object trait: equality by value, not identity.
//!
//! Lot qualifiers are the main value objects in the inventory domain: two lots
//! with the same expiration and the same originating operation are the same lot
//! as far as stock accounting is concerned, whatever row identity they carry.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct LotQualifier {
///     expiration: Option<DateTime<Utc>>,
///     batch: Option<BatchOrigin>,
/// }
///
/// impl ValueObject for LotQualifier {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
