//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values: a
/// kilogram is a kilogram wherever it appears.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
