//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Non-event-sourced records (catalog products, ledger movements) implement
/// this instead of [`crate::AggregateRoot`].
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
