//! Entity trait: identity + continuity across state changes.

use crate::id::CompanyId;

/// Entity marker + minimal interface.
///
/// Every entity in this system is owned by exactly one company.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Owning company (immutable after creation).
    fn company_id(&self) -> CompanyId;
}
