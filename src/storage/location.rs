use crate::archetype;
use crate::storage::Row;

/// The current home of an entity: its archetype and the row within it.
///
/// Updated on every structural change to the entity. For every live entity
/// the storage guarantees `archetype.entities()[row] == entity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// The archetype the entity belongs to.
    archetype: archetype::Id,

    /// The row the entity occupies in that archetype.
    row: Row,
}

impl Location {
    /// Create a new location from an archetype id and a row.
    #[inline]
    pub const fn new(archetype: archetype::Id, row: Row) -> Self {
        Self { archetype, row }
    }

    /// Get the archetype id for this location.
    #[inline]
    pub fn archetype(&self) -> archetype::Id {
        self.archetype
    }

    /// Get the row for this location.
    #[inline]
    pub fn row(&self) -> Row {
        self.row
    }
}
