use std::collections::HashMap;

use crate::archetype::{self, Archetype};
use crate::component;

/// The inverted index from component id to the archetypes containing it.
///
/// For each component id, maps every archetype holding that component to
/// the position of its column, so queries resolve candidate archetypes and
/// accessors find columns without scanning specs:
/// `index[c][a] == i` exactly when `a.spec().ids()[i] == c`.
///
/// Entries are only ever added. Archetypes live until the storage is
/// destroyed, and archetypes that happen to be empty stay indexed; queries
/// tolerate and skip them.
#[derive(Default)]
pub(crate) struct ComponentIndex {
    map: HashMap<component::Id, HashMap<archetype::Id, usize>>,
}

impl ComponentIndex {
    /// Create an empty index.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a newly created archetype: record the column position of each
    /// of its components.
    pub fn insert_archetype(&mut self, archetype: &Archetype) {
        for (position, id) in archetype.spec().ids().iter().enumerate() {
            self.map
                .entry(*id)
                .or_default()
                .insert(archetype.id(), position);
        }
    }

    /// Get the archetypes containing a component, with column positions.
    #[inline]
    pub fn archetypes_with(
        &self,
        id: component::Id,
    ) -> Option<&HashMap<archetype::Id, usize>> {
        self.map.get(&id)
    }

    /// Get the column position of a component within an archetype.
    #[inline]
    pub fn column_of(&self, id: component::Id, archetype: archetype::Id) -> Option<usize> {
        self.map.get(&id)?.get(&archetype).copied()
    }

    /// Iterate every per-component archetype set in the index.
    pub fn archetype_sets(&self) -> impl Iterator<Item = &HashMap<archetype::Id, usize>> {
        self.map.values()
    }
}
