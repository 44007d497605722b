//! Archetypes: the storage for one exact component set.
//!
//! An archetype owns every entity whose component set is exactly its spec,
//! one type-erased column per component id, plus a parallel list of entity
//! handles. Columns move in lock-step: for every column, its length equals
//! the entity count, and one row index addresses the entity's value in each
//! column.
//!
//! Rows stay dense through swap-remove, which reorders entities within the
//! archetype; iteration order is not a contract.

use crate::component::{self, Info, Spec};
use crate::entity::Entity;
use crate::storage::column::Column;
use crate::storage::Row;

/// A content-addressed archetype identifier.
///
/// Derived by hashing the sorted component-id list, so two archetypes with
/// identical component sets share one id and one instance. The empty set
/// hashes to the reserved [`Id::EMPTY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(u64);

impl Id {
    /// The id of the empty archetype, always present in a storage.
    pub const EMPTY: Id = Id(0);

    /// Derive the archetype id for a component set.
    ///
    /// Each component id is mixed through a full-width 64-bit finalizer
    /// before being folded in, so ids whose entropy sits in the high bits
    /// still spread across the whole hash. Seeding with the list length
    /// makes the empty set come out as id 0.
    pub fn from_spec(spec: &Spec) -> Self {
        let mut hash = spec.len() as u64;
        for id in spec.ids() {
            let mixed = splitmix64(id.value());
            hash ^= mixed
                .wrapping_add(0x9e37_79b9_7f4a_7c15)
                .wrapping_add(hash << 6)
                .wrapping_add(hash >> 2);
        }
        Id(hash)
    }

    /// Get the raw identifier value.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

/// The splitmix64 finalizer.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// The population of entities whose component set is exactly the spec.
///
/// # Invariants
/// - the spec's component ids are strictly ascending
/// - columns follow the spec's order; every column length equals the entity
///   count
pub struct Archetype {
    /// The content-addressed identifier.
    id: Id,

    /// The component set, in canonical order.
    spec: Spec,

    /// The entities stored in this archetype (one per row).
    entities: Vec<Entity>,

    /// One column per component id, in spec order.
    columns: Vec<Column>,
}

impl Archetype {
    /// Create an empty archetype from component descriptors.
    ///
    /// The descriptors must already be sorted by component id and free of
    /// duplicates.
    pub(crate) fn new(id: Id, infos: &[Info]) -> Self {
        let spec = Spec::new(infos.iter().map(|info| info.id()).collect::<Vec<_>>());
        debug_assert_eq!(
            spec.len(),
            infos.len(),
            "component descriptors must be sorted and unique"
        );
        debug_assert_eq!(Id::from_spec(&spec), id);
        Self {
            id,
            spec,
            entities: Vec::new(),
            columns: infos.iter().map(|info| Column::new(*info)).collect(),
        }
    }

    /// Get the archetype's identifier.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the archetype's component set.
    #[inline]
    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Get the number of entities (rows) in the archetype.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the archetype holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get the entities stored in this archetype.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Determine if the archetype contains the given component.
    #[inline]
    pub fn has(&self, id: component::Id) -> bool {
        self.spec.contains(id)
    }

    /// Determine if the archetype contains every component in `other`.
    #[inline]
    pub fn has_all(&self, other: &Spec) -> bool {
        self.spec.contains_all(other)
    }

    /// Determine if the archetype contains no component from `other`.
    #[inline]
    pub fn has_none(&self, other: &Spec) -> bool {
        self.spec.contains_none(other)
    }

    /// Get the column at the given spec position.
    #[inline]
    pub(crate) fn column(&self, position: usize) -> &Column {
        &self.columns[position]
    }

    /// Get the mutable column at the given spec position.
    #[inline]
    pub(crate) fn column_mut(&mut self, position: usize) -> &mut Column {
        &mut self.columns[position]
    }

    /// Iterate the descriptors of the archetype's columns, in spec order.
    pub(crate) fn column_infos(&self) -> impl Iterator<Item = Info> + '_ {
        self.columns.iter().map(|column| *column.info())
    }

    /// Append an entity, growing every column by one uninitialised slot.
    /// Returns the new row.
    ///
    /// # Safety
    /// The caller must initialise the slot of every column at the returned
    /// row before the row is read, destructively removed, or the archetype
    /// is dropped.
    pub(crate) unsafe fn add_entity(&mut self, entity: Entity) -> Row {
        let row = Row::new(self.entities.len());
        self.entities.push(entity);
        for column in &mut self.columns {
            column.reserve(1);
            // SAFETY: the slot was just reserved; the caller contract covers
            // its initialisation
            unsafe { column.set_len(row.index() + 1) };
        }
        row
    }

    /// Swap-remove the row without running any destructor. The caller has
    /// moved every column's element elsewhere byte-wise.
    ///
    /// Returns the entity that moved into the vacated row, if any, so the
    /// storage can update its location.
    pub(crate) fn take_out_row(&mut self, row: Row) -> Option<Entity> {
        debug_assert!(row.index() < self.entities.len(), "row index out of bounds");
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row.index());
        for column in &mut self.columns {
            // SAFETY: the row is in bounds; elements were moved out by the
            // caller
            unsafe { column.swap_remove_no_drop(row) };
        }
        self.moved_entity(row, last)
    }

    /// Swap-remove the row, running each column's destructor on the evicted
    /// element.
    ///
    /// Returns the entity that moved into the vacated row, if any.
    pub(crate) fn delete_row(&mut self, row: Row) -> Option<Entity> {
        debug_assert!(row.index() < self.entities.len(), "row index out of bounds");
        let last = self.entities.len() - 1;
        self.entities.swap_remove(row.index());
        for column in &mut self.columns {
            // SAFETY: the row is in bounds and initialized
            unsafe { column.swap_remove(row) };
        }
        self.moved_entity(row, last)
    }

    /// Delete every entity, running every destructor. Returns the drained
    /// entity handles so the storage can clear their locations.
    pub(crate) fn delete_all_entities(&mut self) -> Vec<Entity> {
        for column in &mut self.columns {
            column.clear();
        }
        std::mem::take(&mut self.entities)
    }

    /// The entity displaced into `row` by a swap-remove, if the removed row
    /// was not the last.
    fn moved_entity(&self, row: Row, last: usize) -> Option<Entity> {
        if row.index() == last {
            return None;
        }
        let moved = self.entities[row.index()];
        #[cfg(debug_assertions)]
        self.verify_invariants();
        Some(moved)
    }

    /// Verify that every column matches the entity count.
    ///
    /// # Panics
    /// Panics if a column length diverged from the entity list.
    #[cfg(debug_assertions)]
    pub(crate) fn verify_invariants(&self) {
        for (position, column) in self.columns.iter().enumerate() {
            assert_eq!(
                column.len(),
                self.entities.len(),
                "column {} out of lock-step with the entity list",
                position,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Comp1(#[allow(dead_code)] u32);
    struct Comp2(#[allow(dead_code)] u32);
    struct Comp3(#[allow(dead_code)] u32);

    fn sorted_infos() -> Vec<Info> {
        let mut infos = vec![Info::of::<Comp1>(), Info::of::<Comp2>()];
        infos.sort_by_key(|info| info.id());
        infos
    }

    #[test]
    fn id_is_content_addressed() {
        // Given
        let spec_a = Spec::new(vec![component::Id::of::<Comp1>(), component::Id::of::<Comp2>()]);
        let spec_b = Spec::new(vec![component::Id::of::<Comp2>(), component::Id::of::<Comp1>()]);
        let spec_c = Spec::new(vec![component::Id::of::<Comp1>(), component::Id::of::<Comp3>()]);

        // Then - same set, same id; different set, different id
        assert_eq!(Id::from_spec(&spec_a), Id::from_spec(&spec_b));
        assert_ne!(Id::from_spec(&spec_a), Id::from_spec(&spec_c));
    }

    #[test]
    fn empty_spec_hashes_to_reserved_id() {
        assert_eq!(Id::from_spec(&Spec::EMPTY), Id::EMPTY);
    }

    #[test]
    fn membership_checks() {
        // Given
        let infos = sorted_infos();
        let archetype = Archetype::new(Id::from_spec(&Spec::new(
            infos.iter().map(|i| i.id()).collect::<Vec<_>>(),
        )), &infos);

        // Then
        assert!(archetype.has(component::Id::of::<Comp1>()));
        assert!(!archetype.has(component::Id::of::<Comp3>()));
        assert!(archetype.has_all(&Spec::new(vec![component::Id::of::<Comp1>()])));
        assert!(archetype.has_all(&Spec::EMPTY));
        assert!(archetype.has_none(&Spec::new(vec![component::Id::of::<Comp3>()])));
        assert!(archetype.has_none(&Spec::EMPTY));
        assert!(!archetype.has_none(&Spec::new(vec![component::Id::of::<Comp2>()])));
    }

    #[test]
    fn add_entity_grows_columns_in_lock_step() {
        // Given
        let infos = sorted_infos();
        let id = Id::from_spec(&Spec::new(infos.iter().map(|i| i.id()).collect::<Vec<_>>()));
        let mut archetype = Archetype::new(id, &infos);

        // When - append a row and initialise both columns
        let entity = Entity::from_raw(1);
        let row = unsafe { archetype.add_entity(entity) };
        let pos1 = archetype.spec().position(component::Id::of::<Comp1>()).unwrap();
        let pos2 = archetype.spec().position(component::Id::of::<Comp2>()).unwrap();
        unsafe {
            archetype.column_mut(pos1).write(row, Comp1(10));
            archetype.column_mut(pos2).write(row, Comp2(20));
        }

        // Then
        assert_eq!(archetype.len(), 1);
        assert_eq!(archetype.entities(), &[entity]);
        assert_eq!(archetype.column(0).len(), 1);
        assert_eq!(archetype.column(1).len(), 1);
    }

    #[test]
    fn delete_row_reports_displaced_entity() {
        // Given
        let infos = sorted_infos();
        let id = Id::from_spec(&Spec::new(infos.iter().map(|i| i.id()).collect::<Vec<_>>()));
        let mut archetype = Archetype::new(id, &infos);
        let first = Entity::from_raw(1);
        let second = Entity::from_raw(2);
        for entity in [first, second] {
            let row = unsafe { archetype.add_entity(entity) };
            unsafe {
                archetype.column_mut(0).write(row, Comp1(entity.id() as u32));
                archetype.column_mut(1).write(row, Comp2(entity.id() as u32));
            }
        }

        // When - delete the first row
        let moved = archetype.delete_row(Row::new(0));

        // Then - the second entity was swapped into row 0
        assert_eq!(moved, Some(second));
        assert_eq!(archetype.len(), 1);
        assert_eq!(archetype.entities(), &[second]);

        // And deleting the only remaining row displaces nothing
        assert_eq!(archetype.delete_row(Row::new(0)), None);
        assert!(archetype.is_empty());
    }
}
