//! The archetype storage: the top-level container of the store.
//!
//! [`ArchetypeStorage`] owns every archetype, keyed by content-addressed
//! archetype id, an entity-location map giving each live entity's archetype
//! and row, and the inverted [`index`] from component id to the archetypes
//! containing it.
//!
//! Structural operations keep three structures coherent:
//!
//! - the archetype table: archetypes are created lazily the first time a
//!   component set is needed and live until the storage is destroyed
//! - the location map: every structural change to an entity rewrites its
//!   entry, including the entry of any entity displaced by a swap-remove
//! - the inverted index: extended whenever an archetype is created, never
//!   shrunk
//!
//! Migration between archetypes is a byte copy. When a component is added
//! or removed, the entity's remaining component values move to the target
//! archetype via raw copies with no constructor or destructor involved; the
//! source row is then taken out without destruction. Handles stay valid
//! across migration; raw component borrows do not survive any structural
//! change (the borrow checker enforces this).
//!
//! Misuse is fatal: operations on unknown entity handles panic. Expected
//! absences (adding a component twice, removing an absent component) are
//! silent no-ops; a doubly added value is destroyed rather than applied.

use std::collections::HashMap;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use crate::archetype::{self, Archetype};
use crate::component::{self, Component, Info, Registry};
use crate::entity::{Allocator, Entity};
use crate::storage::index::ComponentIndex;

pub(crate) mod column;
pub(crate) mod index;
mod location;
pub(crate) mod mem;
mod row;

pub use location::Location;
pub use row::Row;

/// The archetype storage: entities grouped by exact component set, with
/// per-archetype columnar component data.
pub struct ArchetypeStorage {
    /// Every archetype, in creation order. Slots are stable; archetypes are
    /// never destroyed before the storage is.
    archetypes: Vec<Archetype>,

    /// Map from content-addressed archetype id to its slot.
    by_id: HashMap<archetype::Id, usize>,

    /// The current home of every live entity.
    locations: HashMap<Entity, Location>,

    /// The inverted component-to-archetype index.
    index: ComponentIndex,

    /// Mints entity handles; ids are never reused.
    allocator: Allocator,

    /// Descriptors of every component type seen so far.
    registry: Registry,
}

impl Default for ArchetypeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchetypeStorage {
    /// Create an empty storage. The empty archetype (id 0) always exists;
    /// newly created entities live there.
    pub fn new() -> Self {
        let empty = Archetype::new(archetype::Id::EMPTY, &[]);
        Self {
            by_id: HashMap::from([(empty.id(), 0)]),
            archetypes: vec![empty],
            locations: HashMap::new(),
            index: ComponentIndex::new(),
            allocator: Allocator::new(),
            registry: Registry::new(),
        }
    }

    /// Create a new entity. The handle is minted fresh (never reused) and
    /// the entity is placed in the empty archetype.
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.allocator.alloc();
        let slot = self.by_id[&archetype::Id::EMPTY];
        // SAFETY: the empty archetype has no columns, nothing to initialise
        let row = unsafe { self.archetypes[slot].add_entity(entity) };
        self.locations
            .insert(entity, Location::new(archetype::Id::EMPTY, row));
        log::trace!("created entity {}", entity.id());
        #[cfg(debug_assertions)]
        self.verify_invariants();
        entity
    }

    /// Delete an entity, destroying each of its component values.
    ///
    /// # Panics
    /// Panics if the handle is unknown (stale or never created).
    pub fn delete_entity(&mut self, entity: Entity) {
        let location = self.location_of(entity);
        self.locations.remove(&entity);
        let slot = self.slot_of(location.archetype());
        if let Some(moved) = self.archetypes[slot].delete_row(location.row()) {
            self.locations.insert(moved, location);
        }
        log::trace!("deleted entity {}", entity.id());
        #[cfg(debug_assertions)]
        self.verify_invariants();
    }

    /// Add a component to an entity, migrating it to the archetype whose
    /// component set is the current one plus `C`.
    ///
    /// Adding a component the entity already has is a no-op that destroys
    /// the supplied value; the original value wins.
    ///
    /// # Panics
    /// Panics if the handle is unknown.
    pub fn add_component<C: Component>(&mut self, entity: Entity, value: C) {
        let info = self.registry.register::<C>();
        let mut value = ManuallyDrop::new(value);
        // SAFETY: the value is never used again here; ownership of its bytes
        // transfers to the storage (or its destructor runs on the no-op path)
        unsafe {
            self.add_component_dynamic(entity, info, NonNull::from(&mut *value).cast());
        }
    }

    /// Remove a component from an entity, migrating it to the archetype
    /// whose component set is the current one minus `C`. Removing an absent
    /// component is a no-op.
    ///
    /// # Panics
    /// Panics if the handle is unknown.
    pub fn remove_component<C: Component>(&mut self, entity: Entity) {
        self.remove_component_dynamic(entity, component::Id::of::<C>());
    }

    /// The type-erased core of component addition, shared by the typed API
    /// and command replay. The payload bytes are copied into the target
    /// column, never re-constructed.
    ///
    /// # Safety
    /// `value` must point to a valid, initialized value of the described
    /// component type. Ownership transfers: the bytes are either adopted by
    /// the storage or destroyed (double add), so the caller must not touch
    /// the value afterwards.
    pub(crate) unsafe fn add_component_dynamic(
        &mut self,
        entity: Entity,
        info: Info,
        value: NonNull<u8>,
    ) {
        let location = self.location_of(entity);
        let src_slot = self.slot_of(location.archetype());

        if self.archetypes[src_slot].has(info.id()) {
            // The entity already has this component: keep the original
            // value, destroy the new one.
            unsafe { (info.drop_fn())(value) };
            return;
        }

        // The target component set is the current one with the new id
        // inserted at its sorted position.
        let insert_at = self.archetypes[src_slot]
            .spec()
            .ids()
            .partition_point(|id| *id < info.id());
        let mut infos: Vec<Info> = self.archetypes[src_slot].column_infos().collect();
        infos.insert(insert_at, info);

        let dst_id = self.get_or_create_archetype(&infos);
        let dst_slot = self.slot_of(dst_id);
        let (src, dst) = Self::two_archetypes_mut(&mut self.archetypes, src_slot, dst_slot);

        // SAFETY: every column of the new row is initialised in the loop
        // below, either with the fresh value or with bytes from the source
        let dst_row = unsafe { dst.add_entity(entity) };
        for position in 0..dst.spec().len() {
            // SAFETY: source and destination columns share a component type
            // by construction; the source row is live until taken out below
            unsafe {
                if position == insert_at {
                    dst.column_mut(position).write_bytes(dst_row, value);
                } else {
                    let src_position = if position < insert_at {
                        position
                    } else {
                        position - 1
                    };
                    let bytes = src.column(src_position).read_ptr(location.row());
                    dst.column_mut(position).write_bytes(dst_row, bytes);
                }
            }
        }

        // Ownership moved byte-wise; the source row is taken out with no
        // destructors run.
        let moved = src.take_out_row(location.row());
        self.locations.insert(entity, Location::new(dst_id, dst_row));
        if let Some(moved) = moved {
            self.locations.insert(moved, location);
        }
        #[cfg(debug_assertions)]
        self.verify_invariants();
    }

    /// The type-erased core of component removal, shared by the typed API
    /// and command replay.
    pub(crate) fn remove_component_dynamic(&mut self, entity: Entity, id: component::Id) {
        let location = self.location_of(entity);
        let src_slot = self.slot_of(location.archetype());

        let Some(remove_at) = self.archetypes[src_slot].spec().position(id) else {
            // Removing an absent component is identity.
            return;
        };

        let mut infos: Vec<Info> = self.archetypes[src_slot].column_infos().collect();
        infos.remove(remove_at);

        let dst_id = self.get_or_create_archetype(&infos);
        let dst_slot = self.slot_of(dst_id);
        let (src, dst) = Self::two_archetypes_mut(&mut self.archetypes, src_slot, dst_slot);

        // SAFETY: every destination column is initialised in the loop below
        let dst_row = unsafe { dst.add_entity(entity) };
        for src_position in 0..src.spec().len() {
            // SAFETY: the source row is live until taken out below; matching
            // columns share a component type by construction
            unsafe {
                if src_position == remove_at {
                    // The removed component is destroyed in place.
                    let bytes = src.column(src_position).read_ptr(location.row());
                    (src.column(src_position).info().drop_fn())(bytes);
                } else {
                    let dst_position = if src_position < remove_at {
                        src_position
                    } else {
                        src_position - 1
                    };
                    let bytes = src.column(src_position).read_ptr(location.row());
                    dst.column_mut(dst_position).write_bytes(dst_row, bytes);
                }
            }
        }

        let moved = src.take_out_row(location.row());
        self.locations.insert(entity, Location::new(dst_id, dst_row));
        if let Some(moved) = moved {
            self.locations.insert(moved, location);
        }
        #[cfg(debug_assertions)]
        self.verify_invariants();
    }

    /// Get a reference to an entity's component.
    ///
    /// Returns `None` when the entity is not live or lacks the component.
    /// The borrow is valid only until the next structural mutation.
    pub fn get_component<C: Component>(&self, entity: Entity) -> Option<&C> {
        let location = *self.locations.get(&entity)?;
        let position = self
            .index
            .column_of(component::Id::of::<C>(), location.archetype())?;
        let slot = self.slot_of(location.archetype());
        // SAFETY: the inverted index ties this position to the component id;
        // the column's own type check guards the cast
        unsafe { self.archetypes[slot].column(position).get(location.row()) }
    }

    /// Get a mutable reference to an entity's component.
    ///
    /// Returns `None` when the entity is not live or lacks the component.
    pub fn get_component_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        let location = *self.locations.get(&entity)?;
        let position = self
            .index
            .column_of(component::Id::of::<C>(), location.archetype())?;
        let slot = self.slot_of(location.archetype());
        // SAFETY: as in get_component
        unsafe {
            self.archetypes[slot]
                .column_mut(position)
                .get_mut(location.row())
        }
    }

    /// Determine if a live entity has the component `C`.
    pub fn has_component<C: Component>(&self, entity: Entity) -> bool {
        self.locations
            .get(&entity)
            .map(|location| {
                let slot = self.slot_of(location.archetype());
                self.archetypes[slot].has(component::Id::of::<C>())
            })
            .unwrap_or(false)
    }

    /// Determine if the entity is live in this storage.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.locations.contains_key(&entity)
    }

    /// Get the number of live entities.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.locations.len()
    }

    /// Get the number of archetypes, the always-present empty one included.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Delete every entity, running every component destructor. Archetypes
    /// remain (empty) and stay indexed.
    pub fn clear(&mut self) {
        for archetype in &mut self.archetypes {
            for entity in archetype.delete_all_entities() {
                self.locations.remove(&entity);
            }
        }
        debug_assert!(self.locations.is_empty());
    }

    /// Look up an entity's location.
    ///
    /// # Panics
    /// Panics if the handle is unknown.
    fn location_of(&self, entity: Entity) -> Location {
        match self.locations.get(&entity) {
            Some(location) => *location,
            None => panic!("unknown entity {}", entity.id()),
        }
    }

    /// The slot of an archetype id in the archetype table.
    #[inline]
    fn slot_of(&self, id: archetype::Id) -> usize {
        self.by_id[&id]
    }

    /// Look up the archetype for a component set, creating and indexing it
    /// on first need.
    ///
    /// The descriptors must be sorted by component id and unique.
    fn get_or_create_archetype(&mut self, infos: &[Info]) -> archetype::Id {
        let spec = component::Spec::new(infos.iter().map(|info| info.id()).collect::<Vec<_>>());
        let id = archetype::Id::from_spec(&spec);

        if let Some(&slot) = self.by_id.get(&id) {
            // Content-addressed ids must never collapse distinct sets.
            assert!(
                self.archetypes[slot].spec() == &spec,
                "archetype id collision between distinct component sets"
            );
            return id;
        }

        let archetype = Archetype::new(id, infos);
        self.index.insert_archetype(&archetype);
        self.by_id.insert(id, self.archetypes.len());
        self.archetypes.push(archetype);
        log::debug!(
            "created archetype {:#018x} with {} component(s)",
            id.value(),
            spec.len()
        );
        id
    }

    /// Borrow two distinct archetypes mutably.
    fn two_archetypes_mut(
        archetypes: &mut [Archetype],
        a: usize,
        b: usize,
    ) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b, "source and target archetypes must differ");
        if a < b {
            let (left, right) = archetypes.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = archetypes.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// Get the component registry.
    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get the inverted component index.
    #[inline]
    pub(crate) fn index(&self) -> &ComponentIndex {
        &self.index
    }

    /// Get an archetype by id.
    #[inline]
    pub(crate) fn archetype_by_id(&self, id: archetype::Id) -> Option<&Archetype> {
        self.by_id.get(&id).map(|slot| &self.archetypes[*slot])
    }

    /// Verify the coherence of the location map, archetype table and
    /// inverted index.
    ///
    /// # Panics
    /// Panics if any structure diverged.
    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        for (entity, location) in &self.locations {
            let archetype = &self.archetypes[self.slot_of(location.archetype())];
            assert_eq!(
                archetype.entities()[location.row().index()],
                *entity,
                "location map out of sync with archetype rows"
            );
        }
        for archetype in &self.archetypes {
            archetype.verify_invariants();
            for (position, id) in archetype.spec().ids().iter().enumerate() {
                assert_eq!(
                    self.index.column_of(*id, archetype.id()),
                    Some(position),
                    "inverted index out of sync with archetype spec"
                );
            }
        }
    }
}
