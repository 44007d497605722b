//! Deferred structural edits: the command buffer.
//!
//! Structural changes made while a query cursor is being driven would
//! invalidate the candidate set and the columns the cursor points into, so
//! they are recorded into a [`CommandBuffer`] instead and applied once
//! iteration is finished.
//!
//! The buffer is an append-only byte log of tagged records. Every field is
//! written at its natural alignment; an added component's payload is
//! constructed in place in the log, preceded by its descriptor and by the
//! absolute offset of the payload so the reader re-finds the aligned slot
//! without replaying the writer's padding arithmetic.
//!
//! A buffer is either *run* (each command dispatches to the immediate
//! storage operation, in insertion order, payload bytes copied into their
//! destination column) or *discarded* (every unapplied payload is
//! destroyed). Dropping a buffer discards it. Either way each recorded
//! payload's destructor runs exactly once.

use std::mem;

use crate::component::{self, Component, Info};
use crate::entity::Entity;
use crate::storage::ArchetypeStorage;

mod bytes;

use bytes::AlignedBytes;

/// Record tags. Stored as a u64 so every record starts aligned.
const CREATE_ENTITY: u64 = 0;
const DELETE_ENTITY: u64 = 1;
const ADD_COMPONENT: u64 = 2;
const REMOVE_COMPONENT: u64 = 3;

/// A deferred log of structural edits, safe to record while iterating.
///
/// ```ignore
/// let mut buffer = CommandBuffer::new();
/// query.start(&storage);
/// while let Some(entity) = query.next(&storage) {
///     buffer.remove_component::<Burning>(entity);
///     let spawned = buffer.create_entity(&mut storage);
///     buffer.add_component(spawned, Position { x: 0.0, y: 0.0 });
/// }
/// buffer.run(&mut storage);
/// ```
#[derive(Default)]
pub struct CommandBuffer {
    /// The serialized command records.
    bytes: AlignedBytes,
}

impl CommandBuffer {
    /// Create an empty command buffer.
    #[inline]
    pub fn new() -> Self {
        Self {
            bytes: AlignedBytes::new(),
        }
    }

    /// Check whether any commands are recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Create an entity now and record the creation.
    ///
    /// The handle is minted immediately so commands recorded later in the
    /// same pass can target it; the logged record is a no-op on replay. The
    /// new entity sits in the empty archetype, which component queries do
    /// not visit, so an in-flight cursor is unaffected.
    pub fn create_entity(&mut self, storage: &mut ArchetypeStorage) -> Entity {
        let entity = storage.create_entity();
        self.bytes.push(CREATE_ENTITY);
        entity
    }

    /// Record the deletion of an entity.
    ///
    /// May be recorded several times for one entity; the second and later
    /// applications are no-ops.
    pub fn delete_entity(&mut self, entity: Entity) {
        self.bytes.push(DELETE_ENTITY);
        self.bytes.push(entity);
    }

    /// Record adding a component, constructing the payload in place in the
    /// log.
    ///
    /// On apply this follows immediate-API semantics: if the entity already
    /// has the component by then, the payload is destroyed and the original
    /// value wins.
    pub fn add_component<C: Component>(&mut self, entity: Entity, value: C) {
        let info = Info::of::<C>();
        self.bytes.push(ADD_COMPONENT);
        self.bytes.push(entity);
        self.bytes.push(info);

        // The payload lands at the first aligned position after the offset
        // field itself; record that absolute offset for the reader.
        let field_at = AlignedBytes::align_up(self.bytes.len(), mem::align_of::<u64>());
        let payload_at =
            AlignedBytes::align_up(field_at + mem::size_of::<u64>(), mem::align_of::<C>());
        self.bytes.push(payload_at as u64);

        let written_at = self.bytes.push(value);
        debug_assert_eq!(written_at, payload_at);
    }

    /// Record removing a component. Applying a removal of a component the
    /// entity does not have by then is a no-op.
    pub fn remove_component<C: Component>(&mut self, entity: Entity) {
        self.bytes.push(REMOVE_COMPONENT);
        self.bytes.push(entity);
        self.bytes.push(component::Id::of::<C>());
    }

    /// Apply every recorded command to the storage, in insertion order,
    /// then clear the buffer.
    ///
    /// Component payloads are copied byte-wise into their destination
    /// columns; they were constructed at record time and are never
    /// re-constructed.
    pub fn run(&mut self, storage: &mut ArchetypeStorage) {
        let mut offset = 0;
        while offset < self.bytes.len() {
            // SAFETY: the reads retrace exactly the fields the recording
            // side wrote, at the same alignments
            let tag = unsafe { self.bytes.read::<u64>(&mut offset) };
            match tag {
                CREATE_ENTITY => {
                    // The entity was created at record time.
                }
                DELETE_ENTITY => {
                    let entity = unsafe { self.bytes.read::<Entity>(&mut offset) };
                    // Tolerate repeated deletions of one entity.
                    if storage.contains(entity) {
                        storage.delete_entity(entity);
                    }
                }
                ADD_COMPONENT => {
                    let entity = unsafe { self.bytes.read::<Entity>(&mut offset) };
                    let info = unsafe { self.bytes.read::<Info>(&mut offset) };
                    let payload_at = unsafe { self.bytes.read::<u64>(&mut offset) } as usize;
                    let payload = self.bytes.ptr_at(payload_at);
                    // SAFETY: the payload was constructed in place at record
                    // time; the storage either adopts its bytes or destroys
                    // them, so ownership leaves the log here
                    unsafe { storage.add_component_dynamic(entity, info, payload) };
                    offset = payload_at + info.layout().size();
                }
                REMOVE_COMPONENT => {
                    let entity = unsafe { self.bytes.read::<Entity>(&mut offset) };
                    let id = unsafe { self.bytes.read::<component::Id>(&mut offset) };
                    storage.remove_component_dynamic(entity, id);
                }
                unknown => panic!("corrupt command log: unknown tag {unknown}"),
            }
        }
        self.bytes.clear();
    }

    /// Destroy every unapplied component payload and clear the buffer.
    pub fn discard(&mut self) {
        let mut offset = 0;
        while offset < self.bytes.len() {
            // SAFETY: as in run; only payloads carry ownership
            let tag = unsafe { self.bytes.read::<u64>(&mut offset) };
            match tag {
                CREATE_ENTITY => {}
                DELETE_ENTITY => {
                    let _ = unsafe { self.bytes.read::<Entity>(&mut offset) };
                }
                ADD_COMPONENT => {
                    let _ = unsafe { self.bytes.read::<Entity>(&mut offset) };
                    let info = unsafe { self.bytes.read::<Info>(&mut offset) };
                    let payload_at = unsafe { self.bytes.read::<u64>(&mut offset) } as usize;
                    // SAFETY: the payload is live until this destructor call
                    unsafe { (info.drop_fn())(self.bytes.ptr_at(payload_at)) };
                    offset = payload_at + info.layout().size();
                }
                REMOVE_COMPONENT => {
                    let _ = unsafe { self.bytes.read::<Entity>(&mut offset) };
                    let _ = unsafe { self.bytes.read::<component::Id>(&mut offset) };
                }
                unknown => panic!("corrupt command log: unknown tag {unknown}"),
            }
        }
        self.bytes.clear();
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        // A buffer dropped without being run gives up its pending edits.
        self.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, PartialEq)]
    struct Name(String);

    struct DropTracker(Arc<AtomicUsize>);

    impl Drop for DropTracker {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn collect(query: &mut Query, storage: &ArchetypeStorage) -> Vec<Entity> {
        let mut found = Vec::new();
        query.start(storage);
        while let Some(entity) = query.next(storage) {
            found.push(entity);
        }
        found
    }

    #[test]
    fn run_applies_commands_in_insertion_order() {
        // Given
        let mut storage = ArchetypeStorage::new();
        let mut buffer = CommandBuffer::new();

        // When - create, outfit, then partially strip an entity
        let entity = buffer.create_entity(&mut storage);
        buffer.add_component(entity, Position { x: 1.0, y: 2.0 });
        buffer.add_component(entity, Velocity { dx: 3.0, dy: 4.0 });
        buffer.remove_component::<Velocity>(entity);
        buffer.run(&mut storage);

        // Then
        assert!(buffer.is_empty());
        assert_eq!(
            storage.get_component::<Position>(entity),
            Some(&Position { x: 1.0, y: 2.0 })
        );
        assert!(!storage.has_component::<Velocity>(entity));
    }

    #[test]
    fn created_entity_is_usable_before_run() {
        // Given
        let mut storage = ArchetypeStorage::new();
        let mut buffer = CommandBuffer::new();

        // When
        let entity = buffer.create_entity(&mut storage);

        // Then - the handle is live immediately; the components are not
        assert!(storage.contains(entity));
        buffer.add_component(entity, Position { x: 0.0, y: 0.0 });
        assert!(!storage.has_component::<Position>(entity));

        buffer.run(&mut storage);
        assert!(storage.has_component::<Position>(entity));
    }

    #[test]
    fn repeated_delete_applications_are_noops() {
        // Given
        let mut storage = ArchetypeStorage::new();
        let entity = storage.create_entity();
        storage.add_component(entity, Position { x: 0.0, y: 0.0 });

        let mut buffer = CommandBuffer::new();
        buffer.delete_entity(entity);
        buffer.delete_entity(entity);
        buffer.delete_entity(entity);

        // When
        buffer.run(&mut storage);

        // Then
        assert!(!storage.contains(entity));
        assert_eq!(storage.entity_count(), 0);
    }

    #[test]
    fn discard_destroys_each_pending_payload_once() {
        // Given
        let counter = Arc::new(AtomicUsize::new(0));
        let mut storage = ArchetypeStorage::new();
        let entity = storage.create_entity();

        let mut buffer = CommandBuffer::new();
        buffer.add_component(entity, DropTracker(counter.clone()));
        buffer.add_component(entity, Name("x".to_string()));

        // When
        buffer.discard();

        // Then - payloads destroyed, nothing applied
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!storage.has_component::<DropTracker>(entity));
        assert!(!storage.has_component::<Name>(entity));
        assert!(buffer.is_empty());
    }

    #[test]
    fn dropping_an_unrun_buffer_discards_it() {
        // Given
        let counter = Arc::new(AtomicUsize::new(0));
        let mut storage = ArchetypeStorage::new();
        let entity = storage.create_entity();

        // When
        {
            let mut buffer = CommandBuffer::new();
            buffer.add_component(entity, Name("x".to_string()));
            buffer.add_component(entity, DropTracker(counter.clone()));
        }

        // Then - the destructors ran exactly once; the entity is untouched
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!storage.has_component::<Name>(entity));
    }

    #[test]
    fn applied_payloads_are_not_destroyed_by_the_buffer() {
        // Given
        let counter = Arc::new(AtomicUsize::new(0));
        let mut storage = ArchetypeStorage::new();
        let entity = storage.create_entity();

        // When - run adopts the payload, dropping the buffer after is inert
        {
            let mut buffer = CommandBuffer::new();
            buffer.add_component(entity, DropTracker(counter.clone()));
            buffer.run(&mut storage);
        }

        // Then - the value lives on in the storage
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(storage.has_component::<DropTracker>(entity));

        drop(storage);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn add_on_existing_component_destroys_the_payload_at_apply() {
        // Given
        let counter = Arc::new(AtomicUsize::new(0));
        let mut storage = ArchetypeStorage::new();
        let entity = storage.create_entity();
        storage.add_component(entity, Position { x: 1.0, y: 1.0 });
        storage.add_component(entity, DropTracker(counter.clone()));

        let mut buffer = CommandBuffer::new();
        buffer.add_component(entity, Position { x: 9.0, y: 9.0 });
        buffer.add_component(entity, DropTracker(counter.clone()));

        // When
        buffer.run(&mut storage);

        // Then - originals kept, buffered tracker destroyed exactly once
        assert_eq!(
            storage.get_component::<Position>(entity),
            Some(&Position { x: 1.0, y: 1.0 })
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn over_aligned_payloads_round_trip() {
        // Given
        #[repr(align(32))]
        #[derive(Debug, Clone, Copy, PartialEq)]
        struct Wide {
            value: u64,
        }

        let mut storage = ArchetypeStorage::new();
        let entity = storage.create_entity();

        let mut buffer = CommandBuffer::new();
        buffer.add_component(entity, 7u8);
        buffer.add_component(entity, Wide { value: 42 });

        // When
        buffer.run(&mut storage);

        // Then
        assert_eq!(storage.get_component::<u8>(entity), Some(&7));
        assert_eq!(storage.get_component::<Wide>(entity), Some(&Wide { value: 42 }));
    }

    #[test]
    fn zero_sized_payloads_are_recorded_and_applied() {
        // Given
        #[derive(Debug, PartialEq)]
        struct Frozen;

        let mut storage = ArchetypeStorage::new();
        let entity = storage.create_entity();
        storage.add_component(entity, Position { x: 0.0, y: 0.0 });

        let mut buffer = CommandBuffer::new();
        buffer.add_component(entity, Frozen);

        // When
        buffer.run(&mut storage);

        // Then
        assert!(storage.has_component::<Frozen>(entity));
    }

    #[test]
    fn structural_edits_recorded_during_iteration() {
        // Given - three entities with Position, one of them at x == 3
        let mut storage = ArchetypeStorage::new();
        let mut originals = Vec::new();
        for x in [1.0f32, 3.0, 5.0] {
            let entity = storage.create_entity();
            storage.add_component(entity, Position { x, y: 4.0 });
            originals.push(entity);
        }

        // When - while iterating, strip Position from every entity whose x
        // is not 3, and spawn a moving replacement for each visited entity
        let mut query = Query::new().with::<Position>();
        let mut buffer = CommandBuffer::new();
        let mut spawned = Vec::new();
        query.start(&storage);
        while let Some(entity) = query.next(&storage) {
            if storage.get_component::<Position>(entity).unwrap().x != 3.0 {
                buffer.remove_component::<Position>(entity);
            }
            let fresh = buffer.create_entity(&mut storage);
            buffer.add_component(fresh, Position { x: 10.0, y: 10.0 });
            buffer.add_component(fresh, Velocity { dx: 20.0, dy: 20.0 });
            spawned.push(fresh);
        }
        buffer.run(&mut storage);

        // Then - stationary Positions remain only where x was 3
        let mut still = collect(
            &mut Query::new().with::<Position>().without::<Velocity>(),
            &storage,
        );
        still.sort();
        assert_eq!(still, vec![originals[1]]);

        // And every spawned entity has both Position and Velocity
        let mut moving = collect(
            &mut Query::new().with::<Position>().with::<Velocity>(),
            &storage,
        );
        moving.sort();
        spawned.sort();
        assert_eq!(moving, spawned);
        for entity in &moving {
            assert_eq!(
                storage.get_component::<Velocity>(*entity),
                Some(&Velocity { dx: 20.0, dy: 20.0 })
            );
        }
    }

    #[test]
    fn buffer_is_reusable_after_run() {
        // Given
        let mut storage = ArchetypeStorage::new();
        let mut buffer = CommandBuffer::new();

        let first = buffer.create_entity(&mut storage);
        buffer.add_component(first, Position { x: 1.0, y: 1.0 });
        buffer.run(&mut storage);

        // When - record and run a second batch through the same buffer
        let second = buffer.create_entity(&mut storage);
        buffer.add_component(second, Position { x: 2.0, y: 2.0 });
        buffer.run(&mut storage);

        // Then
        assert_eq!(storage.get_component::<Position>(first).unwrap().x, 1.0);
        assert_eq!(storage.get_component::<Position>(second).unwrap().x, 2.0);
    }
}
