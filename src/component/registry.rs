use std::any::TypeId;

use dashmap::DashMap;

use crate::component::{Component, Id, Info};

/// A thread-safe component registry.
///
/// Records the descriptor of every component type on first use. Registration
/// is implicit and idempotent: storages call [`Registry::register`] whenever
/// a typed operation names a component, and the fast path is a lock-free
/// read. The registry also guards component identity: because component ids
/// are hashes of type names, two distinct types could in principle collide,
/// and the reverse map turns that into an immediate panic instead of two
/// types silently sharing storage.
///
/// The registry is the one shared-safe piece of the store, so storages living
/// on different threads agree on component descriptors.
pub struct Registry {
    /// Map from TypeId to descriptor. Lock-free reads via sharded map.
    infos: DashMap<TypeId, Info>,

    /// Reverse map from component id to the type that claimed it.
    claims: DashMap<Id, TypeId>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a new empty component registry.
    #[inline]
    pub fn new() -> Self {
        Self {
            infos: DashMap::new(),
            claims: DashMap::new(),
        }
    }

    /// Register the component type `C` and get its descriptor.
    ///
    /// Idempotent; returns the existing descriptor when the type is already
    /// known.
    ///
    /// # Panics
    /// Panics if a different type already claimed this component id.
    pub fn register<C: Component>(&self) -> Info {
        let type_id = TypeId::of::<C>();

        // Fast path: already registered (lock-free read)
        if let Some(info) = self.infos.get(&type_id) {
            return *info;
        }

        let info = Info::of::<C>();
        let claimed = *self.claims.entry(info.id()).or_insert(type_id);
        assert!(
            claimed == type_id,
            "component id collision: {} hashes to the id already claimed by another type",
            info.type_name(),
        );

        self.infos.insert(type_id, info);
        info
    }

    /// Get the descriptor for the type `C`, if registered.
    #[inline]
    pub fn get<C: Component>(&self) -> Option<Info> {
        self.infos.get(&TypeId::of::<C>()).map(|entry| *entry)
    }

    /// Get the descriptor for a component id, if any type claimed it.
    #[inline]
    pub fn get_by_id(&self, id: Id) -> Option<Info> {
        let type_id = *self.claims.get(&id)?;
        self.infos.get(&type_id).map(|entry| *entry)
    }

    /// Get the number of registered component types.
    #[inline]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Check whether no component types are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    struct Position {
        #[allow(dead_code)]
        x: f32,
    }

    struct Velocity {
        #[allow(dead_code)]
        dx: f32,
    }

    #[test]
    fn registration_is_idempotent() {
        // Given
        let registry = Registry::new();

        // When
        let first = registry.register::<Position>();
        let second = registry.register::<Position>();

        // Then
        assert_eq!(first.id(), second.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_types_get_distinct_ids() {
        // Given
        let registry = Registry::new();

        // When
        let pos = registry.register::<Position>();
        let vel = registry.register::<Velocity>();

        // Then
        assert_ne!(pos.id(), vel.id());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn lookup_by_id_round_trips() {
        // Given
        let registry = Registry::new();
        let info = registry.register::<Position>();

        // When
        let found = registry.get_by_id(info.id()).unwrap();

        // Then
        assert_eq!(found.type_id(), info.type_id());

        // And an unclaimed id resolves to nothing
        assert!(registry.get_by_id(Id::of::<Velocity>()).is_none());
    }

    #[test]
    fn ids_agree_across_registries() {
        // Given - two storages on different threads each have their own registry
        let a = Registry::new();
        let b = Registry::new();

        // Then - the same type resolves to the same id in both
        assert_eq!(a.register::<Position>().id(), b.register::<Position>().id());
    }

    #[test]
    fn concurrent_registration() {
        // Given
        let registry = Arc::new(Registry::new());

        // When - several threads register the same types concurrently
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    if i % 2 == 0 {
                        registry.register::<Position>().id()
                    } else {
                        registry.register::<Velocity>().id()
                    }
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Then - each type resolved to a single id
        let pos = Id::of::<Position>();
        let vel = Id::of::<Velocity>();
        for (i, id) in results.iter().enumerate() {
            assert_eq!(*id, if i % 2 == 0 { pos } else { vel });
        }
        assert_eq!(registry.len(), 2);
    }
}
