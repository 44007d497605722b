//! Entity handles and allocation.
//!
//! An entity is an opaque identity; it carries no data of its own. Handles
//! are minted by the storage's [`Allocator`] as monotonically increasing,
//! nonzero 64-bit ids and are never reused within one storage instance, so
//! a handle stays unambiguous for the lifetime of the store even after the
//! entity it names is deleted.

/// An entity handle: an opaque, nonzero 64-bit identity.
///
/// Equal handles denote the same entity. The handle survives archetype
/// migration; only the entity's recorded location changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(u64);

impl Entity {
    /// Construct an entity from a raw id. Only the allocator mints these.
    #[inline]
    pub(crate) const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id of this entity.
    #[inline]
    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// The entity id allocator owned by a storage.
///
/// Ids start at 1 and only ever increase; zero is never minted and freed
/// ids are not recycled.
#[derive(Debug)]
pub struct Allocator {
    /// The next id to mint.
    next_id: u64,
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator {
    /// Construct a new allocator starting from id 1.
    #[inline]
    pub const fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Mint a new entity handle.
    pub fn alloc(&mut self) -> Entity {
        let entity = Entity::from_raw(self.next_id);
        self.next_id += 1;
        entity
    }
}
