//! An archetype-based entity component system store.
//!
//! Entities are grouped by their exact component set into *archetypes*. Each
//! archetype lays its component data out in contiguous, type-erased columns,
//! one per component type, so iterating a component across an archetype reads
//! sequential memory. An inverted index from component id to the archetypes
//! containing it resolves structural queries ("every entity with {A, B} but
//! not {C}") without scanning the whole store.
//!
//! Structural changes (creating and deleting entities, adding and removing
//! components) either mutate the storage in place, or, while a query cursor
//! is being driven, are recorded into a [`CommandBuffer`] and applied once
//! iteration is finished.
//!
//! # Example
//!
//! ```
//! use archway::{ArchetypeStorage, Query};
//!
//! struct Position { x: f32, y: f32 }
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut storage = ArchetypeStorage::new();
//!
//! let entity = storage.create_entity();
//! storage.add_component(entity, Position { x: 3.0, y: 4.0 });
//! storage.add_component(entity, Velocity { dx: 1.0, dy: 0.0 });
//!
//! let mut query = Query::new().with::<Position>().with::<Velocity>();
//! query.start(&storage);
//! while let Some(found) = query.next(&storage) {
//!     let pos = storage.get_component::<Position>(found).unwrap();
//!     assert_eq!(pos.x, 3.0);
//! }
//! ```
//!
//! The storage is single-threaded: queries and mutations run sequentially on
//! one thread, and independent storages may live on different threads. Only
//! the component registry is shared-safe, so storages on different threads
//! agree on component descriptors.

pub mod archetype;
pub mod command;
pub mod component;
pub mod entity;
pub mod query;
pub mod storage;

pub use command::CommandBuffer;
pub use component::Component;
pub use entity::Entity;
pub use query::Query;
pub use storage::ArchetypeStorage;
