//! Component identity and descriptors.
//!
//! A component is a plain value attached to an entity. The storage never sees
//! component types directly; it works with three runtime artifacts:
//!
//! - [`Id`]: a stable 64-bit identifier derived from the type
//! - [`Info`]: the descriptor carrying size, alignment and destructor
//! - [`Spec`]: a sorted list of component ids describing a component set
//!
//! Registration is implicit: the first use of a component type supplies its
//! descriptor, recorded in the storage's [`Registry`].

use std::any;

mod info;
mod registry;
mod spec;

pub use info::Info;
pub use registry::Registry;
pub use spec::Spec;

/// A trait marking types usable as components.
///
/// Any `Send + Sync + 'static` value type qualifies; there is nothing to
/// implement. The bound exists so component-typed APIs read as such and so
/// borrowed or thread-bound types are rejected at compile time.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// A component identifier.
///
/// Derived as a stable 64-bit hash of the fully qualified type name, so the
/// same type maps to the same id across storages within one process run.
/// Ids order component lists; every archetype keeps its ids strictly
/// ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u64);

impl Id {
    /// Get the component id for the type `C`.
    #[inline]
    pub fn of<C: Component>() -> Self {
        Self::from_type_name(any::type_name::<C>())
    }

    /// Hash a fully qualified type name into a component id (FNV-1a).
    fn from_type_name(name: &str) -> Self {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in name.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        Id(hash)
    }

    /// Get the raw identifier value.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position {
        #[allow(dead_code)]
        x: f32,
    }

    struct Velocity {
        #[allow(dead_code)]
        dx: f32,
    }

    #[test]
    fn id_is_stable_per_type() {
        // When
        let first = Id::of::<Position>();
        let second = Id::of::<Position>();

        // Then
        assert_eq!(first, second);
    }

    #[test]
    fn id_differs_between_types() {
        assert_ne!(Id::of::<Position>(), Id::of::<Velocity>());
    }

    #[test]
    fn id_is_nonzero_for_real_types() {
        assert_ne!(Id::of::<Position>().value(), 0);
        assert_ne!(Id::of::<Velocity>().value(), 0);
        assert_ne!(Id::of::<()>().value(), 0);
    }
}
