use std::alloc::Layout;
use std::any::{self, TypeId};
use std::ptr::NonNull;
use std::{mem, ptr};

use crate::component::{Component, Id};

/// The descriptor for a component type.
///
/// Carries everything the type-erased storage needs to handle values of the
/// type: the component id, the `TypeId` for runtime checks, the memory
/// layout, and a destructor function (a no-op for types without drop glue).
#[derive(Debug, Clone, Copy)]
pub struct Info {
    /// The component id for this type.
    id: Id,

    /// The TypeId of the component.
    type_id: TypeId,

    /// The memory layout of one component value.
    layout: Layout,

    /// The fully qualified type name, kept for diagnostics.
    type_name: &'static str,

    /// The drop function for the component, might be a no-op.
    drop_fn: unsafe fn(NonNull<u8>),
}

impl Info {
    /// Construct the descriptor for the component type `C`.
    pub fn of<C: Component>() -> Self {
        let drop_fn = if mem::needs_drop::<C>() {
            Self::drop_impl::<C>
        } else {
            Self::drop_noop
        };
        Self {
            id: Id::of::<C>(),
            type_id: TypeId::of::<C>(),
            layout: Layout::new::<C>(),
            type_name: any::type_name::<C>(),
            drop_fn,
        }
    }

    /// Get the component id.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the TypeId of the component type.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Get the memory layout of one component value.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Get the fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Determine if the component is a zero-sized type.
    #[inline]
    pub fn is_zero_sized(&self) -> bool {
        self.layout.size() == 0
    }

    /// Get the destructor for one component value.
    #[inline]
    pub fn drop_fn(&self) -> unsafe fn(NonNull<u8>) {
        self.drop_fn
    }

    /// Drop implementation for types that need drop.
    unsafe fn drop_impl<C>(ptr: NonNull<u8>) {
        // SAFETY: caller ensures ptr points to a valid initialized C
        unsafe {
            ptr::drop_in_place(ptr.as_ptr() as *mut C);
        }
    }

    /// No-op drop for types without drop glue.
    unsafe fn drop_noop(_ptr: NonNull<u8>) {}
}
