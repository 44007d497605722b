//! Type-erased columnar storage for one component type.
//!
//! A [`Column`] is a packed array of values of a single component type,
//! stored as raw bytes next to the descriptor that knows their layout and
//! destructor. Rows stay dense under removal through swap-remove, in two
//! flavors: one that destroys the evicted element and one that leaves the
//! bytes alone because the caller has moved them elsewhere (archetype
//! migration is a byte copy, never a re-construction).

use std::alloc::Layout;
use std::any::TypeId;
use std::ptr::{self, NonNull};

use crate::component::{Component, Info};
use crate::storage::mem::{GrowthStrategy, IndexedMemory};
use crate::storage::Row;

/// A type-erased, tightly packed array of one component type.
///
/// # Invariants
/// - elements `[0..len)` are initialized values of the descriptor's type
/// - `len <= capacity`
/// - zero-sized components store no bytes; `len` still tracks presence
pub struct Column {
    /// The raw element storage.
    data: IndexedMemory,

    /// Number of elements currently stored.
    len: usize,

    /// The descriptor of the stored component type.
    info: Info,
}

impl Column {
    /// Create a new empty column for the described component type.
    #[inline]
    pub fn new(info: Info) -> Self {
        Self {
            data: IndexedMemory::new(info.layout(), GrowthStrategy::Multiply(2)),
            len: 0,
            info,
        }
    }

    /// Get the descriptor of the stored component type.
    #[inline]
    pub fn info(&self) -> &Info {
        &self.info
    }

    /// Get the number of elements in the column.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the column is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reserve capacity for at least `additional` more elements.
    ///
    /// Does not change the length; reserved slots are uninitialised until
    /// written and accounted for with [`Column::set_len`].
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        self.data.reserve(self.len + additional);
    }

    /// Set the length of the column without touching its contents.
    ///
    /// # Safety
    /// - `new_len` must not exceed the reserved capacity
    /// - all elements in `[0..new_len)` must be initialized values of the
    ///   column's component type
    #[inline]
    pub unsafe fn set_len(&mut self, new_len: usize) {
        self.len = new_len;
    }

    /// Construct a typed value into the slot at `row`.
    ///
    /// # Safety
    /// - `row` must be within the reserved capacity
    /// - any previous value at `row` is overwritten without being dropped
    pub unsafe fn write<C: Component>(&mut self, row: Row, value: C) {
        self.ensure_type::<C>();
        // SAFETY: caller guarantees the slot is reserved; the type matches
        unsafe {
            ptr::write(self.data.ptr_at(row.index()).as_ptr() as *mut C, value);
        }
    }

    /// Overwrite the slot at `row` with raw bytes of one element.
    ///
    /// Used by migration and command replay: the bytes were produced by an
    /// element of the same component type whose ownership moves here.
    ///
    /// # Safety
    /// - `row` must be within the reserved capacity
    /// - `src` must point to `info.layout().size()` readable bytes holding a
    ///   valid value of the column's component type
    /// - any previous value at `row` is overwritten without being dropped
    pub unsafe fn write_bytes(&mut self, row: Row, src: NonNull<u8>) {
        // SAFETY: both pointers cover one element of the column's layout
        unsafe {
            ptr::copy_nonoverlapping(
                src.as_ptr(),
                self.data.ptr_at(row.index()).as_ptr(),
                self.info.layout().size(),
            );
        }
    }

    /// Get a pointer to the element at `row`.
    ///
    /// # Safety
    /// `row` must be below the current length.
    #[inline]
    pub unsafe fn read_ptr(&self, row: Row) -> NonNull<u8> {
        debug_assert!(row.index() < self.len, "row index out of bounds");
        self.data.ptr_at(row.index())
    }

    /// Get a reference to the component at `row`.
    ///
    /// Returns `None` when the row is out of bounds.
    ///
    /// # Safety
    /// The component type `C` must match the column's component type (also
    /// asserted at runtime).
    pub unsafe fn get<C: Component>(&self, row: Row) -> Option<&C> {
        self.ensure_type::<C>();
        if row.index() >= self.len {
            return None;
        }
        // SAFETY: the row is initialized and the type was checked
        unsafe { Some(&*(self.data.ptr_at(row.index()).as_ptr() as *const C)) }
    }

    /// Get a mutable reference to the component at `row`.
    ///
    /// Returns `None` when the row is out of bounds.
    ///
    /// # Safety
    /// The component type `C` must match the column's component type (also
    /// asserted at runtime).
    pub unsafe fn get_mut<C: Component>(&mut self, row: Row) -> Option<&mut C> {
        self.ensure_type::<C>();
        if row.index() >= self.len {
            return None;
        }
        // SAFETY: the row is initialized and the type was checked
        unsafe { Some(&mut *(self.data.ptr_at(row.index()).as_ptr() as *mut C)) }
    }

    /// Swap-remove the element at `row`, running its destructor.
    ///
    /// The last element's bytes move into `row`; the column shrinks by one.
    ///
    /// # Safety
    /// `row` must be below the current length.
    pub unsafe fn swap_remove(&mut self, row: Row) {
        debug_assert!(row.index() < self.len, "row index out of bounds");
        let last = self.len - 1;
        let row_ptr = self.data.ptr_at(row.index());
        let last_ptr = self.data.ptr_at(last);

        // SAFETY: both rows are initialized; after the swap the evicted
        // element sits at the end and is destroyed there
        unsafe {
            if row.index() != last {
                ptr::swap_nonoverlapping(
                    row_ptr.as_ptr(),
                    last_ptr.as_ptr(),
                    self.info.layout().size(),
                );
            }
            (self.info.drop_fn())(last_ptr);
        }
        self.len -= 1;
    }

    /// Swap-remove the element at `row` without running any destructor.
    ///
    /// The caller has already moved the element's bytes elsewhere, so only
    /// the last element is copied down and the length decremented.
    ///
    /// # Safety
    /// `row` must be below the current length, and the value previously at
    /// `row` must have been moved out (its ownership transferred byte-wise).
    pub unsafe fn swap_remove_no_drop(&mut self, row: Row) {
        debug_assert!(row.index() < self.len, "row index out of bounds");
        let last = self.len - 1;
        if row.index() != last {
            // SAFETY: distinct initialized rows of one element each
            unsafe {
                ptr::copy_nonoverlapping(
                    self.data.ptr_at(last).as_ptr(),
                    self.data.ptr_at(row.index()).as_ptr(),
                    self.info.layout().size(),
                );
            }
        }
        self.len -= 1;
    }

    /// Run the destructor on every element, then clear the column.
    pub fn clear(&mut self) {
        for i in 0..self.len {
            // SAFETY: every element below len is initialized
            unsafe {
                (self.info.drop_fn())(self.data.ptr_at(i));
            }
        }
        self.len = 0;
    }

    /// Assert that `C` is the column's component type.
    ///
    /// # Panics
    /// Panics on TypeId or layout mismatch.
    #[inline]
    fn ensure_type<C: Component>(&self) {
        assert!(
            TypeId::of::<C>() == self.info.type_id(),
            "type mismatch: attempted to use {} with a column storing {}",
            std::any::type_name::<C>(),
            self.info.type_name(),
        );
        debug_assert!(
            Layout::new::<C>() == self.info.layout(),
            "layout mismatch between component and column"
        );
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        // Drop all elements; IndexedMemory frees the allocation
        self.clear();
    }
}
