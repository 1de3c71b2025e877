//! `RawAlloc`: where collections get their storage from.
//!
//! Collections take an allocator parameter that defaults to [`Global`], the process
//! heap. Passing `&Arena` instead puts the storage in the arena: deallocation becomes a
//! no-op and the memory comes back in bulk with [`Arena::reset`] or
//! [`Arena::free_all`]. The borrow keeps the collection from outliving either.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::alloc::arena::Arena;
use crate::error::AllocError;

/// A source of raw memory.
pub trait RawAlloc {
    /// Allocates memory fitting `layout`.
    ///
    /// # Errors
    /// Returns [`AllocError`] if the memory cannot be provided.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Returns memory to the allocator.
    ///
    /// # Safety
    /// `ptr` must come from [`RawAlloc::allocate`] on this allocator with the same
    /// `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Global;

impl RawAlloc for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            // Aligned, non-null and never dereferenced.
            return NonNull::new(layout.align() as *mut u8).ok_or(AllocError::OutOfMemory { bytes: 0 });
        }
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::OutOfMemory {
            bytes: layout.size(),
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            // SAFETY: the caller guarantees `ptr` came from `allocate` with `layout`.
            unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
        }
    }
}

impl RawAlloc for &Arena {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.alloc_layout(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}
