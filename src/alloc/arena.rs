//! `Arena`: a growable bump allocator over lazily committed virtual memory.
//!
//! An arena owns an ordered list of blocks. Each block is a single virtual-memory
//! reservation; allocations ("nodes") are carved from it in strictly increasing address
//! order by bumping a cursor. Pages are reserved inaccessible and only committed as the
//! cursor crosses them, so the committed footprint tracks what was actually requested.
//!
//! Memory is reclaimed in bulk only:
//! - [`Arena::reset`] rewinds every block without returning pages to the OS.
//! - [`Arena::free_all`] unmaps every block.
//!
//! Typed allocations borrow the arena, and both bulk operations take `&mut self`, so
//! a reference handed out by [`Arena::alloc_value`] or friends can never outlive the
//! memory behind it.

use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::cmp::Ordering;
use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};
use core::slice;

use tracing::{debug, trace};
use zerocopy::FromZeroes;

use crate::alloc::page::{align_up, checked_align_up, page_size};
use crate::alloc::system::syscall;
use crate::config::ArenaConfig;
use crate::error::AllocError;

/// Default capacity of a freshly created block (64 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Alignment of every untyped allocation returned by [`Arena::alloc`].
pub const MIN_ALIGN: usize = 16;

/// One allocation inside a block.
#[derive(Debug, Clone, Copy)]
struct Node {
    start: usize,
    len: usize,
}

/// A single reservation plus the nodes carved from it.
struct Block {
    base: NonNull<u8>,
    /// Bytes reserved from the OS (page multiple).
    reserved: usize,
    /// Bump limit.
    capacity: usize,
    /// Bytes made read/write, always a page multiple from `base`.
    committed: usize,
    cursor: usize,
    nodes: Vec<Node>,
}

// SAFETY: a block exclusively owns its reservation; nothing else aliases `base`.
unsafe impl Send for Block {}

impl Block {
    fn reserve(capacity: usize) -> Result<Self, AllocError> {
        let reserved =
            checked_align_up(capacity, page_size()).ok_or(AllocError::CapacityOverflow)?;
        // SAFETY: the region is released exactly once, in `Drop`.
        let base = unsafe { syscall::reserve_region(reserved) }
            .and_then(NonNull::new)
            .ok_or(AllocError::OutOfMemory { bytes: reserved })?;
        debug!(capacity, reserved, "reserved arena block");
        Ok(Self {
            base,
            reserved,
            capacity,
            committed: 0,
            cursor: 0,
            nodes: Vec::new(),
        })
    }

    #[inline]
    fn addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Offset at which a `size`/`align` request would start, if it fits.
    fn fit(&self, size: usize, align: usize) -> Option<usize> {
        let addr = self.addr().checked_add(self.cursor)?;
        let start = checked_align_up(addr, align)? - self.addr();
        let end = start.checked_add(size)?;
        (end <= self.capacity).then_some(start)
    }

    fn ensure_committed(&mut self, end: usize) -> Result<(), AllocError> {
        if end <= self.committed {
            return Ok(());
        }
        let target = align_up(end, page_size()).min(self.reserved);
        let bytes = target - self.committed;
        // SAFETY: `committed` is page aligned and `target <= reserved`, so the range lies
        // inside this block's reservation.
        let ok = unsafe { syscall::commit_region(self.base.as_ptr().add(self.committed), bytes) };
        if !ok {
            return Err(AllocError::CommitFailed { bytes });
        }
        trace!(bytes, committed = target, "committed arena pages");
        self.committed = target;
        Ok(())
    }

    fn bump(&mut self, size: usize, align: usize) -> Result<Option<NonNull<u8>>, AllocError> {
        let Some(start) = self.fit(size, align) else {
            return Ok(None);
        };
        let end = start + size;
        self.ensure_committed(end)?;
        self.nodes.push(Node { start, len: size });
        self.cursor = end;
        Ok(Some(self.ptr_at(start)))
    }

    #[inline]
    fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.capacity);
        // SAFETY: `offset <= capacity <= reserved`, so the pointer stays inside the
        // reservation and cannot be null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Index of the live node starting exactly at `ptr`.
    fn node_index(&self, ptr: NonNull<u8>) -> Option<usize> {
        let offset = (ptr.as_ptr() as usize).checked_sub(self.addr())?;
        if offset >= self.capacity {
            return None;
        }
        self.nodes.binary_search_by_key(&offset, |node| node.start).ok()
    }

    #[inline]
    fn is_tail(&self, index: usize) -> bool {
        index + 1 == self.nodes.len()
    }

    fn rewind(&mut self) {
        self.cursor = 0;
        self.nodes.clear();
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: `base`/`reserved` describe the whole reservation made in `reserve`.
        unsafe { syscall::release_region(self.base.as_ptr(), self.reserved) };
    }
}

/// Bookkeeping snapshot of an arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Number of blocks currently reserved.
    pub blocks: usize,
    /// Bytes consumed by bump cursors, alignment padding included.
    pub used: usize,
    /// Bytes committed to physical memory.
    pub committed: usize,
    /// Bytes of address space reserved.
    pub reserved: usize,
}

struct ArenaState {
    blocks: Vec<Block>,
    /// First block allocation is attempted from.
    current: usize,
    block_size: usize,
    released: bool,
}

impl ArenaState {
    fn alloc(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        if self.released {
            return Err(AllocError::Released);
        }
        let size = size.max(1);
        for index in self.current..self.blocks.len() {
            if let Some(ptr) = self.blocks[index].bump(size, align)? {
                self.current = index;
                return Ok(ptr);
            }
        }
        self.grow(size, align)
    }

    fn grow(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        // A fresh block starts page aligned; only larger alignments need slack.
        let slack = if align > page_size() { align } else { 0 };
        let needed = size.checked_add(slack).ok_or(AllocError::CapacityOverflow)?;
        let capacity = if needed <= self.block_size {
            self.block_size
        } else {
            size.checked_mul(2)
                .and_then(|doubled| doubled.checked_add(slack))
                .ok_or(AllocError::CapacityOverflow)?
        };

        let mut block = Block::reserve(capacity)?;
        let ptr = block
            .bump(size, align)?
            .ok_or(AllocError::OutOfMemory { bytes: capacity })?;
        self.blocks.push(block);
        self.current = self.blocks.len() - 1;
        Ok(ptr)
    }

    fn locate(&self, ptr: NonNull<u8>) -> Option<(usize, usize)> {
        self.blocks
            .iter()
            .enumerate()
            .find_map(|(b, block)| block.node_index(ptr).map(|n| (b, n)))
    }

    fn realloc(&mut self, ptr: NonNull<u8>, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        if self.released {
            return Err(AllocError::Released);
        }
        let size = size.max(1);
        let (b, n) = self.locate(ptr).ok_or(AllocError::ForeignPointer)?;
        let old = self.blocks[b].nodes[n].len;
        if size < old {
            return Err(AllocError::Shrink { old, new: size });
        }
        if size == old {
            return Ok(ptr);
        }

        let block = &mut self.blocks[b];
        if block.is_tail(n) {
            let start = block.nodes[n].start;
            if let Some(end) = start.checked_add(size).filter(|&end| end <= block.capacity) {
                block.ensure_committed(end)?;
                block.nodes[n].len = size;
                block.cursor = end;
                return Ok(ptr);
            }
        }

        let fresh = self.alloc(size, align)?;
        // SAFETY: both ranges are committed. `fresh` is a brand-new node placed after
        // every live node of its block, so it cannot overlap the old one.
        unsafe { ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), old) };
        Ok(fresh)
    }

    fn can_grow_in_place(&self, ptr: NonNull<u8>, size: usize) -> bool {
        if self.released {
            return false;
        }
        let size = size.max(1);
        let Some((b, n)) = self.locate(ptr) else {
            return false;
        };
        let block = &self.blocks[b];
        let node = block.nodes[n];
        match size.cmp(&node.len) {
            Ordering::Less => false,
            Ordering::Equal => true,
            Ordering::Greater => {
                block.is_tail(n)
                    && node
                        .start
                        .checked_add(size)
                        .is_some_and(|end| end <= block.capacity)
            }
        }
    }

    fn stats(&self) -> ArenaStats {
        self.blocks.iter().fold(
            ArenaStats::default(),
            |acc, block| ArenaStats {
                blocks: acc.blocks + 1,
                used: acc.used + block.cursor,
                committed: acc.committed + block.committed,
                reserved: acc.reserved + block.reserved,
            },
        )
    }
}

/// A growable bump allocator backed by lazily committed virtual memory.
///
/// The arena is `Send` but not `Sync`: give each task its own arena.
///
/// # Example
///
/// ```
/// use hearth::alloc::Arena;
///
/// let mut arena = Arena::new(1024);
/// let ids = arena.alloc_slice_copy(&[1u32, 2, 3]).unwrap();
/// ids[0] = 7;
/// assert_eq!(ids, &[7, 2, 3]);
///
/// arena.reset();
/// assert_eq!(arena.used_bytes(), 0);
/// ```
pub struct Arena {
    state: UnsafeCell<ArenaState>,
}

impl Arena {
    /// Creates an arena whose blocks hold at least `block_size` bytes.
    ///
    /// No memory is reserved until the first allocation.
    pub fn new(block_size: usize) -> Self {
        Self {
            state: UnsafeCell::new(ArenaState {
                blocks: Vec::new(),
                current: 0,
                block_size: block_size.max(1),
                released: false,
            }),
        }
    }

    /// Creates an arena from configuration.
    pub fn with_config(config: &ArenaConfig) -> Self {
        Self::new(config.block_size)
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn state(&self) -> &mut ArenaState {
        // SAFETY: `Arena` is `!Sync`, and no method holds this borrow across a call that
        // could re-enter the arena.
        unsafe { &mut *self.state.get() }
    }

    #[inline]
    fn state_ref(&self) -> &ArenaState {
        // SAFETY: see `state`.
        unsafe { &*self.state.get() }
    }

    /// Allocates `count * elem_size` bytes aligned to [`MIN_ALIGN`].
    ///
    /// A new block is reserved when no existing block can hold the request, so this only
    /// fails when the OS refuses the reservation or the size overflows. Zero-sized
    /// requests are rounded up to one byte so that every node has a distinct address.
    ///
    /// # Errors
    /// [`AllocError::CapacityOverflow`], [`AllocError::OutOfMemory`],
    /// [`AllocError::CommitFailed`] or [`AllocError::Released`].
    pub fn alloc(&self, count: usize, elem_size: usize) -> Result<NonNull<u8>, AllocError> {
        let size = count.checked_mul(elem_size).ok_or(AllocError::CapacityOverflow)?;
        self.state().alloc(size, MIN_ALIGN)
    }

    /// Allocates memory for `layout`.
    ///
    /// # Errors
    /// Same as [`Arena::alloc`].
    pub fn alloc_layout(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.state().alloc(layout.size(), layout.align())
    }

    /// Grows the allocation at `ptr` to `count * elem_size` bytes.
    ///
    /// Growth happens in place only when `ptr` is the most recent allocation of its block
    /// and the new size still fits that block; otherwise a new region is allocated and the
    /// old contents are copied. Callers must not assume in-place growth.
    ///
    /// # Errors
    /// [`AllocError::ForeignPointer`] if `ptr` is not the start of a live allocation,
    /// [`AllocError::Shrink`] if the request is smaller than the allocation, plus every
    /// error of [`Arena::alloc`].
    pub fn realloc(
        &self,
        ptr: NonNull<u8>,
        count: usize,
        elem_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let size = count.checked_mul(elem_size).ok_or(AllocError::CapacityOverflow)?;
        self.state().realloc(ptr, size, MIN_ALIGN)
    }

    /// Returns `true` if [`Arena::realloc`] with these arguments would succeed and return
    /// `ptr` itself: the size is unchanged, or `ptr` is the newest node of its block and
    /// the block has room. Shrink requests and foreign pointers give `false`.
    pub fn can_grow_in_place(&self, ptr: NonNull<u8>, count: usize, elem_size: usize) -> bool {
        count
            .checked_mul(elem_size)
            .is_some_and(|size| self.state_ref().can_grow_in_place(ptr, size))
    }

    /// Does nothing: arenas reclaim memory only through [`reset`](Self::reset) and
    /// [`free_all`](Self::free_all).
    #[inline]
    pub fn free(&self, _ptr: NonNull<u8>) {}

    /// Moves `value` into the arena.
    ///
    /// The value's destructor never runs; the memory is reclaimed in bulk.
    ///
    /// # Errors
    /// Same as [`Arena::alloc`].
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_value<T>(&self, value: T) -> Result<&mut T, AllocError> {
        let ptr = self.alloc_typed::<T>(1)?;
        // SAFETY: `ptr` is fresh, aligned for `T`, and large enough for one `T`.
        unsafe {
            ptr.as_ptr().write(value);
            Ok(&mut *ptr.as_ptr())
        }
    }

    /// Allocates `len` zeroed elements.
    ///
    /// # Errors
    /// Same as [`Arena::alloc`].
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_zeroed<T: FromZeroes>(&self, len: usize) -> Result<&mut [T], AllocError> {
        let ptr = self.alloc_typed::<T>(len)?;
        // SAFETY: `T: FromZeroes`, so all-zero bytes are a valid `T`. Reused pages are not
        // zero after `reset`, hence the explicit fill.
        unsafe {
            ptr::write_bytes(ptr.as_ptr(), 0, len);
            Ok(slice::from_raw_parts_mut(ptr.as_ptr(), len))
        }
    }

    /// Copies `src` into the arena.
    ///
    /// # Errors
    /// Same as [`Arena::alloc`].
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> Result<&mut [T], AllocError> {
        let ptr = self.alloc_typed::<T>(src.len())?;
        // SAFETY: fresh allocation of exactly `src.len()` elements.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len());
            Ok(slice::from_raw_parts_mut(ptr.as_ptr(), src.len()))
        }
    }

    /// Copies a string slice into the arena.
    ///
    /// # Errors
    /// Same as [`Arena::alloc`].
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_str(&self, s: &str) -> Result<&mut str, AllocError> {
        let bytes = self.alloc_slice_copy(s.as_bytes())?;
        // SAFETY: the bytes were copied from a valid `str`.
        Ok(unsafe { core::str::from_utf8_unchecked_mut(bytes) })
    }

    /// Grows a slice previously returned by this arena to `new_len` elements, zeroing the
    /// new tail. The old slice is consumed because it may have moved.
    ///
    /// # Errors
    /// [`AllocError::Shrink`] if `new_len < old.len()`, plus every error of
    /// [`Arena::realloc`].
    pub fn grow_slice<'a, T: FromZeroes>(
        &'a self,
        old: &'a mut [T],
        new_len: usize,
    ) -> Result<&'a mut [T], AllocError> {
        let old_len = old.len();
        let elem = mem::size_of::<T>();
        if new_len < old_len {
            return Err(AllocError::Shrink {
                old: old_len * elem,
                new: new_len * elem,
            });
        }
        if elem == 0 {
            // SAFETY: zero-sized elements need no storage.
            return Ok(unsafe { slice::from_raw_parts_mut(NonNull::<T>::dangling().as_ptr(), new_len) });
        }

        let size = elem.checked_mul(new_len).ok_or(AllocError::CapacityOverflow)?;
        let ptr = NonNull::from(old).cast::<u8>();
        let fresh = self.state().realloc(ptr, size, mem::align_of::<T>())?.cast::<T>();
        // SAFETY: the first `old_len` elements were copied (or stayed put); the tail is
        // inside the grown allocation and all-zero is valid for `T`.
        unsafe {
            ptr::write_bytes(fresh.as_ptr().add(old_len), 0, new_len - old_len);
            Ok(slice::from_raw_parts_mut(fresh.as_ptr(), new_len))
        }
    }

    fn alloc_typed<T>(&self, len: usize) -> Result<NonNull<T>, AllocError> {
        if mem::size_of::<T>() == 0 {
            return Ok(NonNull::dangling());
        }
        let size = mem::size_of::<T>()
            .checked_mul(len)
            .ok_or(AllocError::CapacityOverflow)?;
        Ok(self.state().alloc(size, mem::align_of::<T>())?.cast())
    }

    /// Rewinds every block to its start. Committed pages stay mapped and are reused, so an
    /// identical sequence of requests afterwards lands at identical addresses.
    pub fn reset(&mut self) {
        let state = self.state.get_mut();
        for block in &mut state.blocks {
            block.rewind();
        }
        state.current = 0;
        debug!(blocks = state.blocks.len(), "arena reset");
    }

    /// Returns every block to the OS. Further allocation reports
    /// [`AllocError::Released`].
    pub fn free_all(&mut self) {
        let state = self.state.get_mut();
        let blocks = state.blocks.len();
        state.blocks.clear();
        state.current = 0;
        state.released = true;
        debug!(blocks, "arena released");
    }

    /// Returns `true` after [`free_all`](Self::free_all).
    pub fn is_released(&self) -> bool {
        self.state_ref().released
    }

    /// Number of reserved blocks.
    pub fn block_count(&self) -> usize {
        self.state_ref().blocks.len()
    }

    /// Bytes consumed by bump cursors across all blocks.
    pub fn used_bytes(&self) -> usize {
        self.stats().used
    }

    /// Bytes committed to physical memory across all blocks.
    pub fn committed_bytes(&self) -> usize {
        self.stats().committed
    }

    /// Bytes of address space reserved across all blocks.
    pub fn reserved_bytes(&self) -> usize {
        self.stats().reserved
    }

    /// Snapshot of block and byte counts.
    pub fn stats(&self) -> ArenaStats {
        self.state_ref().stats()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("block_size", &self.state_ref().block_size)
            .field("released", &self.is_released())
            .field("stats", &self.stats())
            .finish()
    }
}
