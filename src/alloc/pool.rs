//! `HandlePool`: a fixed-capacity object pool addressed by generational handles.
//!
//! Slots live in one boxed array of `CAP` entries that never grows. Free slots form an
//! intrusive singly-linked list threaded through the slot array, so acquire and
//! give-back are O(1).
//!
//! Every slot carries a generation counter that is bumped when the slot is given back.
//! A [`Handle`] records the generation it was issued with, which turns double give-back
//! and use-after-give-back into checked [`PoolError::StaleHandle`] errors instead of
//! silently touching whatever now occupies the slot.

use core::fmt;

use tracing::{debug, warn};

use crate::error::PoolError;

/// An opaque, stable reference to a live slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Slot index inside the pool.
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Generation the handle was issued with.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.generation)
    }
}

enum Entry<T> {
    Occupied(T),
    Free { next_free: Option<u32> },
}

struct Slot<T> {
    generation: u32,
    entry: Entry<T>,
}

/// A pool of at most `CAP` live values.
///
/// # Example
///
/// ```
/// use hearth::alloc::HandlePool;
///
/// let mut pool: HandlePool<String, 2> = HandlePool::new();
/// let a = pool.acquire("mesh".to_string()).unwrap();
/// let _b = pool.acquire("font".to_string()).unwrap();
/// assert!(pool.acquire("sound".to_string()).is_err());
///
/// assert_eq!(pool.give_back(a).unwrap(), "mesh");
/// assert!(pool.give_back(a).is_err());
/// ```
pub struct HandlePool<T, const CAP: usize> {
    slots: Box<[Slot<T>]>,
    free_head: Option<u32>,
    len: usize,
}

impl<T, const CAP: usize> HandlePool<T, CAP> {
    const CAP_FITS: () = assert!(CAP <= u32::MAX as usize, "HandlePool capacity must fit in u32");

    /// Creates a pool with all `CAP` slots free.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAP_FITS;
        let slots = (0..CAP)
            .map(|i| Slot {
                generation: 0,
                entry: Entry::Free {
                    next_free: Self::successor(i),
                },
            })
            .collect();
        Self {
            slots,
            free_head: if CAP == 0 { None } else { Some(0) },
            len: 0,
        }
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn successor(i: usize) -> Option<u32> {
        // CAP <= u32::MAX is checked at compile time.
        (i + 1 < CAP).then(|| (i + 1) as u32)
    }

    /// Stores `value` in a free slot.
    ///
    /// # Errors
    /// [`PoolError::Exhausted`] when all `CAP` slots are live. The value is dropped.
    pub fn acquire(&mut self, value: T) -> Result<Handle, PoolError> {
        self.acquire_with(|| value)
    }

    /// Stores the value produced by `init` in a free slot. `init` only runs when a slot
    /// is available.
    ///
    /// # Errors
    /// [`PoolError::Exhausted`] when all `CAP` slots are live.
    pub fn acquire_with(&mut self, init: impl FnOnce() -> T) -> Result<Handle, PoolError> {
        let Some(index) = self.free_head else {
            warn!(capacity = CAP, "handle pool exhausted");
            return Err(PoolError::Exhausted { capacity: CAP });
        };
        let slot = &mut self.slots[index as usize];
        let Entry::Free { next_free } = slot.entry else {
            unreachable!("free list points at an occupied slot");
        };
        self.free_head = next_free;
        slot.entry = Entry::Occupied(init());
        self.len += 1;
        Ok(Handle {
            index,
            generation: slot.generation,
        })
    }

    /// Releases the slot behind `handle` and returns its value. Dropping the returned
    /// value is the slot's teardown.
    ///
    /// # Errors
    /// [`PoolError::StaleHandle`] if the handle was already given back or does not
    /// belong to a live slot.
    pub fn give_back(&mut self, handle: Handle) -> Result<T, PoolError> {
        self.check(handle)?;
        let slot = &mut self.slots[handle.index()];
        let entry = core::mem::replace(
            &mut slot.entry,
            Entry::Free {
                next_free: self.free_head,
            },
        );
        slot.generation = slot.generation.wrapping_add(1);
        self.free_head = Some(handle.index);
        self.len -= 1;
        match entry {
            Entry::Occupied(value) => Ok(value),
            Entry::Free { .. } => unreachable!("checked handle points at a free slot"),
        }
    }

    fn check(&self, handle: Handle) -> Result<(), PoolError> {
        match self.slots.get(handle.index()) {
            Some(slot)
                if slot.generation == handle.generation
                    && matches!(slot.entry, Entry::Occupied(_)) =>
            {
                Ok(())
            }
            _ => {
                debug!(%handle, "stale handle rejected");
                Err(PoolError::StaleHandle {
                    index: handle.index,
                    generation: handle.generation,
                })
            }
        }
    }

    /// Returns the value behind `handle`, if it is still live.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        match self.slots.get(handle.index()) {
            Some(Slot {
                generation,
                entry: Entry::Occupied(value),
            }) if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    /// Returns the value behind `handle` mutably, if it is still live.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        match self.slots.get_mut(handle.index()) {
            Some(Slot {
                generation,
                entry: Entry::Occupied(value),
            }) if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    /// Returns `true` if `handle` refers to a live slot.
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slot is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if every slot is live.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == CAP
    }

    /// The fixed number of slots.
    #[inline]
    pub const fn capacity(&self) -> usize {
        CAP
    }

    /// Iterates over live slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match &slot.entry {
            Entry::Occupied(value) => Some((Self::handle_at(i, slot.generation), value)),
            Entry::Free { .. } => None,
        })
    }

    /// Iterates mutably over live slots in index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| match &mut slot.entry {
            Entry::Occupied(value) => Some((Self::handle_at(i, slot.generation), value)),
            Entry::Free { .. } => None,
        })
    }

    /// Calls `f` for every live slot.
    pub fn for_each(&mut self, mut f: impl FnMut(Handle, &mut T)) {
        for (handle, value) in self.iter_mut() {
            f(handle, value);
        }
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn handle_at(index: usize, generation: u32) -> Handle {
        Handle {
            index: index as u32,
            generation,
        }
    }

    /// Tears down every live slot. Outstanding handles become stale.
    pub fn free_all(&mut self) {
        let mut released = 0usize;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if matches!(slot.entry, Entry::Occupied(_)) {
                slot.generation = slot.generation.wrapping_add(1);
                released += 1;
            }
            slot.entry = Entry::Free {
                next_free: Self::successor(i),
            };
        }
        self.free_head = if CAP == 0 { None } else { Some(0) };
        self.len = 0;
        debug!(released, capacity = CAP, "handle pool cleared");
    }
}

impl<T, const CAP: usize> Default for HandlePool<T, CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug, const CAP: usize> fmt::Debug for HandlePool<T, CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn acquire_until_full_then_reject() {
        let mut pool: HandlePool<u32, 4> = HandlePool::new();
        let handles: Vec<_> = (0..4).map(|i| pool.acquire(i).unwrap()).collect();
        assert!(pool.is_full());
        assert_eq!(pool.acquire(99), Err(PoolError::Exhausted { capacity: 4 }));
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(pool.get(*h), Some(&(i as u32)));
        }
    }

    #[test]
    fn released_slot_is_reused_with_new_generation() {
        let mut pool: HandlePool<&str, 2> = HandlePool::new();
        let a = pool.acquire("A").unwrap();
        assert_eq!(pool.give_back(a), Ok("A"));
        let b = pool.acquire("B").unwrap();
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(pool.get(a).is_none());
        assert_eq!(pool.get(b), Some(&"B"));
    }

    #[test]
    fn double_give_back_is_an_error() {
        let mut pool: HandlePool<u8, 1> = HandlePool::new();
        let h = pool.acquire(1).unwrap();
        pool.give_back(h).unwrap();
        assert_eq!(
            pool.give_back(h),
            Err(PoolError::StaleHandle {
                index: 0,
                generation: 0
            })
        );
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn give_back_runs_teardown() {
        struct Tracked(Rc<Cell<usize>>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let mut pool: HandlePool<Tracked, 3> = HandlePool::new();
        let a = pool.acquire(Tracked(drops.clone())).unwrap();
        pool.acquire(Tracked(drops.clone())).unwrap();
        pool.acquire(Tracked(drops.clone())).unwrap();

        drop(pool.give_back(a).unwrap());
        assert_eq!(drops.get(), 1);

        pool.free_all();
        assert_eq!(drops.get(), 3);
        assert!(pool.is_empty());
        assert_eq!(pool.iter().count(), 0);
    }

    #[test]
    fn iteration_skips_free_slots() {
        let mut pool: HandlePool<i32, 5> = HandlePool::new();
        let hs: Vec<_> = (0..5).map(|i| pool.acquire(i).unwrap()).collect();
        pool.give_back(hs[1]).unwrap();
        pool.give_back(hs[3]).unwrap();

        let live: Vec<i32> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec![0, 2, 4]);

        pool.for_each(|_, v| *v *= 10);
        assert_eq!(pool.get(hs[4]), Some(&40));
    }

    #[test]
    fn acquire_with_skips_init_when_full() {
        let mut pool: HandlePool<String, 1> = HandlePool::new();
        pool.acquire_with(|| "first".into()).unwrap();
        let mut ran = false;
        let res = pool.acquire_with(|| {
            ran = true;
            String::new()
        });
        assert!(res.is_err());
        assert!(!ran);
    }

    #[test]
    fn zero_capacity_pool_is_always_full() {
        let mut pool: HandlePool<u8, 0> = HandlePool::new();
        assert!(pool.is_full());
        assert!(pool.acquire(1).is_err());
    }
}
