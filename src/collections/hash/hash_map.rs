//! `HashMap`: an open-addressing table whose values act as their own keys.
//!
//! Key properties:
//! - **Linear probing**: lookups start at `hash(value) & (capacity - 1)` and walk forward,
//!   wrapping at the end. Capacity is always a power of two.
//! - **Tombstones**: `remove` marks a bucket deleted so later probes keep walking past it.
//!   Only a rehash reclaims tombstones.
//! - **Load factor**: occupied buckets never exceed `max_load_factor * capacity` once an
//!   insert returns. The default factor is 0.5.
//! - **Compaction**: tombstones count toward the rehash trigger. If the live entries
//!   alone are light, the rehash keeps the capacity and just purges tombstones, so
//!   insert/remove churn cannot grow the table without bound.
//!
//! Hashing and equality come from a [`Probe`], so the key can be any part of the value.
//! Bucket storage comes from a [`RawAlloc`]; a map built with [`HashMap::new_in`] over
//! `&Arena` keeps its table in the arena.

use core::alloc::Layout;
use core::fmt;
use core::hash::Hash;
use core::marker::PhantomData;
use core::mem;
use core::ptr::{self, NonNull};
use core::slice;

use tracing::trace;

use super::probe::{FnProbe, Probe, StdProbe};
use crate::alloc::{Global, RawAlloc};
use crate::config::HashMapConfig;
use crate::error::{AllocError, ConfigError};

/// Load factor used unless configured otherwise.
pub const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.5;

/// Smallest non-empty table.
const MIN_CAPACITY: usize = 8;

enum Bucket<T> {
    Empty,
    Occupied(T),
    Deleted,
}

/// A bucket array obtained from a [`RawAlloc`]. The owning map frees it.
struct Table<T> {
    ptr: NonNull<Bucket<T>>,
    len: usize,
    _owns: PhantomData<Bucket<T>>,
}

// SAFETY: a table uniquely owns its buckets, like `Box<[Bucket<T>]>`.
unsafe impl<T: Send> Send for Table<T> {}
// SAFETY: shared access only hands out `&Bucket<T>`.
unsafe impl<T: Sync> Sync for Table<T> {}

impl<T> Table<T> {
    const fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            _owns: PhantomData,
        }
    }

    fn layout(len: usize) -> Result<Layout, AllocError> {
        Layout::array::<Bucket<T>>(len).map_err(|_| AllocError::CapacityOverflow)
    }

    fn allocate<A: RawAlloc>(alloc: &A, len: usize) -> Result<Self, AllocError> {
        if len == 0 {
            return Ok(Self::empty());
        }
        let ptr = alloc.allocate(Self::layout(len)?)?.cast::<Bucket<T>>();
        for i in 0..len {
            // SAFETY: the allocation holds `len` buckets.
            unsafe { ptr.as_ptr().add(i).write(Bucket::Empty) };
        }
        Ok(Self {
            ptr,
            len,
            _owns: PhantomData,
        })
    }

    #[inline]
    fn as_slice(&self) -> &[Bucket<T>] {
        // SAFETY: `ptr` holds `len` initialized buckets (or is dangling with `len == 0`).
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    fn as_mut_slice(&mut self) -> &mut [Bucket<T>] {
        // SAFETY: as in `as_slice`, and `&mut self` makes the access unique.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Drops every bucket and hands the storage back, leaving an empty table.
    ///
    /// # Safety
    /// `alloc` must be the allocator the table was obtained from.
    unsafe fn free<A: RawAlloc>(&mut self, alloc: &A) {
        if self.len == 0 {
            return;
        }
        let table = mem::replace(self, Self::empty());
        // SAFETY: the buckets are initialized and dropped exactly once.
        unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(table.ptr.as_ptr(), table.len)) };
        if let Ok(layout) = Self::layout(table.len) {
            // SAFETY: same allocator and layout as in `allocate`.
            unsafe { alloc.deallocate(table.ptr.cast(), layout) };
        }
    }
}

#[cold]
#[inline(never)]
fn table_alloc_failed(err: AllocError) -> ! {
    panic!("hash map table allocation failed: {err}")
}

/// Open-addressing hash table keyed by its values.
///
/// # Example
///
/// ```
/// use hearth::collections::HashMap;
///
/// let mut paths = HashMap::new();
/// let (_, inserted) = paths.try_insert("shaders/pbr.wgsl");
/// assert!(inserted);
/// let (_, inserted) = paths.try_insert("shaders/pbr.wgsl");
/// assert!(!inserted);
/// assert_eq!(paths.len(), 1);
/// ```
///
/// Over an arena:
///
/// ```
/// use hearth::{Arena, HashMap};
///
/// let arena = Arena::new(4096);
/// let mut ids = HashMap::new_in(&arena);
/// ids.insert(7u32);
/// assert!(ids.contains(&7));
/// assert!(arena.used_bytes() > 0);
/// ```
pub struct HashMap<T, P = StdProbe, A: RawAlloc = Global> {
    table: Table<T>,
    occupied: usize,
    tombstones: usize,
    max_load: f32,
    /// Expected entry count used to size the first table.
    hint: usize,
    probe: P,
    alloc: A,
}

impl<T: Hash + Eq> HashMap<T, StdProbe> {
    /// Creates an empty map. No table is allocated until the first insert.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty map sized to hold `hint` entries without rehashing.
    pub fn with_capacity(hint: usize) -> Self {
        Self::with_probe(hint, StdProbe::default())
    }

    /// Creates an empty map from configuration.
    ///
    /// # Errors
    /// [`ConfigError::InvalidLoadFactor`] for a load factor outside (0, 1).
    pub fn with_config(config: &HashMapConfig) -> Result<Self, ConfigError> {
        let mut map = Self::new();
        map.set_max_load_factor(config.max_load_factor)?;
        map.hint = config.initial_capacity;
        if let Err(err) = map.reserve(config.initial_capacity) {
            table_alloc_failed(err);
        }
        Ok(map)
    }
}

impl<T: Hash + Eq, A: RawAlloc> HashMap<T, StdProbe, A> {
    /// Creates an empty map whose table comes from `alloc`.
    pub fn new_in(alloc: A) -> Self {
        Self::with_capacity_in(0, alloc)
    }

    /// Creates an empty map in `alloc` sized to hold `hint` entries without rehashing.
    pub fn with_capacity_in(hint: usize, alloc: A) -> Self {
        Self::with_probe_in(hint, StdProbe::default(), alloc)
    }
}

impl<T, H, E> HashMap<T, FnProbe<H, E>>
where
    H: Fn(&T) -> u64,
    E: Fn(&T, &T) -> bool,
{
    /// Creates an empty map with a caller-supplied hash function and equality predicate.
    pub fn with_fns(hint: usize, hash: H, eq: E) -> Self {
        Self::with_probe(hint, FnProbe::new(hash, eq))
    }
}

impl<T, P: Probe<T>> HashMap<T, P> {
    /// Creates an empty map using `probe` for hashing and equality.
    pub fn with_probe(hint: usize, probe: P) -> Self {
        Self::with_probe_in(hint, probe, Global)
    }
}

impl<T, P: Probe<T>, A: RawAlloc> HashMap<T, P, A> {
    /// Creates an empty map using `probe` for hashing and equality and `alloc` for
    /// storage.
    ///
    /// # Panics
    /// If `hint > 0` and the first table cannot be allocated.
    pub fn with_probe_in(hint: usize, probe: P, alloc: A) -> Self {
        let mut map = Self {
            table: Table::empty(),
            occupied: 0,
            tombstones: 0,
            max_load: DEFAULT_MAX_LOAD_FACTOR,
            hint,
            probe,
            alloc,
        };
        if let Err(err) = map.reserve(hint) {
            table_alloc_failed(err);
        }
        map
    }

    /// The allocator backing the table.
    #[inline]
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    #[inline]
    #[allow(clippy::cast_precision_loss)]
    fn over_load(&self, count: usize, capacity: usize) -> bool {
        count as f64 > f64::from(self.max_load) * capacity as f64
    }

    /// Smallest power-of-two capacity holding `count` entries under the load factor.
    fn capacity_for(&self, count: usize) -> Result<usize, AllocError> {
        let mut capacity = MIN_CAPACITY;
        while self.over_load(count, capacity) {
            capacity = capacity.checked_mul(2).ok_or(AllocError::CapacityOverflow)?;
        }
        Ok(capacity)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn home(&self, hash: u64) -> usize {
        (hash as usize) & (self.capacity() - 1)
    }

    /// Rehashes if one more entry would break the load invariant.
    fn make_room(&mut self) -> Result<(), AllocError> {
        let capacity = self.capacity();
        if capacity == 0 {
            let fresh = self.capacity_for(self.hint.max(1))?;
            return self.rehash_exact(fresh);
        }
        let live = self.occupied + 1;
        if self.over_load(live + self.tombstones, capacity) {
            let target = if self.over_load(live * 2, capacity) {
                let doubled = capacity.checked_mul(2).ok_or(AllocError::CapacityOverflow)?;
                self.capacity_for(live)?.max(doubled)
            } else {
                capacity
            };
            self.rehash_exact(target)?;
        }
        Ok(())
    }

    /// Moves every entry into a fresh table of `capacity` buckets. The map is unchanged
    /// if the table cannot be allocated.
    fn rehash_exact(&mut self, capacity: usize) -> Result<(), AllocError> {
        let fresh = Table::allocate(&self.alloc, capacity)?;
        let mut old = mem::replace(&mut self.table, fresh);
        let purged = self.tombstones;
        self.occupied = 0;
        self.tombstones = 0;
        for bucket in old.as_mut_slice() {
            if let Bucket::Occupied(value) = mem::replace(bucket, Bucket::Empty) {
                self.place(value);
            }
        }
        trace!(
            from = old.len,
            to = capacity,
            entries = self.occupied,
            purged,
            "hash map rehashed"
        );
        // SAFETY: `old` came from `self.alloc`.
        unsafe { old.free(&self.alloc) };
        Ok(())
    }

    /// Writes `value` into the first empty or deleted bucket of its probe sequence.
    fn place(&mut self, value: T) -> usize {
        let mut idx = self.home(self.probe.hash(&value));
        let buckets = self.table.as_mut_slice();
        let mask = buckets.len() - 1;
        loop {
            match buckets[idx] {
                Bucket::Empty => break,
                Bucket::Deleted => {
                    self.tombstones -= 1;
                    break;
                }
                Bucket::Occupied(_) => idx = (idx + 1) & mask,
            }
        }
        buckets[idx] = Bucket::Occupied(value);
        self.occupied += 1;
        idx
    }

    fn find(&self, hash: u64, mut pred: impl FnMut(&T) -> bool) -> Option<usize> {
        let capacity = self.capacity();
        if capacity == 0 {
            return None;
        }
        let buckets = self.table.as_slice();
        let mask = capacity - 1;
        let mut idx = self.home(hash);
        for _ in 0..capacity {
            match &buckets[idx] {
                Bucket::Empty => return None,
                Bucket::Deleted => {}
                Bucket::Occupied(value) => {
                    if pred(value) {
                        return Some(idx);
                    }
                }
            }
            idx = (idx + 1) & mask;
        }
        None
    }

    fn value_mut(&mut self, idx: usize) -> &mut T {
        match &mut self.table.as_mut_slice()[idx] {
            Bucket::Occupied(value) => value,
            _ => unreachable!("bucket {idx} is not occupied"),
        }
    }

    /// Inserts `value` without checking for an equal entry, so duplicates are possible.
    /// Returns the stored value and `true`.
    ///
    /// The returned reference must not be used to change the value's key.
    ///
    /// # Panics
    /// If a growing table cannot be allocated. Use [`HashMap::reserve`] first to handle
    /// that as an error.
    pub fn insert(&mut self, value: T) -> (&mut T, bool) {
        if let Err(err) = self.make_room() {
            table_alloc_failed(err);
        }
        let idx = self.place(value);
        (self.value_mut(idx), true)
    }

    /// Inserts `value` unless an equal entry exists. Returns the stored entry and whether
    /// an insert happened.
    ///
    /// # Panics
    /// Same as [`HashMap::insert`].
    pub fn try_insert(&mut self, value: T) -> (&mut T, bool) {
        if let Some(idx) = self.search_index(&value) {
            return (self.value_mut(idx), false);
        }
        self.insert(value)
    }

    /// Makes room for `additional` more entries without a rehash.
    ///
    /// # Errors
    /// [`AllocError::CapacityOverflow`] if the table would be too large, or whatever the
    /// allocator reports. The map is unchanged on error.
    pub fn reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        if additional == 0 {
            return Ok(());
        }
        let wanted = self
            .occupied
            .checked_add(additional)
            .ok_or(AllocError::CapacityOverflow)?;
        let capacity = self.capacity();
        if capacity > 0 && !self.over_load(wanted + self.tombstones, capacity) {
            return Ok(());
        }
        let target = self.capacity_for(wanted)?.max(capacity);
        self.rehash_exact(target)
    }

    /// Bucket index of an entry equal to `value`.
    pub fn search_index(&self, value: &T) -> Option<usize> {
        self.find(self.probe.hash(value), |candidate| self.probe.eq(candidate, value))
    }

    /// Returns the entry equal to `value`.
    pub fn search(&self, value: &T) -> Option<&T> {
        self.search_index(value).and_then(|idx| self.get(idx))
    }

    /// Returns the entry equal to `value` mutably.
    pub fn search_mut(&mut self, value: &T) -> Option<&mut T> {
        let idx = self.search_index(value)?;
        Some(self.value_mut(idx))
    }

    /// Looks up by a precomputed hash and predicate, for keys that are cheaper to hash
    /// than to materialise as a full value. `hash` must match what the probe produces.
    pub fn search_hashed(&self, hash: u64, pred: impl FnMut(&T) -> bool) -> Option<&T> {
        self.find(hash, pred).and_then(|idx| self.get(idx))
    }

    /// Returns `true` if an entry equal to `value` exists.
    pub fn contains(&self, value: &T) -> bool {
        self.search_index(value).is_some()
    }

    /// Returns the entry stored in bucket `idx`.
    pub fn get(&self, idx: usize) -> Option<&T> {
        match self.table.as_slice().get(idx) {
            Some(Bucket::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    /// Removes the entry equal to `value`, leaving a tombstone.
    pub fn remove(&mut self, value: &T) -> Option<T> {
        let idx = self.search_index(value)?;
        self.remove_at(idx)
    }

    /// Removes the entry in bucket `idx`, leaving a tombstone.
    pub fn remove_at(&mut self, idx: usize) -> Option<T> {
        let bucket = self.table.as_mut_slice().get_mut(idx)?;
        match mem::replace(bucket, Bucket::Deleted) {
            Bucket::Occupied(value) => {
                self.occupied -= 1;
                self.tombstones += 1;
                Some(value)
            }
            other => {
                *bucket = other;
                None
            }
        }
    }

    /// Re-inserts every entry into a table of at least `new_capacity` buckets, dropping
    /// tombstones. The capacity is rounded up to a power of two and to whatever the load
    /// factor requires.
    ///
    /// # Errors
    /// [`AllocError::CapacityOverflow`] when the rounded capacity does not fit in memory,
    /// or whatever the allocator reports. The map is unchanged on error.
    pub fn rehash(&mut self, new_capacity: usize) -> Result<(), AllocError> {
        let requested = new_capacity
            .max(1)
            .checked_next_power_of_two()
            .ok_or(AllocError::CapacityOverflow)?;
        let capacity = requested.max(self.capacity_for(self.occupied)?);
        self.rehash_exact(capacity)
    }

    /// Shrinks the table to the smallest capacity that holds the live entries, releasing
    /// it entirely when the map is empty. Keeps the current table if a smaller one
    /// cannot be allocated.
    pub fn shrink_to_fit(&mut self) {
        if self.occupied == 0 {
            // SAFETY: the table came from `self.alloc`.
            unsafe { self.table.free(&self.alloc) };
            self.tombstones = 0;
            return;
        }
        let Ok(target) = self.capacity_for(self.occupied) else {
            return;
        };
        if target < self.capacity() || self.tombstones > 0 {
            if let Err(err) = self.rehash_exact(target) {
                trace!(%err, "hash map shrink skipped");
            }
        }
    }

    /// Removes every entry, keeping the capacity.
    pub fn clear(&mut self) {
        for bucket in self.table.as_mut_slice() {
            *bucket = Bucket::Empty;
        }
        self.occupied = 0;
        self.tombstones = 0;
    }

    /// Releases the table.
    pub fn destroy(self) {
        trace!(capacity = self.capacity(), entries = self.occupied, "hash map destroyed");
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.occupied
    }

    /// Returns `true` if the map has no live entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Number of buckets.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.len
    }

    /// Number of deleted buckets awaiting a rehash.
    #[inline]
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Live entries divided by capacity.
    #[allow(clippy::cast_precision_loss)]
    pub fn load_factor(&self) -> f32 {
        if self.capacity() == 0 {
            0.0
        } else {
            self.occupied as f32 / self.capacity() as f32
        }
    }

    /// The rehash threshold.
    #[inline]
    pub fn max_load_factor(&self) -> f32 {
        self.max_load
    }

    /// Changes the rehash threshold, rehashing at once if the table is now too full.
    ///
    /// # Errors
    /// [`ConfigError::InvalidLoadFactor`] for a factor outside (0, 1).
    ///
    /// # Panics
    /// If the required rehash cannot allocate its table.
    pub fn set_max_load_factor(&mut self, factor: f32) -> Result<(), ConfigError> {
        if !(factor > 0.0 && factor < 1.0) {
            return Err(ConfigError::InvalidLoadFactor(factor));
        }
        self.max_load = factor;
        if self.capacity() > 0 && self.over_load(self.occupied + self.tombstones, self.capacity()) {
            let resized = self
                .capacity_for(self.occupied)
                .and_then(|target| self.rehash_exact(target.max(self.capacity())));
            if let Err(err) = resized {
                table_alloc_failed(err);
            }
        }
        Ok(())
    }

    /// Iterates over live entries in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.table.as_slice().iter().filter_map(|bucket| match bucket {
            Bucket::Occupied(value) => Some(value),
            _ => None,
        })
    }
}

impl<T, P, A: RawAlloc> Drop for HashMap<T, P, A> {
    fn drop(&mut self) {
        // SAFETY: the table came from `self.alloc`.
        unsafe { self.table.free(&self.alloc) };
    }
}

impl<T: Hash + Eq> Default for HashMap<T, StdProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug, P: Probe<T>, A: RawAlloc> fmt::Debug for HashMap<T, P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
