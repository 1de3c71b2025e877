//! # `hearth` - Runtime Substrate for Bulk-Lifetime Workloads
//!
//! Building blocks for programs that load, decode and hand off batches of data with
//! well-defined lifetimes: an asset loader, a level streamer, a request handler that
//! builds a response and throws every intermediate away.
//!
//! ## Components
//!
//! 1. **Arena** ([`Arena`]):
//!    - Reserves address space in blocks and commits pages only as they are used
//!    - Bump allocation with 16-byte alignment; reclamation is `reset` or `free_all`
//!    - Typed allocations borrow the arena, so they cannot outlive a reset
//!
//! 2. **Handle pool** ([`HandlePool`]):
//!    - Fixed capacity, O(1) acquire and give-back through an intrusive free list
//!    - Generation-checked [`Handle`]s reject stale and double give-backs
//!
//! 3. **Hash map** ([`HashMap`]):
//!    - Open addressing with linear probing and tombstones
//!    - Values act as their own keys; hashing and equality come from a [`Probe`]
//!    - Bucket storage comes from a [`RawAlloc`]: the heap by default, or an arena
//!
//! 4. **Thread pool** ([`ThreadPool`]):
//!    - Fixed worker count over a FIFO queue; `wait` blocks until queue and workers
//!      are both idle
//!
//! 5. **Exclusive context** ([`ContextLock`]):
//!    - A mutex whose guard keeps an [`ExclusiveContext`] bound to the holding thread
//!
//! ## Resource Model
//!
//! Nothing here is global. Callers create one arena per scope (per asset, per frame,
//! per request), size a thread pool to the work, and tear both down when the scope
//! ends. Every fallible operation returns a typed error; see [`error`].
//!
//! ## Logging
//!
//! Components emit [`tracing`] events (block reservation, rehash, worker lifecycle).
//! The library never installs a subscriber.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use hearth::{Arena, HandlePool, HashMap, ThreadPool};
//!
//! // Scratch memory for one unit of work.
//! let arena = Arena::new(4096);
//! let name = arena.alloc_str("albedo.png").unwrap();
//!
//! // Deduplicate by path.
//! let mut seen = HashMap::new();
//! assert!(seen.try_insert(name.to_string()).1);
//!
//! // Fixed slots addressed by handle.
//! let mut slots: HandlePool<u32, 8> = HandlePool::new();
//! let handle = slots.acquire(0).unwrap();
//!
//! // Decode on worker threads into caller-owned storage.
//! let mut pool = ThreadPool::new(2);
//! pool.start().unwrap();
//! let decoded = Arc::new(Mutex::new(0u32));
//! let out = Arc::clone(&decoded);
//! pool.submit(move || *out.lock().unwrap() = 64).unwrap();
//! pool.wait().unwrap();
//!
//! *slots.get_mut(handle).unwrap() = *decoded.lock().unwrap();
//! assert_eq!(slots.get(handle), Some(&64));
//! pool.destroy().unwrap();
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod alloc;
pub mod collections;
pub mod concurrency;
pub mod config;
pub mod error;
pub(crate) mod sync;

pub use alloc::{Arena, ArenaStats, Global, Handle, HandlePool, RawAlloc};
pub use collections::{FnProbe, HashMap, Probe, StdProbe};
pub use concurrency::{ContextGuard, ContextLock, ExclusiveContext, PoolState, Submitter, ThreadPool};
pub use config::SubstrateConfig;
pub use error::{AllocError, ConfigError, Error, PoolError, Result, ThreadPoolError};

// Compile-time layout checks.
const _: () = {
    use core::mem;

    // Handles are two words of 32 bits and stay `Copy`-cheap.
    assert!(mem::size_of::<Handle>() == 8);

    // `Option<Handle>` should not need a discriminant beyond the pair itself.
    assert!(mem::size_of::<Option<Handle>>() <= 12);

    // The arena is a single cell around its state; allocation never needs a lock.
    assert!(mem::size_of::<Arena>() <= mem::size_of::<usize>() * 8);

    // Untyped allocations satisfy any scalar alignment.
    assert!(alloc::MIN_ALIGN >= mem::align_of::<u128>());
};
