//! Synchronization primitives used by the thread pool.
//!
//! Normal builds use `std`; `RUSTFLAGS="--cfg loom"` swaps in loom's model-checked
//! versions so the queue and idle protocol can be explored exhaustively.

#[cfg(not(loom))]
pub(crate) use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Condvar, Mutex, MutexGuard,
};
#[cfg(not(loom))]
pub(crate) use std::thread;

#[cfg(loom)]
pub(crate) use loom::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Condvar, Mutex, MutexGuard,
};
#[cfg(loom)]
pub(crate) use loom::thread;
