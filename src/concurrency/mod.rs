//! Concurrency primitives.
//!
//! - [`ThreadPool`]: a fixed set of workers draining a FIFO queue, with a blocking
//!   [`wait`](ThreadPool::wait) for the idle condition.
//! - [`ContextLock`]: a mutex that keeps an [`ExclusiveContext`] bound while held.

pub mod context;
pub mod thread_pool;

pub use context::{ContextGuard, ContextLock, ExclusiveContext};
pub use thread_pool::{PoolState, Submitter, ThreadPool};
