//! Error types for every substrate component.
//!
//! Each component reports its own error enum so callers can match on the failure
//! they can actually recover from. [`Error`] folds them together for callers that
//! just want to propagate with `?`.

use std::io;
use std::path::PathBuf;

/// The error type for arena allocation failures and misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// The operating system refused to reserve a new block.
    #[error("virtual memory reservation of {bytes} bytes failed")]
    OutOfMemory {
        /// Size of the reservation that failed.
        bytes: usize,
    },
    /// Reserved pages could not be made readable and writable.
    #[error("committing {bytes} bytes of reserved memory failed")]
    CommitFailed {
        /// Size of the commit that failed.
        bytes: usize,
    },
    /// `count * elem_size` (plus alignment) does not fit in `usize`.
    #[error("allocation size overflows usize")]
    CapacityOverflow,
    /// The pointer is not the start of a live allocation in this arena.
    #[error("pointer is not the start of a live allocation in this arena")]
    ForeignPointer,
    /// `realloc` was asked for fewer bytes than the allocation already holds.
    #[error("cannot shrink an arena allocation from {old} to {new} bytes")]
    Shrink {
        /// Current size of the allocation.
        old: usize,
        /// Requested size.
        new: usize,
    },
    /// The arena was released with `free_all` and can no longer allocate.
    #[error("arena has been released")]
    Released,
}

/// The error type for [`HandlePool`](crate::alloc::HandlePool) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Every slot is live.
    #[error("handle pool exhausted ({capacity} slots live)")]
    Exhausted {
        /// Fixed capacity of the pool.
        capacity: usize,
    },
    /// The handle was already given back, or never came from this pool.
    #[error("stale handle {index}:{generation}")]
    StaleHandle {
        /// Slot index carried by the handle.
        index: u32,
        /// Generation carried by the handle.
        generation: u32,
    },
}

/// The error type for [`ThreadPool`](crate::concurrency::ThreadPool) operations.
#[derive(Debug, thiserror::Error)]
pub enum ThreadPoolError {
    /// `start` was called on a pool that already has workers.
    #[error("thread pool already started")]
    AlreadyStarted,
    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),
    /// `wait` was called while tasks are queued but no worker is alive to run them.
    #[error("{pending} tasks pending but no worker is running")]
    NoWorkers {
        /// Number of queued tasks that cannot make progress.
        pending: usize,
    },
    /// The pool is shutting down and no longer accepts tasks.
    #[error("thread pool is shut down")]
    ShutDown,
    /// One or more workers died because a task panicked.
    #[error("{count} worker thread(s) terminated by a panicking task")]
    WorkerPanicked {
        /// Number of workers whose join reported a panic.
        count: usize,
    },
}

/// The error type for loading and validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {}", path.display())]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The configuration text is not valid JSON for the expected shape.
    #[error("malformed configuration")]
    Parse(#[from] serde_json::Error),
    /// A hash map load factor outside the open interval (0, 1).
    #[error("max_load_factor must be in (0, 1), got {0}")]
    InvalidLoadFactor(f32),
    /// An arena block size of zero.
    #[error("arena block_size must be non-zero")]
    ZeroBlockSize,
    /// An explicit worker count of zero.
    #[error("thread pool worker count must be non-zero")]
    ZeroWorkers,
}

/// Any error produced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Arena failure.
    #[error(transparent)]
    Alloc(#[from] AllocError),
    /// Handle pool failure.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Thread pool failure.
    #[error(transparent)]
    ThreadPool(#[from] ThreadPoolError),
    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A specialized `Result` for this crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
