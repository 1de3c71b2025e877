//! Fixed-size worker pool over a FIFO task queue.
//!
//! Tasks are boxed `FnOnce() + Send + 'static` closures. There is no result channel:
//! a task writes its output into storage the caller owns (a slot in an `Arc<Mutex<_>>`,
//! an atomic, a channel it captured).
//!
//! The pool keeps one invariant that everything else hangs off: the number of queued
//! tasks plus the number of running tasks only goes down when a worker *finishes* a
//! task. A worker therefore bumps `active` before it releases the queue lock after
//! popping, and [`ThreadPool::wait`] can use "queue empty and nothing active" as its
//! idle condition without racing a worker that has popped but not yet started.
//!
//! A panicking task kills its worker thread. The worker's bookkeeping guards still run
//! during unwinding, so `wait` never hangs on a task that will not finish, and
//! [`ThreadPool::destroy`] reports how many workers died.

use std::collections::VecDeque;
use std::sync::PoisonError;

use crossbeam_utils::CachePadded;
use tracing::{debug, error, trace, warn};

use crate::config::{default_worker_count, ThreadPoolConfig};
use crate::error::ThreadPoolError;
use crate::sync::{thread, Arc, AtomicUsize, Condvar, Mutex, MutexGuard, Ordering};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    tasks: VecDeque<Task>,
    shutdown: bool,
    live_workers: usize,
}

struct Shared {
    queue: Mutex<Queue>,
    not_empty: Condvar,
    idle: Condvar,
    active: CachePadded<AtomicUsize>,
}

impl Shared {
    fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
                shutdown: false,
                live_workers: 0,
            }),
            not_empty: Condvar::new(),
            idle: Condvar::new(),
            active: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    // No queue invariant spans user code, so a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, task: Task) -> Result<(), ThreadPoolError> {
        let mut queue = self.lock();
        if queue.shutdown {
            return Err(ThreadPoolError::ShutDown);
        }
        queue.tasks.push_back(task);
        drop(queue);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks for the next task; `None` once shut down with nothing left to run.
    fn next_task(&self) -> Option<Task> {
        let mut queue = self.lock();
        loop {
            if let Some(task) = queue.tasks.pop_front() {
                self.active.fetch_add(1, Ordering::AcqRel);
                return Some(task);
            }
            if queue.shutdown {
                return None;
            }
            queue = self
                .not_empty
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Decrements `active` when a task finishes or unwinds. An unwinding task also takes
/// its worker out of the live count in the same critical section, so `wait` sees both
/// changes together.
struct Running<'a> {
    shared: &'a Shared,
    index: usize,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        let mut queue = self.shared.lock();
        let remaining = self.shared.active.fetch_sub(1, Ordering::AcqRel) - 1;
        if std::thread::panicking() {
            queue.live_workers -= 1;
            error!(worker = self.index, live = queue.live_workers, "worker terminated by panicking task");
            self.shared.idle.notify_all();
        } else if remaining == 0 && queue.tasks.is_empty() {
            self.shared.idle.notify_all();
        }
    }
}

fn worker_loop(shared: &Shared, index: usize) {
    while let Some(task) = shared.next_task() {
        let _running = Running { shared, index };
        task();
    }
    let mut queue = shared.lock();
    queue.live_workers -= 1;
    trace!(worker = index, live = queue.live_workers, "worker exited");
    drop(queue);
    shared.idle.notify_all();
}

/// Observable lifecycle of a [`ThreadPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Constructed, workers not yet spawned. Submitted tasks queue up.
    Created,
    /// Running with nothing queued or active.
    Idle,
    /// Running with queued or active tasks.
    Busy,
    /// Shut down; workers joined.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// A fixed-size pool of worker threads.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use hearth::concurrency::ThreadPool;
///
/// let mut pool = ThreadPool::new(2);
/// pool.start().unwrap();
///
/// let done = Arc::new(AtomicUsize::new(0));
/// for _ in 0..8 {
///     let done = Arc::clone(&done);
///     pool.submit(move || {
///         done.fetch_add(1, Ordering::Relaxed);
///     })
///     .unwrap();
/// }
/// pool.wait().unwrap();
/// assert_eq!(done.load(Ordering::Relaxed), 8);
/// pool.destroy().unwrap();
/// ```
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
    worker_count: usize,
    thread_name: String,
    stack_size: Option<usize>,
    lifecycle: Lifecycle,
}

impl ThreadPool {
    /// Creates a pool that will run `workers` threads once started. Zero picks the
    /// default worker count (`HEARTH_WORKERS`, else the CPU count, else 4).
    pub fn new(workers: usize) -> Self {
        Self::with_config(&ThreadPoolConfig::default().workers(workers))
    }

    /// Creates a pool from configuration.
    pub fn with_config(config: &ThreadPoolConfig) -> Self {
        let worker_count = match config.workers {
            Some(0) | None => default_worker_count(),
            Some(n) => n,
        };
        Self {
            shared: Arc::new(Shared::new()),
            workers: Vec::with_capacity(worker_count),
            worker_count,
            thread_name: config.thread_name.clone(),
            stack_size: config.stack_size,
            lifecycle: Lifecycle::Created,
        }
    }

    /// Spawns the workers.
    ///
    /// # Errors
    /// [`ThreadPoolError::AlreadyStarted`] on a second call (or after shutdown).
    /// [`ThreadPoolError::Spawn`] if a thread cannot be created; workers spawned so far
    /// are shut down and the pool ends up stopped.
    pub fn start(&mut self) -> Result<(), ThreadPoolError> {
        if self.lifecycle != Lifecycle::Created {
            return Err(ThreadPoolError::AlreadyStarted);
        }
        self.lifecycle = Lifecycle::Running;
        for index in 0..self.worker_count {
            let mut builder = thread::Builder::new().name(format!("{}-{index}", self.thread_name));
            if let Some(bytes) = self.stack_size {
                builder = builder.stack_size(bytes);
            }
            self.shared.lock().live_workers += 1;
            let shared = Arc::clone(&self.shared);
            match builder.spawn(move || worker_loop(&shared, index)) {
                Ok(handle) => self.workers.push(handle),
                Err(err) => {
                    self.shared.lock().live_workers -= 1;
                    error!(worker = index, error = %err, "failed to spawn worker");
                    // Spawn is the error worth reporting; panics are already logged.
                    let _ = self.shutdown();
                    return Err(ThreadPoolError::Spawn(err));
                }
            }
        }
        debug!(workers = self.worker_count, name = %self.thread_name, "thread pool started");
        Ok(())
    }

    /// Queues a task. Never blocks; allowed before [`start`](Self::start).
    ///
    /// # Errors
    /// [`ThreadPoolError::ShutDown`] once the pool is shutting down.
    pub fn submit<F>(&self, task: F) -> Result<(), ThreadPoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.push(Box::new(task))
    }

    /// A cloneable handle that can submit tasks from other threads, including from
    /// inside running tasks.
    pub fn submitter(&self) -> Submitter {
        Submitter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Blocks until the queue is empty and no task is running.
    ///
    /// Must not be called from inside a task of the same pool: the calling task counts
    /// as active, so the pool can never become idle.
    ///
    /// # Errors
    /// [`ThreadPoolError::NoWorkers`] if tasks are queued but no worker is alive to run
    /// them (the pool was never started, or every worker died).
    pub fn wait(&self) -> Result<(), ThreadPoolError> {
        let mut queue = self.shared.lock();
        loop {
            let active = self.shared.active.load(Ordering::Acquire);
            if queue.tasks.is_empty() && active == 0 {
                return Ok(());
            }
            if queue.live_workers == 0 && active == 0 {
                return Err(ThreadPoolError::NoWorkers {
                    pending: queue.tasks.len(),
                });
            }
            queue = self
                .shared
                .idle
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Shuts the pool down and joins every worker. Workers finish the tasks still queued
    /// before they exit.
    ///
    /// # Errors
    /// [`ThreadPoolError::WorkerPanicked`] if any worker died to a panicking task.
    pub fn destroy(mut self) -> Result<(), ThreadPoolError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), ThreadPoolError> {
        if self.lifecycle == Lifecycle::Stopped {
            return Ok(());
        }
        self.shared.lock().shutdown = true;
        self.shared.not_empty.notify_all();

        let panicked = self
            .workers
            .drain(..)
            .map(thread::JoinHandle::join)
            .filter(Result::is_err)
            .count();
        self.lifecycle = Lifecycle::Stopped;

        let orphaned: Vec<Task> = self.shared.lock().tasks.drain(..).collect();
        if !orphaned.is_empty() {
            warn!(tasks = orphaned.len(), "dropping tasks that no worker ran");
        }
        drop(orphaned);

        debug!(panicked, "thread pool destroyed");
        if panicked > 0 {
            Err(ThreadPoolError::WorkerPanicked { count: panicked })
        } else {
            Ok(())
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        match self.lifecycle {
            Lifecycle::Created => PoolState::Created,
            Lifecycle::Stopped => PoolState::Stopped,
            Lifecycle::Running => {
                let queue = self.shared.lock();
                if queue.tasks.is_empty() && self.shared.active.load(Ordering::Acquire) == 0 {
                    PoolState::Idle
                } else {
                    PoolState::Busy
                }
            }
        }
    }

    /// Number of workers the pool runs when started.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Number of worker threads currently alive.
    pub fn live_workers(&self) -> usize {
        self.shared.lock().live_workers
    }

    /// Number of tasks waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    /// Number of tasks currently running.
    pub fn active(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::with_config(&ThreadPoolConfig::default())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!(error = %err, "thread pool dropped with failed workers");
        }
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.worker_count)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Submits tasks to a [`ThreadPool`] without borrowing it.
#[derive(Clone)]
pub struct Submitter {
    shared: Arc<Shared>,
}

impl Submitter {
    /// Queues a task.
    ///
    /// # Errors
    /// [`ThreadPoolError::ShutDown`] once the pool is shutting down.
    pub fn submit<F>(&self, task: F) -> Result<(), ThreadPoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.push(Box::new(task))
    }
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter").finish_non_exhaustive()
    }
}
