//! Exclusive-context locking.
//!
//! Some resources are usable from any thread but only by one thread at a time, and must
//! be bound to the calling thread first: a graphics context made current, a device queue,
//! a session tied to thread-local state. [`ContextLock`] pairs a mutex with that binding
//! so the context is bound for exactly as long as the lock is held. The guard unbinds and
//! then unlocks on every exit path, including unwinding.

use core::fmt;
use core::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::trace;

/// A resource that must be bound to the current thread before use.
pub trait ExclusiveContext {
    /// Failure to bind.
    type Error;

    /// Makes the context current on the calling thread.
    fn bind(&mut self) -> Result<(), Self::Error>;

    /// Releases the context from the calling thread.
    fn unbind(&mut self);
}

/// A mutex whose guard keeps an [`ExclusiveContext`] bound.
///
/// # Example
///
/// ```
/// use hearth::concurrency::{ContextLock, ExclusiveContext};
///
/// #[derive(Default)]
/// struct Device { current: bool, uploads: usize }
///
/// impl ExclusiveContext for Device {
///     type Error = std::convert::Infallible;
///     fn bind(&mut self) -> Result<(), Self::Error> { self.current = true; Ok(()) }
///     fn unbind(&mut self) { self.current = false; }
/// }
///
/// let device = ContextLock::new(Device::default());
/// device.with(|d| { assert!(d.current); d.uploads += 1; }).unwrap();
/// assert!(!device.into_inner().current);
/// ```
pub struct ContextLock<C> {
    inner: Mutex<C>,
}

impl<C: ExclusiveContext> ContextLock<C> {
    /// Wraps an unbound context.
    pub fn new(context: C) -> Self {
        Self {
            inner: Mutex::new(context),
        }
    }

    fn bind(mut guard: MutexGuard<'_, C>) -> Result<ContextGuard<'_, C>, C::Error> {
        guard.bind()?;
        trace!("context bound");
        Ok(ContextGuard { guard })
    }

    /// Blocks until the context is free, then binds it.
    ///
    /// A panic in a previous holder does not poison the lock: the guard already unbound
    /// the context while unwinding.
    ///
    /// # Errors
    /// Whatever [`ExclusiveContext::bind`] returns; the lock is released again.
    pub fn lock(&self) -> Result<ContextGuard<'_, C>, C::Error> {
        Self::bind(self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Binds the context if no other thread holds it. `None` when busy.
    ///
    /// # Errors
    /// Whatever [`ExclusiveContext::bind`] returns.
    pub fn try_lock(&self) -> Option<Result<ContextGuard<'_, C>, C::Error>> {
        let guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(Self::bind(guard))
    }

    /// Runs `f` with the context bound.
    ///
    /// # Errors
    /// Whatever [`ExclusiveContext::bind`] returns; `f` does not run.
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> Result<R, C::Error> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    /// Consumes the lock, returning the unbound context.
    pub fn into_inner(self) -> C {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: ExclusiveContext + Default> Default for ContextLock<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C> fmt::Debug for ContextLock<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextLock").finish_non_exhaustive()
    }
}

/// Bound access to a context. Unbinds, then unlocks, when dropped.
pub struct ContextGuard<'a, C: ExclusiveContext> {
    guard: MutexGuard<'a, C>,
}

impl<C: ExclusiveContext> Deref for ContextGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.guard
    }
}

impl<C: ExclusiveContext> DerefMut for ContextGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.guard
    }
}

impl<C: ExclusiveContext> Drop for ContextGuard<'_, C> {
    fn drop(&mut self) {
        // Field drop order releases the mutex after this body runs.
        self.guard.unbind();
        trace!("context unbound");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[derive(Default)]
    struct Probe {
        bound: bool,
        binds: usize,
        unbinds: usize,
        refuse: bool,
    }

    impl ExclusiveContext for Probe {
        type Error = &'static str;

        fn bind(&mut self) -> Result<(), Self::Error> {
            if self.refuse {
                return Err("refused");
            }
            assert!(!self.bound, "bound twice");
            self.bound = true;
            self.binds += 1;
            Ok(())
        }

        fn unbind(&mut self) {
            assert!(self.bound, "unbound while not bound");
            self.bound = false;
            self.unbinds += 1;
        }
    }

    #[test]
    fn guard_binds_and_unbinds() {
        let lock = ContextLock::new(Probe::default());
        {
            let guard = lock.lock().unwrap();
            assert!(guard.bound);
        }
        let probe = lock.into_inner();
        assert!(!probe.bound);
        assert_eq!((probe.binds, probe.unbinds), (1, 1));
    }

    #[test]
    fn early_return_unbinds() {
        fn upload(lock: &ContextLock<Probe>, fail: bool) -> Result<(), &'static str> {
            let _guard = lock.lock()?;
            if fail {
                return Err("bad texture");
            }
            Ok(())
        }
        let lock = ContextLock::new(Probe::default());
        assert!(upload(&lock, true).is_err());
        assert!(upload(&lock, false).is_ok());
        let probe = lock.into_inner();
        assert_eq!((probe.binds, probe.unbinds), (2, 2));
    }

    #[test]
    fn panic_while_bound_still_unbinds() {
        let lock = Arc::new(ContextLock::new(Probe::default()));
        let worker = Arc::clone(&lock);
        let joined = thread::spawn(move || {
            let _guard = worker.lock().unwrap();
            panic!("draw call failed");
        })
        .join();
        assert!(joined.is_err());

        let guard = lock.lock().unwrap();
        assert!(guard.bound);
        assert_eq!(guard.unbinds, 1);
    }

    #[test]
    fn bind_failure_releases_the_lock() {
        let lock = ContextLock::new(Probe {
            refuse: true,
            ..Probe::default()
        });
        assert_eq!(lock.with(|_| ()).unwrap_err(), "refused");
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn try_lock_reports_busy() {
        let lock = ContextLock::new(Probe::default());
        let _held = lock.lock().unwrap();
        assert!(lock.try_lock().is_none());
    }

    #[test]
    fn one_binder_at_a_time() {
        struct Exclusive {
            inside: Arc<AtomicBool>,
            overlaps: Arc<AtomicUsize>,
        }
        impl ExclusiveContext for Exclusive {
            type Error = ();
            fn bind(&mut self) -> Result<(), ()> {
                if self.inside.swap(true, Ordering::SeqCst) {
                    self.overlaps.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
            fn unbind(&mut self) {
                self.inside.store(false, Ordering::SeqCst);
            }
        }

        let overlaps = Arc::new(AtomicUsize::new(0));
        let lock = ContextLock::new(Exclusive {
            inside: Arc::new(AtomicBool::new(false)),
            overlaps: Arc::clone(&overlaps),
        });
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..200 {
                        lock.with(|_| thread::yield_now()).unwrap();
                    }
                });
            }
        });
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
