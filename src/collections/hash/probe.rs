//! Hashing and equality strategies for [`HashMap`](super::HashMap).
//!
//! The map stores values that act as their own keys, so it never calls `Hash`/`Eq`
//! directly; it asks a [`Probe`]. [`StdProbe`] forwards to the standard traits, while
//! [`FnProbe`] lets callers key on part of a value (say, the path of an asset record).

use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;

/// Supplies the hash function and equality predicate for a value type.
pub trait Probe<T> {
    /// Hashes `value`. Equal values must hash equally.
    fn hash(&self, value: &T) -> u64;

    /// Returns `true` if `a` and `b` are the same key.
    fn eq(&self, a: &T, b: &T) -> bool;
}

/// Probe using `T: Hash + Eq` and a [`BuildHasher`].
#[derive(Debug, Clone, Default)]
pub struct StdProbe<S = RandomState> {
    build: S,
}

impl<S> StdProbe<S> {
    /// Wraps a hasher builder.
    pub fn with_hasher(build: S) -> Self {
        Self { build }
    }
}

impl<T: Hash + Eq, S: BuildHasher> Probe<T> for StdProbe<S> {
    #[inline]
    fn hash(&self, value: &T) -> u64 {
        self.build.hash_one(value)
    }

    #[inline]
    fn eq(&self, a: &T, b: &T) -> bool {
        a == b
    }
}

/// Probe built from two closures.
#[derive(Clone)]
pub struct FnProbe<H, E> {
    hash: H,
    eq: E,
}

impl<H, E> FnProbe<H, E> {
    /// Combines a hash function and an equality predicate.
    pub fn new(hash: H, eq: E) -> Self {
        Self { hash, eq }
    }
}

impl<T, H, E> Probe<T> for FnProbe<H, E>
where
    H: Fn(&T) -> u64,
    E: Fn(&T, &T) -> bool,
{
    #[inline]
    fn hash(&self, value: &T) -> u64 {
        (self.hash)(value)
    }

    #[inline]
    fn eq(&self, a: &T, b: &T) -> bool {
        (self.eq)(a, b)
    }
}

impl<H, E> core::fmt::Debug for FnProbe<H, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("FnProbe")
    }
}
