//! Hash-based collections.
//!
//! [`HashMap`] is an open-addressing table that stores values acting as their own keys.
//! Hashing and equality are pluggable through [`Probe`].

pub mod hash_map;
pub mod probe;

pub use hash_map::{HashMap, DEFAULT_MAX_LOAD_FACTOR};
pub use probe::{FnProbe, Probe, StdProbe};
