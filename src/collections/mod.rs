//! Collections built on caller-supplied hashing.
//!
//! - `hash`: the open-addressing [`HashMap`] and its [`Probe`] strategies

pub mod hash;

pub use hash::{FnProbe, HashMap, Probe, StdProbe};
