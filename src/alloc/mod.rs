//! Memory primitives.
//!
//! - [`Arena`]: a virtual-memory bump allocator that reserves address space up front and
//!   commits pages lazily.
//! - [`HandlePool`]: a fixed-capacity pool addressed by generation-checked [`Handle`]s.
//! - [`RawAlloc`]: the storage seam collections are generic over, implemented by
//!   [`Global`] and `&Arena`.
//! - `page` / `system`: page geometry and the platform reserve/commit/release calls.

pub mod allocator;
pub mod arena;
pub mod page;
pub mod pool;
pub mod system;

pub use crate::error::{AllocError, PoolError};
pub use allocator::{Global, RawAlloc};
pub use arena::{Arena, ArenaStats, DEFAULT_BLOCK_SIZE, MIN_ALIGN};
pub use pool::{Handle, HandlePool};
