//! Platform layer: direct virtual-memory syscalls (mmap/VirtualAlloc).

pub mod syscall;
