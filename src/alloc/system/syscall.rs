//! Thin wrappers over the platform virtual-memory calls.
//!
//! Regions are reserved inaccessible and committed page range by page range, so an
//! arena only pays for the pages its bump pointer has actually crossed.

use core::ptr;
use crate::alloc::page::{align_up, page_size};

/// Reserves `size` bytes of address space with no access rights.
///
/// # Safety
/// The returned region must be released with [`release_region`] exactly once.
#[cfg(unix)]
pub unsafe fn reserve_region(size: usize) -> Option<*mut u8> {
    if size == 0 {
        return None;
    }
    let size = align_up(size, page_size());
    #[cfg(any(target_os = "linux", target_os = "android"))]
    let flags = libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_NORESERVE;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let flags = libc::MAP_PRIVATE | libc::MAP_ANON;

    let ptr = libc::mmap(ptr::null_mut(), size, libc::PROT_NONE, flags, -1, 0);
    if ptr == libc::MAP_FAILED {
        None
    } else {
        Some(ptr as *mut u8)
    }
}

/// Makes `[ptr, ptr + size)` readable and writable.
///
/// # Safety
/// The range must lie inside a region returned by [`reserve_region`] and `ptr` must be
/// page aligned.
#[cfg(unix)]
pub unsafe fn commit_region(ptr: *mut u8, size: usize) -> bool {
    if size == 0 {
        return true;
    }
    libc::mprotect(ptr as *mut libc::c_void, size, libc::PROT_READ | libc::PROT_WRITE) == 0
}

/// Returns a reservation to the OS.
///
/// # Safety
/// `ptr` and `size` must describe a whole region from [`reserve_region`].
#[cfg(unix)]
pub unsafe fn release_region(ptr: *mut u8, size: usize) {
    if ptr.is_null() || size == 0 {
        return;
    }
    let size = align_up(size, page_size());
    libc::munmap(ptr as *mut libc::c_void, size);
}

/// Reserves `size` bytes of address space with no access rights.
///
/// # Safety
/// The returned region must be released with [`release_region`] exactly once.
#[cfg(windows)]
pub unsafe fn reserve_region(size: usize) -> Option<*mut u8> {
    use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_RESERVE, PAGE_NOACCESS};
    if size == 0 {
        return None;
    }
    let size = align_up(size, page_size());
    let ptr = VirtualAlloc(ptr::null_mut(), size, MEM_RESERVE, PAGE_NOACCESS);
    if ptr.is_null() {
        None
    } else {
        Some(ptr as *mut u8)
    }
}

/// Makes `[ptr, ptr + size)` readable and writable.
///
/// # Safety
/// The range must lie inside a region returned by [`reserve_region`] and `ptr` must be
/// page aligned.
#[cfg(windows)]
pub unsafe fn commit_region(ptr: *mut u8, size: usize) -> bool {
    use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_COMMIT, PAGE_READWRITE};
    if size == 0 {
        return true;
    }
    !VirtualAlloc(ptr as *const core::ffi::c_void, size, MEM_COMMIT, PAGE_READWRITE).is_null()
}

/// Returns a reservation to the OS.
///
/// # Safety
/// `ptr` and `size` must describe a whole region from [`reserve_region`].
#[cfg(windows)]
pub unsafe fn release_region(ptr: *mut u8, _size: usize) {
    use windows_sys::Win32::System::Memory::{VirtualFree, MEM_RELEASE};
    if ptr.is_null() {
        return;
    }
    // MEM_RELEASE frees the whole reservation; size must be 0.
    VirtualFree(ptr as *mut core::ffi::c_void, 0, MEM_RELEASE);
}
