//! Page-size helpers shared by the arena and the syscall layer.

use std::sync::OnceLock;

/// Fallback page size used when the platform query fails (4KB).
pub const PAGE_SIZE: usize = 4096;

/// Rounds `value` up to the next multiple of `align` (a power of two).
pub const fn align_up(value: usize, align: usize) -> usize {
    if align == 0 {
        value
    } else {
        (value + (align - 1)) & !(align - 1)
    }
}

/// Like [`align_up`], but returns `None` instead of wrapping.
#[inline]
pub const fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    if align == 0 {
        return Some(value);
    }
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

static PAGE: OnceLock<usize> = OnceLock::new();

/// Returns the granularity at which the OS commits memory.
///
/// Queried once and cached; falls back to [`PAGE_SIZE`].
pub fn page_size() -> usize {
    *PAGE.get_or_init(|| {
        let queried = query_page_size();
        if queried.is_power_of_two() {
            queried
        } else {
            PAGE_SIZE
        }
    })
}

#[cfg(unix)]
fn query_page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).unwrap_or(PAGE_SIZE)
}

#[cfg(windows)]
fn query_page_size() -> usize {
    use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
    // SAFETY: SYSTEM_INFO is plain data and GetSystemInfo fills it completely.
    let info = unsafe {
        let mut info: SYSTEM_INFO = core::mem::zeroed();
        GetSystemInfo(&mut info);
        info
    };
    info.dwPageSize as usize
}

#[cfg(not(any(unix, windows)))]
fn query_page_size() -> usize {
    PAGE_SIZE
}
