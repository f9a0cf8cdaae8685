/*!
 * OS Memory Primitives
 *
 * Thin wrappers over mmap/munmap/madvise/mprotect. Every function works on
 * raw address ranges and reports failures as `MemError::Os`; callers decide
 * whether a failure is recoverable.
 */

use super::errors::{MemError, MemResult};
use super::limits::DEFAULT_PAGE_SIZE;
use super::types::{align_down, align_up, is_aligned, Address, Size};
use log::{debug, warn};
#[cfg(any(target_os = "linux", target_os = "android"))]
use nix::sys::mman::{madvise, MmapAdvise};
use nix::sys::mman::{mmap_anonymous, mprotect, munmap, MapFlags, ProtFlags};
use std::ffi::{c_void, CStr};
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::OnceLock;

static PAGE_SIZE: OnceLock<Size> = OnceLock::new();

/// System page size, queried once
pub fn page_size() -> Size {
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size <= 0 {
            warn!("sysconf(_SC_PAGESIZE) failed, assuming {} bytes", DEFAULT_PAGE_SIZE);
            DEFAULT_PAGE_SIZE
        } else {
            size as Size
        }
    })
}

fn as_non_null(addr: Address) -> MemResult<NonNull<c_void>> {
    NonNull::new(addr as *mut c_void).ok_or(MemError::UnknownAddress(addr))
}

fn map_flags() -> MapFlags {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS | MapFlags::MAP_NORESERVE
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS
    }
}

/// Map `size` bytes of anonymous read/write memory whose start is a multiple of `alignment`
///
/// Over-maps by `alignment` bytes and trims the unaligned head and tail.
pub fn map_rw_anonymous_with_alignment(size: Size, alignment: Size) -> MemResult<NonNull<u8>> {
    debug_assert!(alignment.is_power_of_two());
    if size == 0 {
        return Err(MemError::InvalidConfig("cannot map an empty range".into()));
    }
    let alignment = alignment.max(page_size());
    let length = size
        .checked_add(alignment)
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| MemError::InvalidConfig(format!("mapping of {} bytes overflows", size)))?;

    // SAFETY: anonymous mapping at a kernel-chosen address, nothing is aliased.
    let raw = unsafe {
        mmap_anonymous(
            None,
            length,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            map_flags(),
        )
    }
    .map_err(|e| MemError::os("mmap", e))?;

    let raw_start = raw.as_ptr() as Address;
    let raw_end = raw_start + length.get();
    let aligned_start = align_up(raw_start, alignment);
    let aligned_end = aligned_start + size;

    if aligned_start > raw_start {
        unmap(raw_start, aligned_start - raw_start)?;
    }
    if raw_end > aligned_end {
        unmap(aligned_end, raw_end - aligned_end)?;
    }

    debug!(
        "mapped {} bytes at 0x{:x} (alignment {})",
        size, aligned_start, alignment
    );
    NonNull::new(aligned_start as *mut u8).ok_or(MemError::UnknownAddress(aligned_start))
}

/// Unmap a range previously returned by [`map_rw_anonymous_with_alignment`]
pub fn unmap(addr: Address, size: Size) -> MemResult<()> {
    let ptr = as_non_null(addr)?;
    // SAFETY: the range was produced by mmap and the caller gives up every reference into it.
    unsafe { munmap(ptr, size) }.map_err(|e| MemError::os("munmap", e))
}

/// Give the pages in `[start, end)` back to the OS
///
/// The range is shrunk to whole pages. Anonymous private pages read back as
/// zero on the next touch.
pub fn release_pages(start: Address, end: Address) -> MemResult<()> {
    let page = page_size();
    let start = align_up(start, page);
    let end = align_down(end, page);
    if start >= end {
        return Ok(());
    }
    let ptr = as_non_null(start)?;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        // SAFETY: the caller owns the range and holds no references into it.
        unsafe { madvise(ptr, end - start, MmapAdvise::MADV_DONTNEED) }
            .map_err(|e| MemError::os("madvise", e))
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        // MADV_DONTNEED does not zero pages here, clear them by hand.
        // SAFETY: the caller owns the range and holds no references into it.
        unsafe { std::ptr::write_bytes(ptr.as_ptr() as *mut u8, 0, end - start) };
        Ok(())
    }
}

fn protect(addr: Address, size: Size, prot: ProtFlags) -> MemResult<()> {
    debug_assert!(is_aligned(addr, page_size()));
    let ptr = as_non_null(addr)?;
    let size = align_up(size, page_size());
    // SAFETY: the range belongs to a live mapping owned by the caller.
    unsafe { mprotect(ptr, size, prot) }.map_err(|e| MemError::os("mprotect", e))
}

/// Make a range readable and executable, dropping write access
pub fn protect_read_exec(addr: Address, size: Size) -> MemResult<()> {
    protect(addr, size, ProtFlags::PROT_READ | ProtFlags::PROT_EXEC)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const PR_SET_VMA: libc::c_int = 0x5356_4d41;
#[cfg(any(target_os = "linux", target_os = "android"))]
const PR_SET_VMA_ANON_NAME: libc::c_ulong = 0;

/// Name an anonymous mapping so it shows up in /proc/<pid>/maps
///
/// Best effort: kernels without CONFIG_ANON_VMA_NAME reject the call and the
/// range simply stays unnamed. `None` clears the name.
pub fn tag_anonymous_memory(addr: Address, size: Size, tag: Option<&'static CStr>) {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        let name = tag.map_or(std::ptr::null(), CStr::as_ptr);
        // SAFETY: prctl only reads the name pointer, which is 'static or null.
        let _ = unsafe {
            libc::prctl(
                PR_SET_VMA,
                PR_SET_VMA_ANON_NAME,
                addr as libc::c_ulong,
                size as libc::c_ulong,
                name as libc::c_ulong,
            )
        };
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        let _ = (addr, size, tag);
    }
}
