/*!
 * Sanitizer Hooks
 *
 * Poison freed pool ranges so AddressSanitizer reports reuse. Without the
 * `asan` feature both calls compile to nothing.
 */

use super::types::{Address, Size};

#[cfg(feature = "asan")]
extern "C" {
    fn __asan_poison_memory_region(addr: *const std::ffi::c_void, size: usize);
    fn __asan_unpoison_memory_region(addr: *const std::ffi::c_void, size: usize);
}

#[inline]
pub fn poison_memory_region(addr: Address, size: Size) {
    #[cfg(feature = "asan")]
    // SAFETY: the ASan runtime only records shadow state for the range.
    unsafe {
        __asan_poison_memory_region(addr as *const std::ffi::c_void, size)
    };
    #[cfg(not(feature = "asan"))]
    let _ = (addr, size);
}

#[inline]
pub fn unpoison_memory_region(addr: Address, size: Size) {
    #[cfg(feature = "asan")]
    // SAFETY: the ASan runtime only records shadow state for the range.
    unsafe {
        __asan_unpoison_memory_region(addr as *const std::ffi::c_void, size)
    };
    #[cfg(not(feature = "asan"))]
    let _ = (addr, size);
}
