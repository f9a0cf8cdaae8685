/*!
 * Inline Buffer
 *
 * A fixed, heap-allocated buffer an arena allocator bumps through before it
 * asks for pools. It is not embedded in the allocator: the bytes live in one
 * boxed allocation made up front, outside every pool and space quota.
 */

use crate::core::types::{checked_align_up, Address, Size};
use std::mem::MaybeUninit;
use std::ptr::NonNull;

/// Bump region over an owned heap buffer
///
/// The buffer is a leaked box reclaimed on drop, so pointers handed out stay
/// valid however the owning allocator moves.
#[derive(Debug)]
pub struct FixedBuffer {
    buf: NonNull<[MaybeUninit<u8>]>,
    cursor: Size,
}

// SAFETY: the buffer is uniquely owned; handed-out ranges are governed by
// the borrow on the owning allocator.
unsafe impl Send for FixedBuffer {}

impl FixedBuffer {
    pub fn new(size: Size) -> Self {
        let boxed: Box<[MaybeUninit<u8>]> = vec![MaybeUninit::uninit(); size].into_boxed_slice();
        Self {
            buf: NonNull::from(Box::leak(boxed)),
            cursor: 0,
        }
    }

    #[inline]
    fn start(&self) -> Address {
        self.buf.as_ptr() as *mut u8 as Address
    }

    pub fn alloc(&mut self, size: Size, align: Size) -> Option<Address> {
        let start = self.start();
        let aligned = checked_align_up(start + self.cursor, align)?;
        let end = aligned.checked_add(size)?;
        if end > start + self.buf.len() {
            return None;
        }
        self.cursor = end - start;
        Some(aligned)
    }

    #[inline]
    pub fn get_allocated_size(&self) -> Size {
        self.cursor
    }

    pub fn resize(&mut self, new_size: Size) {
        debug_assert!(new_size <= self.cursor);
        self.cursor = new_size;
    }

    #[inline]
    pub fn capacity(&self) -> Size {
        self.buf.len()
    }

    #[inline]
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start() && addr < self.start() + self.cursor
    }
}

impl Drop for FixedBuffer {
    fn drop(&mut self) {
        // SAFETY: `buf` came from `Box::leak` in `new` and is dropped once.
        drop(unsafe { Box::from_raw(self.buf.as_ptr()) });
    }
}
