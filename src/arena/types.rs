/*!
 * Arena
 * A single bump region backed by one pool
 */

use crate::core::limits::ARENA_DEFAULT_ALIGNMENT;
use crate::core::types::{align_up, checked_align_up, Address, Size};
use crate::memory::types::Pool;

/// Index of an arena inside its allocator's chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaId(pub(crate) usize);

/// Bump region over one pool
///
/// The bookkeeping lives out of band, so the whole pool is usable and
/// nothing inside the buffer is ever written by the allocator itself.
#[derive(Debug)]
pub struct Arena {
    pool: Pool,
    buffer_start: Address,
    buffer_end: Address,
    cursor: Address,
    next: Option<ArenaId>,
}

impl Arena {
    /// Arena covering `pool`, starting at the first aligned byte
    pub fn new(pool: Pool) -> Self {
        let buffer_start = align_up(pool.address(), ARENA_DEFAULT_ALIGNMENT);
        let buffer_end = pool.end().max(buffer_start);
        Self {
            pool,
            buffer_start,
            buffer_end,
            cursor: buffer_start,
            next: None,
        }
    }

    /// Bump `size` bytes aligned to `align`; `None` if they don't fit
    pub fn alloc(&mut self, size: Size, align: Size) -> Option<Address> {
        debug_assert!(align.is_power_of_two());
        let start = checked_align_up(self.cursor, align)?;
        let end = start.checked_add(size)?;
        if end > self.buffer_end {
            return None;
        }
        self.cursor = end;
        Some(start)
    }

    /// Move the cursor back so exactly `new_occupied` bytes stay in use
    pub fn resize(&mut self, new_occupied: Size) {
        debug_assert!(new_occupied <= self.get_occupied_size());
        self.cursor = self.buffer_start + new_occupied;
    }

    pub fn reset(&mut self) {
        self.cursor = self.buffer_start;
    }

    #[inline]
    pub fn get_occupied_size(&self) -> Size {
        self.cursor - self.buffer_start
    }

    #[inline]
    pub fn get_free_size(&self) -> Size {
        self.buffer_end - self.cursor
    }

    /// Usable bytes of the buffer
    #[inline]
    pub fn get_size(&self) -> Size {
        self.buffer_end - self.buffer_start
    }

    #[inline]
    pub fn in_arena(&self, addr: Address) -> bool {
        addr >= self.buffer_start && addr < self.cursor
    }

    #[inline]
    pub fn pool(&self) -> Pool {
        self.pool
    }

    #[inline]
    pub fn mem(&self) -> Address {
        self.buffer_start
    }

    /// First free byte
    #[inline]
    pub fn top(&self) -> Address {
        self.cursor
    }

    #[inline]
    pub fn next(&self) -> Option<ArenaId> {
        self.next
    }

    #[inline]
    pub(crate) fn set_next(&mut self, next: Option<ArenaId>) {
        self.next = next;
    }
}
