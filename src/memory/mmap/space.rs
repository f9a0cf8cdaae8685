/*!
 * Object Space Watermark
 * Bump region over the heap reservation, tracking bytes not yet given back to the OS
 */

use super::free_list::MmapPoolMap;
use crate::core::os;
use crate::core::types::{Address, Size};
use crate::memory::types::{OsPagesAllocPolicy, OsPagesPolicy, Pool};
use log::error;

/// The unallocated tail of the object space
///
/// Everything below `min_address + cur_alloc_offset` belongs to some pool in
/// the pool map. The first `unreturned_to_os_size` bytes above the watermark
/// may still hold stale data.
#[derive(Debug, Default)]
pub struct SpaceMemory {
    min_address: Address,
    max_size: Size,
    cur_alloc_offset: Size,
    unreturned_to_os_size: Size,
}

impl SpaceMemory {
    pub fn new(min_address: Address, max_size: Size) -> Self {
        Self {
            min_address,
            max_size,
            cur_alloc_offset: 0,
            unreturned_to_os_size: 0,
        }
    }

    #[inline]
    pub fn get_min_address(&self) -> Address {
        self.min_address
    }

    #[inline]
    pub fn get_max_size(&self) -> Size {
        self.max_size
    }

    #[inline]
    pub fn get_occupied_memory_size(&self) -> Size {
        self.cur_alloc_offset
    }

    #[inline]
    pub fn get_free_space(&self) -> Size {
        self.max_size - self.cur_alloc_offset
    }

    /// Carve `size` bytes off the watermark and register them as a used pool
    pub fn alloc_raw_mem(
        &mut self,
        size: Size,
        policy: OsPagesAllocPolicy,
        pool_map: &mut MmapPoolMap,
    ) -> Option<Address> {
        if self.get_free_space() < size {
            return None;
        }
        let mem = self.min_address + self.cur_alloc_offset;
        self.cur_alloc_offset += size;

        let memory_to_clear = size.min(self.unreturned_to_os_size);
        self.unreturned_to_os_size -= memory_to_clear;
        if policy == OsPagesAllocPolicy::ZeroedMemory && memory_to_clear != 0 {
            if let Err(e) = os::release_pages(mem, mem + memory_to_clear) {
                error!("Failed to clear reused object space at {:#x}: {}", mem, e);
            }
        }

        pool_map.add_new_pool(Pool::from_address(size, mem));
        Some(mem)
    }

    /// Lower the watermark by `size` bytes
    ///
    /// Once a region above the watermark is dirty, every later return joins it
    /// so the unreturned range stays contiguous from the watermark up.
    pub fn free_mem(&mut self, size: Size, policy: OsPagesPolicy) {
        debug_assert!(size <= self.cur_alloc_offset);
        self.cur_alloc_offset -= size;
        if policy == OsPagesPolicy::NoReturn || self.unreturned_to_os_size != 0 {
            self.unreturned_to_os_size += size;
        }
    }

    /// Hand out the dirty range above the watermark and forget it
    pub fn get_and_clear_unreturned_to_os_memory(&mut self) -> Pool {
        let pool = Pool::from_address(
            self.unreturned_to_os_size,
            self.min_address + self.cur_alloc_offset,
        );
        self.unreturned_to_os_size = 0;
        pool
    }
}
