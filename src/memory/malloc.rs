/*!
 * Malloc Pool Backend
 * Pools from the global allocator, for hosts where reserving address space is unwanted
 */

use super::traits::MemPool;
use super::types::{
    AllocatorInfo, AllocatorType, OsPagesAllocPolicy, OsPagesPolicy, Pool, SpaceType,
};
use crate::core::errors::fatal;
use crate::core::limits::POOL_ALIGNMENT;
use crate::core::types::{Address, Size};
use log::{debug, warn};
use parking_lot::Mutex;
use std::alloc::{alloc, alloc_zeroed, dealloc, Layout};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
struct MallocEntry {
    pool: Pool,
    info: AllocatorInfo,
    space: SpaceType,
}

/// Pool backend over `std::alloc`
///
/// Pools are aligned like mmap pools but there is no reservation and no
/// per-space budget. Lookups go through a registry of live pools.
#[derive(Debug, Default)]
pub struct MallocMemPool {
    pools: Mutex<BTreeMap<Address, MallocEntry>>,
}

impl MallocMemPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn layout(size: Size) -> Option<Layout> {
        Layout::from_size_align(size, POOL_ALIGNMENT).ok()
    }

    fn find(&self, addr: Address) -> Option<MallocEntry> {
        let pools = self.pools.lock();
        pools
            .range(..=addr)
            .next_back()
            .map(|(_, entry)| *entry)
            .filter(|entry| entry.pool.contains(addr))
    }

    pub fn pool_count(&self) -> usize {
        self.pools.lock().len()
    }
}

impl MemPool for MallocMemPool {
    fn alloc_pool_with_policy(
        &self,
        size: Size,
        space: SpaceType,
        allocator_type: AllocatorType,
        allocator_addr: Option<Address>,
        policy: OsPagesAllocPolicy,
    ) -> Pool {
        let Some(layout) = Self::layout(size).filter(|l| l.size() > 0) else {
            warn!("Rejected malloc pool of {} bytes for {}", size, space);
            return Pool::null();
        };
        // SAFETY: layout has a non-zero size.
        let mem = unsafe {
            match policy {
                OsPagesAllocPolicy::ZeroedMemory => alloc_zeroed(layout),
                OsPagesAllocPolicy::NoPolicy => alloc(layout),
            }
        };
        if mem.is_null() {
            warn!("Malloc pool of {} bytes for {} failed", size, space);
            return Pool::null();
        }

        let pool = Pool::new(size, mem);
        let info = AllocatorInfo::new(allocator_type, allocator_addr.unwrap_or(pool.address()));
        self.pools
            .lock()
            .insert(pool.address(), MallocEntry { pool, info, space });
        debug!("Malloc pool {:#x} ({} bytes) for {}", pool.address(), size, space);
        pool
    }

    fn free_pool_with_policy(&self, mem: *mut u8, size: Size, _policy: OsPagesPolicy) {
        let Some(entry) = self.pools.lock().remove(&(mem as Address)) else {
            fatal(format_args!("freeing unknown malloc pool {:p}", mem));
        };
        debug_assert_eq!(entry.pool.size(), size);
        if let Some(layout) = Self::layout(entry.pool.size()) {
            // SAFETY: the pool was allocated above with this exact layout.
            unsafe { dealloc(entry.pool.mem(), layout) };
        }
    }

    fn get_allocator_info_for_addr(&self, addr: Address) -> Option<AllocatorInfo> {
        self.find(addr).map(|entry| entry.info)
    }

    fn get_space_type_for_addr(&self, addr: Address) -> Option<SpaceType> {
        self.find(addr).map(|entry| entry.space)
    }

    fn get_start_addr_pool_for_addr(&self, addr: Address) -> Option<Address> {
        self.find(addr).map(|entry| entry.pool.address())
    }
}

impl Drop for MallocMemPool {
    fn drop(&mut self) {
        let pools = std::mem::take(self.pools.get_mut());
        if !pools.is_empty() {
            warn!("Malloc pool dropped with {} pools still in use", pools.len());
        }
        for entry in pools.into_values() {
            if let Some(layout) = Self::layout(entry.pool.size()) {
                // SAFETY: every registered pool was allocated with this layout.
                unsafe { dealloc(entry.pool.mem(), layout) };
            }
        }
    }
}
