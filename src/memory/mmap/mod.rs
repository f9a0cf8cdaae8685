/*!
 * Mmap Pool Backend
 *
 * One aligned reservation backs the heap spaces (object, humongous,
 * non-movable). Pools are carved from its watermark or recycled from a
 * coalescing free list. Every other space maps each pool separately and is
 * bounded by a per-space byte budget.
 *
 * All mutation runs under a single reentrant lock. Heap address
 * classification reads the granule table without taking it.
 */

mod free_list;
mod non_object;
mod space;

pub use free_list::{MmapPool, MmapPoolMap};
pub use non_object::{NonObjectPool, NonObjectPoolTable};
pub use space::SpaceMemory;

use super::config::MemConfig;
use super::pool_map::PoolMap;
use super::traits::MemPool;
use super::types::{
    AllocatorInfo, AllocatorType, OsPagesAllocPolicy, OsPagesPolicy, Pool, SpaceType,
};
use crate::arena::Arena;
use crate::core::errors::{fatal, MemError, MemResult};
use crate::core::limits::POOL_ALIGNMENT;
use crate::core::types::{is_aligned, Address, Size};
use crate::core::{os, sanitizer};
use log::{debug, error, info, warn};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;

struct MmapState {
    common_space: SpaceMemory,
    common_space_pools: MmapPoolMap,
    non_object_current: [Size; SpaceType::COUNT],
    non_object_max: [Size; SpaceType::COUNT],
    non_object_pools: NonObjectPoolTable,
}

/// Mmap-backed pool allocator
pub struct MmapMemPool {
    min_object_addr: Address,
    object_size: Size,
    pool_map: PoolMap,
    state: ReentrantMutex<RefCell<MmapState>>,
}

impl MmapMemPool {
    /// Reserve the object space and set up per-space budgets
    pub fn new(config: &MemConfig) -> MemResult<Self> {
        config.validate()?;
        let object_size = config.object_pool_size;

        let min_object_addr = if object_size > 0 {
            let mem = os::map_rw_anonymous_with_alignment(object_size, POOL_ALIGNMENT)?;
            mem.as_ptr() as Address
        } else {
            0
        };
        if min_object_addr != 0 {
            os::tag_anonymous_memory(min_object_addr, object_size, Some(SpaceType::Object.tag()));
        }

        let mut non_object_max = [0; SpaceType::COUNT];
        for space in SpaceType::ALL {
            if let Some(limit) = config.space_limit(space) {
                non_object_max[space.index()] = limit;
            }
        }

        info!(
            "Mmap pool initialized: object space {:#x}..{:#x} ({} bytes)",
            min_object_addr,
            min_object_addr + object_size,
            object_size
        );

        Ok(Self {
            min_object_addr,
            object_size,
            pool_map: PoolMap::new(object_size),
            state: ReentrantMutex::new(RefCell::new(MmapState {
                common_space: SpaceMemory::new(min_object_addr, object_size),
                common_space_pools: MmapPoolMap::new(),
                non_object_current: [0; SpaceType::COUNT],
                non_object_max,
                non_object_pools: NonObjectPoolTable::new(),
            })),
        })
    }

    #[inline]
    fn in_object_space(&self, addr: Address) -> bool {
        addr >= self.min_object_addr && addr < self.min_object_addr + self.object_size
    }

    /// Allocate a pool, reporting why it failed
    pub fn try_alloc_pool(
        &self,
        size: Size,
        space: SpaceType,
        allocator_type: AllocatorType,
        allocator_addr: Option<Address>,
        policy: OsPagesAllocPolicy,
    ) -> MemResult<Pool> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        self.alloc_pool_unsafe(&mut state, size, space, allocator_type, allocator_addr, policy)
    }

    fn alloc_pool_unsafe(
        &self,
        state: &mut MmapState,
        size: Size,
        space: SpaceType,
        allocator_type: AllocatorType,
        allocator_addr: Option<Address>,
        policy: OsPagesAllocPolicy,
    ) -> MemResult<Pool> {
        if size == 0 {
            return Err(MemError::EmptyRequest(space));
        }
        for alignment in [os::page_size(), POOL_ALIGNMENT] {
            if !is_aligned(size, alignment) {
                return Err(MemError::Misaligned {
                    value: size,
                    alignment,
                });
            }
        }

        let mem = if space.is_heap_space() {
            self.alloc_object_mem(state, size, space, policy)?
        } else {
            Self::alloc_non_object_mem(state, size, space)?
        };

        sanitizer::unpoison_memory_region(mem, size);
        let pool = Pool::from_address(size, mem);
        let info_addr = allocator_addr.unwrap_or(mem);
        if space.is_heap_space() {
            self.pool_map.add_pool_to_map(
                mem - self.min_object_addr,
                size,
                space,
                allocator_type,
                info_addr,
            );
        } else {
            state
                .non_object_pools
                .insert(pool, AllocatorInfo::new(allocator_type, info_addr), space);
        }
        os::tag_anonymous_memory(mem, size, Some(space.tag()));
        debug_assert!(is_aligned(mem, POOL_ALIGNMENT));

        debug!(
            "Allocated pool {:#x} ({} bytes) for {} / {:?}",
            mem, size, space, allocator_type
        );
        Ok(pool)
    }

    fn alloc_object_mem(
        &self,
        state: &mut MmapState,
        size: Size,
        space: SpaceType,
        policy: OsPagesAllocPolicy,
    ) -> MemResult<Address> {
        if let Some(pool) = state.common_space_pools.pop_free_pool(size, policy) {
            return Ok(pool.address());
        }
        state
            .common_space
            .alloc_raw_mem(size, policy, &mut state.common_space_pools)
            .ok_or(MemError::OutOfMemory {
                requested: size,
                space,
            })
    }

    fn alloc_non_object_mem(state: &mut MmapState, size: Size, space: SpaceType) -> MemResult<Address> {
        let index = space.index();
        let current = state.non_object_current[index];
        let limit = state.non_object_max[index];
        if current.checked_add(size).map_or(true, |total| total > limit) {
            return Err(MemError::QuotaExceeded {
                requested: size,
                space,
                current,
                limit,
            });
        }
        let mem = os::map_rw_anonymous_with_alignment(size, POOL_ALIGNMENT)?;
        state.non_object_current[index] = current + size;
        Ok(mem.as_ptr() as Address)
    }

    fn free_pool_unsafe(&self, state: &mut MmapState, mem: Address, size: Size, policy: OsPagesPolicy) {
        sanitizer::poison_memory_region(mem, size);
        let Some(space) = self.space_type_locked(state, mem) else {
            fatal(format_args!("freeing unknown pool {:#x}", mem));
        };
        os::tag_anonymous_memory(mem, size, None);

        if space.is_heap_space() {
            let (free_size, os_policy) = state
                .common_space_pools
                .push_free_pool(Pool::from_address(size, mem), policy);
            state.common_space.free_mem(free_size, os_policy);
        } else {
            state.non_object_current[space.index()] -= size;
            if let Err(e) = os::unmap(mem, size) {
                fatal(format_args!("failed to unmap pool {:#x}: {}", mem, e));
            }
        }

        if space.is_heap_space() {
            self.pool_map
                .remove_pool_from_map(mem - self.min_object_addr, size);
            if policy == OsPagesPolicy::ImmediateReturn {
                if let Err(e) = os::release_pages(mem, mem + size) {
                    error!("Failed to return pages of pool {:#x}: {}", mem, e);
                }
            }
        } else {
            state.non_object_pools.remove(mem);
        }
        debug!("Freed pool {:#x} ({} bytes) from {}", mem, size, space);
    }

    fn space_type_locked(&self, state: &MmapState, addr: Address) -> Option<SpaceType> {
        if self.in_object_space(addr) {
            self.pool_map.get_space_type(addr - self.min_object_addr)
        } else {
            state.non_object_pools.find(addr).map(|entry| entry.space)
        }
    }

    fn with_non_object<R>(&self, addr: Address, f: impl FnOnce(&NonObjectPool) -> R) -> Option<R> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.non_object_pools.find(addr).map(f)
    }

    pub fn get_min_object_address(&self) -> Address {
        self.min_object_addr
    }

    pub fn get_max_object_address(&self) -> Address {
        self.min_object_addr + self.object_size
    }

    pub fn get_total_object_size(&self) -> Size {
        self.object_size
    }

    /// Watermark headroom plus everything on the free list
    pub fn get_object_space_free_bytes(&self) -> Size {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.common_space.get_free_space() + state.common_space_pools.get_all_size()
    }

    /// Bytes of object space currently handed out
    pub fn get_object_used_bytes(&self) -> Size {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.common_space.get_occupied_memory_size() - state.common_space_pools.get_all_size()
    }

    /// Whether `pools_num` pools of `pool_size` bytes could be allocated now
    pub fn have_enough_pools_in_object_space(&self, pools_num: usize, pool_size: Size) -> bool {
        if pool_size == 0 {
            return true;
        }
        let guard = self.state.lock();
        let state = guard.borrow();
        let from_watermark = state.common_space.get_free_space() / pool_size;
        if from_watermark >= pools_num {
            return true;
        }
        state
            .common_space_pools
            .have_enough_free_pools(pools_num - from_watermark, pool_size)
    }

    /// Give the pages of every idle object-space range back to the OS
    pub fn release_pages_in_free_pools(&self) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let mut released = 0;
        state.common_space_pools.iterate_over_free_pools(|size, pool| {
            if !pool.is_returned_to_os() {
                pool.set_returned_to_os(true);
                if let Err(e) = os::release_pages(pool.address(), pool.end()) {
                    error!("Failed to release free pool {:#x}: {}", pool.address(), e);
                }
                released += size;
            }
        });
        let dirty = state.common_space.get_and_clear_unreturned_to_os_memory();
        if dirty.size() > 0 {
            if let Err(e) = os::release_pages(dirty.address(), dirty.end()) {
                error!("Failed to release object space tail {:#x}: {}", dirty.address(), e);
            }
            released += dirty.size();
        }
        debug!("Released {} bytes of idle object space", released);
    }

    /// Free + used object bytes, for consistency checks
    pub fn get_object_space_accounted_bytes(&self) -> Size {
        self.get_object_space_free_bytes() + self.get_object_used_bytes()
    }

    /// Bytes currently mapped for a non-object space
    pub fn get_non_object_space_used_bytes(&self, space: SpaceType) -> Size {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.non_object_current[space.index()]
    }
}

impl MemPool for MmapMemPool {
    fn alloc_pool_with_policy(
        &self,
        size: Size,
        space: SpaceType,
        allocator_type: AllocatorType,
        allocator_addr: Option<Address>,
        policy: OsPagesAllocPolicy,
    ) -> Pool {
        match self.try_alloc_pool(size, space, allocator_type, allocator_addr, policy) {
            Ok(pool) => pool,
            Err(e) => {
                error!("Pool allocation failed: {}", e);
                Pool::null()
            }
        }
    }

    fn free_pool_with_policy(&self, mem: *mut u8, size: Size, policy: OsPagesPolicy) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        self.free_pool_unsafe(&mut state, mem as Address, size, policy);
    }

    fn alloc_arena_with_policy(
        &self,
        size: Size,
        space: SpaceType,
        allocator_type: AllocatorType,
        allocator_addr: Option<Address>,
        policy: OsPagesAllocPolicy,
    ) -> Option<Arena> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        match self.alloc_pool_unsafe(&mut state, size, space, allocator_type, allocator_addr, policy) {
            Ok(pool) => Some(Arena::new(pool)),
            Err(e) => {
                error!("Arena allocation failed: {}", e);
                None
            }
        }
    }

    fn free_arena_with_policy(&self, arena: Arena, policy: OsPagesPolicy) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let pool = arena.pool();
        self.free_pool_unsafe(&mut state, pool.address(), pool.size(), policy);
    }

    fn get_allocator_info_for_addr(&self, addr: Address) -> Option<AllocatorInfo> {
        if self.in_object_space(addr) {
            return self.pool_map.get_allocator_info(addr - self.min_object_addr);
        }
        self.with_non_object(addr, |entry| entry.info)
    }

    fn get_space_type_for_addr(&self, addr: Address) -> Option<SpaceType> {
        if self.in_object_space(addr) {
            return self.pool_map.get_space_type(addr - self.min_object_addr);
        }
        self.with_non_object(addr, |entry| entry.space)
    }

    fn get_start_addr_pool_for_addr(&self, addr: Address) -> Option<Address> {
        if self.in_object_space(addr) {
            return self
                .pool_map
                .get_first_byte_of_pool_for_addr(addr - self.min_object_addr)
                .map(|offset| offset + self.min_object_addr);
        }
        self.with_non_object(addr, |entry| entry.pool.address())
    }
}

impl Drop for MmapMemPool {
    fn drop(&mut self) {
        let state = self.state.get_mut().get_mut();
        for entry in state.non_object_pools.drain() {
            if let Err(e) = os::unmap(entry.pool.address(), entry.pool.size()) {
                if !std::thread::panicking() {
                    fatal(format_args!(
                        "failed to unmap {} pool {:#x}: {}",
                        entry.space,
                        entry.pool.address(),
                        e
                    ));
                }
            }
        }
        let heap_pools_in_use = !self.pool_map.is_empty();
        if heap_pools_in_use {
            warn!("Object space released with pools still in use");
        }
        if self.min_object_addr != 0 {
            if let Err(e) = os::unmap(self.min_object_addr, self.object_size) {
                if !std::thread::panicking() {
                    fatal(format_args!("failed to unmap object space: {}", e));
                }
            }
        }
        info!("Mmap pool finalized");
        debug_assert!(
            !heap_pools_in_use || std::thread::panicking(),
            "object space released with pools still in use"
        );
    }
}
