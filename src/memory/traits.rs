/*!
 * Memory Pool Traits
 * The seam between pool backends and the allocators built on them
 */

use super::types::{
    AllocatorInfo, AllocatorType, OsPagesAllocPolicy, OsPagesPolicy, Pool, SpaceType,
};
use crate::arena::Arena;
use crate::core::types::{Address, Size};

/// Source of pools for every allocator in the runtime
///
/// Failure to allocate is reported as [`Pool::null`]; contract violations
/// (freeing an unknown pool, corrupting the maps) panic.
pub trait MemPool: Send + Sync {
    /// Allocate `size` bytes for `space`
    ///
    /// `allocator_addr` defaults to the start of the pool when `None`.
    fn alloc_pool_with_policy(
        &self,
        size: Size,
        space: SpaceType,
        allocator_type: AllocatorType,
        allocator_addr: Option<Address>,
        policy: OsPagesAllocPolicy,
    ) -> Pool;

    /// Return a pool previously handed out by this backend
    fn free_pool_with_policy(&self, mem: *mut u8, size: Size, policy: OsPagesPolicy);

    fn get_allocator_info_for_addr(&self, addr: Address) -> Option<AllocatorInfo>;

    fn get_space_type_for_addr(&self, addr: Address) -> Option<SpaceType>;

    fn get_start_addr_pool_for_addr(&self, addr: Address) -> Option<Address>;

    /// Allocate a pool and wrap it as an arena
    fn alloc_arena_with_policy(
        &self,
        size: Size,
        space: SpaceType,
        allocator_type: AllocatorType,
        allocator_addr: Option<Address>,
        policy: OsPagesAllocPolicy,
    ) -> Option<Arena> {
        let pool = self.alloc_pool_with_policy(size, space, allocator_type, allocator_addr, policy);
        (!pool.is_null()).then(|| Arena::new(pool))
    }

    fn free_arena_with_policy(&self, arena: Arena, policy: OsPagesPolicy) {
        let pool = arena.pool();
        self.free_pool_with_policy(pool.mem(), pool.size(), policy);
    }

    #[inline]
    fn alloc_pool(&self, size: Size, space: SpaceType, allocator_type: AllocatorType) -> Pool {
        self.alloc_pool_with_policy(size, space, allocator_type, None, OsPagesAllocPolicy::NoPolicy)
    }

    /// Free with pages returned to the OS right away
    #[inline]
    fn free_pool(&self, mem: *mut u8, size: Size) {
        self.free_pool_with_policy(mem, size, OsPagesPolicy::ImmediateReturn)
    }

    #[inline]
    fn alloc_arena(
        &self,
        size: Size,
        space: SpaceType,
        allocator_type: AllocatorType,
        allocator_addr: Option<Address>,
    ) -> Option<Arena> {
        self.alloc_arena_with_policy(
            size,
            space,
            allocator_type,
            allocator_addr,
            OsPagesAllocPolicy::NoPolicy,
        )
    }

    #[inline]
    fn free_arena(&self, arena: Arena) {
        self.free_arena_with_policy(arena, OsPagesPolicy::ImmediateReturn)
    }
}
