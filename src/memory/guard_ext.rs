/*!
 * Pool Guard Extensions
 *
 * Extension trait to create RAII guards for pool allocations
 */

use super::traits::MemPool;
use super::types::{AllocatorType, OsPagesAllocPolicy, OsPagesPolicy, Pool, SpaceType};
use crate::core::guard::{release_on_drop, Guard, GuardDrop, GuardError, GuardMetadata, GuardResult};
use crate::core::types::Size;

/// A pool that goes back to its backend when dropped
pub struct PoolGuard<'a, P: MemPool + ?Sized> {
    pool: Pool,
    owner: &'a P,
    policy: OsPagesPolicy,
    metadata: GuardMetadata,
    active: bool,
}

impl<'a, P: MemPool + ?Sized> PoolGuard<'a, P> {
    fn new(pool: Pool, owner: &'a P) -> Self {
        Self {
            pool,
            owner,
            policy: OsPagesPolicy::ImmediateReturn,
            metadata: GuardMetadata::new("pool").with_size(pool.size()),
            active: true,
        }
    }

    /// Keep the pages resident when the pool is returned
    pub fn keep_pages(mut self) -> Self {
        self.policy = OsPagesPolicy::NoReturn;
        self
    }

    #[inline]
    pub fn pool(&self) -> Pool {
        self.pool
    }

    #[inline]
    pub fn size(&self) -> Size {
        self.pool.size()
    }

    /// Give up ownership without freeing
    pub fn into_inner(mut self) -> Pool {
        self.active = false;
        self.pool
    }
}

impl<P: MemPool + ?Sized> Guard for PoolGuard<'_, P> {
    fn resource_type(&self) -> &'static str {
        "pool"
    }

    fn metadata(&self) -> &GuardMetadata {
        &self.metadata
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn release(&mut self) -> GuardResult<()> {
        if !self.active {
            return Err(GuardError::AlreadyReleased);
        }
        self.owner
            .free_pool_with_policy(self.pool.mem(), self.pool.size(), self.policy);
        self.active = false;
        log::trace!(
            "Pool guard {:#x} released after {}us",
            self.pool.address(),
            self.metadata.lifetime_micros()
        );
        Ok(())
    }
}

impl<P: MemPool + ?Sized> GuardDrop for PoolGuard<'_, P> {
    fn on_drop(&mut self) {
        release_on_drop(self);
    }
}

impl<P: MemPool + ?Sized> Drop for PoolGuard<'_, P> {
    fn drop(&mut self) {
        self.on_drop();
    }
}

/// Extension trait for creating pool guards
pub trait PoolGuardExt: MemPool {
    /// Allocate a pool that is freed when the guard drops
    ///
    /// # Example
    ///
    /// ```rust
    /// use vm_mempool::memory::{MallocMemPool, PoolGuardExt, SpaceType, AllocatorType};
    /// use vm_mempool::core::limits::POOL_ALIGNMENT;
    ///
    /// let backend = MallocMemPool::new();
    /// let guard = backend
    ///     .alloc_pool_guard(POOL_ALIGNMENT, SpaceType::Internal, AllocatorType::Undefined)
    ///     .expect("pool");
    /// assert_eq!(guard.size(), POOL_ALIGNMENT);
    /// // Pool freed on drop
    /// ```
    fn alloc_pool_guard(
        &self,
        size: Size,
        space: SpaceType,
        allocator_type: AllocatorType,
    ) -> Option<PoolGuard<'_, Self>> {
        let pool =
            self.alloc_pool_with_policy(size, space, allocator_type, None, OsPagesAllocPolicy::NoPolicy);
        (!pool.is_null()).then(|| PoolGuard::new(pool, self))
    }
}

impl<P: MemPool + ?Sized> PoolGuardExt for P {}
