/*!
 * Coalescing Pool Free List
 * Address-ordered pool map with a size-ordered index of the free entries
 */

use crate::core::errors::fatal;
use crate::core::os;
use crate::core::types::{Address, Size};
use crate::memory::types::{OsPagesAllocPolicy, OsPagesPolicy, Pool};
use log::error;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

/// Slot index of a pool record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PoolId(usize);

/// Position of a free pool in the size-ordered index
///
/// Ordered by size, then address, so equal-sized pools hand out the lowest
/// address first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct FreeListHandle {
    size: Size,
    address: Address,
}

/// One contiguous range of the object space, either handed out or free
#[derive(Debug, Clone)]
pub struct MmapPool {
    pool: Pool,
    returned_to_os: bool,
    free_handle: Option<FreeListHandle>,
}

impl MmapPool {
    fn new(pool: Pool, returned_to_os: bool) -> Self {
        Self {
            pool,
            returned_to_os,
            free_handle: None,
        }
    }

    #[inline]
    pub fn is_used(&self) -> bool {
        self.free_handle.is_none()
    }

    #[inline]
    pub fn size(&self) -> Size {
        self.pool.size()
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.pool.address()
    }

    #[inline]
    pub fn end(&self) -> Address {
        self.pool.end()
    }

    /// Whether the pages of this pool have already been handed back to the OS
    #[inline]
    pub fn is_returned_to_os(&self) -> bool {
        self.returned_to_os
    }

    #[inline]
    pub fn set_returned_to_os(&mut self, returned: bool) {
        self.returned_to_os = returned;
    }

    fn set_size(&mut self, size: Size) {
        self.pool = Pool::from_address(size, self.pool.address());
    }
}

/// Pools carved out of the object space, keyed by start address
///
/// The last pool in address order is always in use: a freed tail pool is
/// folded back into the space watermark instead of staying on the list.
#[derive(Debug, Default)]
pub struct MmapPoolMap {
    slots: Vec<Option<MmapPool>>,
    vacant: Vec<usize>,
    pool_map: BTreeMap<Address, PoolId>,
    free_pools: BTreeMap<FreeListHandle, PoolId>,
}

impl MmapPoolMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: PoolId) -> &MmapPool {
        match self.slots.get(id.0).and_then(Option::as_ref) {
            Some(pool) => pool,
            None => fatal(format_args!("stale pool id {}", id.0)),
        }
    }

    fn slot_mut(&mut self, id: PoolId) -> &mut MmapPool {
        match self.slots.get_mut(id.0).and_then(Option::as_mut) {
            Some(pool) => pool,
            None => fatal(format_args!("stale pool id {}", id.0)),
        }
    }

    fn insert_slot(&mut self, pool: MmapPool) -> PoolId {
        match self.vacant.pop() {
            Some(index) => {
                self.slots[index] = Some(pool);
                PoolId(index)
            }
            None => {
                self.slots.push(Some(pool));
                PoolId(self.slots.len() - 1)
            }
        }
    }

    fn remove_slot(&mut self, id: PoolId) {
        self.slots[id.0] = None;
        self.vacant.push(id.0);
    }

    fn mark_free(&mut self, id: PoolId) {
        let pool = self.slot_mut(id);
        let handle = FreeListHandle {
            size: pool.size(),
            address: pool.address(),
        };
        pool.free_handle = Some(handle);
        self.free_pools.insert(handle, id);
    }

    fn unmark_free(&mut self, id: PoolId) {
        if let Some(handle) = self.slot_mut(id).free_handle.take() {
            self.free_pools.remove(&handle);
        }
    }

    /// Take the smallest free pool of at least `size` bytes, splitting off the rest
    ///
    /// The split remainder keeps the returned-to-OS flag of the original pool.
    /// With [`OsPagesAllocPolicy::ZeroedMemory`] the handed-out range is
    /// released first unless its pages already went back to the OS.
    pub fn pop_free_pool(&mut self, size: Size, policy: OsPagesAllocPolicy) -> Option<Pool> {
        let lower = FreeListHandle { size, address: 0 };
        let (&handle, &id) = self.free_pools.range(lower..).next()?;
        self.free_pools.remove(&handle);

        let pool = self.slot_mut(id);
        pool.free_handle = None;
        let mem = pool.address();
        let returned = pool.returned_to_os;

        if handle.size > size {
            pool.set_size(size);
            let rest = Pool::from_address(handle.size - size, mem + size);
            let rest_id = self.insert_slot(MmapPool::new(rest, returned));
            self.pool_map.insert(rest.address(), rest_id);
            self.mark_free(rest_id);
        }

        if policy == OsPagesAllocPolicy::ZeroedMemory && !returned {
            if let Err(e) = os::release_pages(mem, mem + size) {
                error!("Failed to release pages of reused pool at {:#x}: {}", mem, e);
            }
        }
        Some(Pool::from_address(size, mem))
    }

    /// Mark a used pool free, merging it with free neighbours
    ///
    /// Returns the number of bytes to give back to the space watermark and the
    /// page policy to apply to them. A non-zero size means the pool was the
    /// tail of the map and has been dropped from it.
    pub fn push_free_pool(&mut self, pool: Pool, policy: OsPagesPolicy) -> (Size, OsPagesPolicy) {
        let mut returned = policy == OsPagesPolicy::ImmediateReturn;
        let Some(&found) = self.pool_map.get(&pool.address()) else {
            fatal(format_args!(
                "can't find pool {:#x} in the pool map when freeing it",
                pool.address()
            ));
        };
        debug_assert!(self.slot(found).is_used());

        let mut id = found;
        let mut address = pool.address();

        let prev = self
            .pool_map
            .range(..address)
            .next_back()
            .map(|(&prev_address, &prev_id)| (prev_address, prev_id));
        if let Some((prev_address, prev_id)) = prev {
            if !self.slot(prev_id).is_used() {
                debug_assert_eq!(self.slot(prev_id).end(), address);
                returned = returned && self.slot(prev_id).returned_to_os;
                self.unmark_free(prev_id);
                let merged = self.slot(prev_id).size() + self.slot(id).size();
                self.slot_mut(prev_id).set_size(merged);
                self.pool_map.remove(&address);
                self.remove_slot(id);
                id = prev_id;
                address = prev_address;
            }
        }

        let next = self
            .pool_map
            .range((Excluded(address), Unbounded))
            .next()
            .map(|(&next_address, &next_id)| (next_address, next_id));
        match next {
            Some((next_address, next_id)) if !self.slot(next_id).is_used() => {
                returned = returned && self.slot(next_id).returned_to_os;
                self.unmark_free(next_id);
                let merged = self.slot(id).size() + self.slot(next_id).size();
                self.slot_mut(id).set_size(merged);
                self.pool_map.remove(&next_address);
                self.remove_slot(next_id);
            }
            Some(_) => {}
            None => {
                let size = self.slot(id).size();
                self.pool_map.remove(&address);
                self.remove_slot(id);
                let tail_policy = if returned {
                    OsPagesPolicy::ImmediateReturn
                } else {
                    OsPagesPolicy::NoReturn
                };
                return (size, tail_policy);
            }
        }

        self.slot_mut(id).returned_to_os = returned;
        self.mark_free(id);
        (0, policy)
    }

    /// Register a freshly carved pool as in use
    pub fn add_new_pool(&mut self, pool: Pool) {
        let id = self.insert_slot(MmapPool::new(pool, false));
        if self.pool_map.insert(pool.address(), id).is_some() {
            fatal(format_args!("pool {:#x} registered twice", pool.address()));
        }
    }

    /// Total bytes held on the free list
    pub fn get_all_size(&self) -> Size {
        self.free_pools.keys().map(|handle| handle.size).sum()
    }

    /// Visit every free pool with its size
    pub fn iterate_over_free_pools<F>(&mut self, mut visitor: F)
    where
        F: FnMut(Size, &mut MmapPool),
    {
        let ids: Vec<(Size, PoolId)> = self
            .free_pools
            .iter()
            .map(|(handle, &id)| (handle.size, id))
            .collect();
        for (size, id) in ids {
            visitor(size, self.slot_mut(id));
        }
    }

    /// Whether the free list can serve `pools_num` pools of `pool_size` bytes
    ///
    /// Walks from the largest pool down and gives up at the first pool
    /// smaller than `pool_size`.
    pub fn have_enough_free_pools(&self, pools_num: usize, pool_size: Size) -> bool {
        if pools_num == 0 {
            return true;
        }
        let mut pools = 0;
        for handle in self.free_pools.keys().rev() {
            if handle.size < pool_size {
                return false;
            }
            pools += handle.size / pool_size;
            if pools >= pools_num {
                return true;
            }
        }
        false
    }

    /// Number of pools tracked, used or free
    pub fn len(&self) -> usize {
        self.pool_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool_map.is_empty()
    }

    pub fn free_pool_count(&self) -> usize {
        self.free_pools.len()
    }
}
