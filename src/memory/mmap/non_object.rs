/*!
 * Non-Object Pool Table
 * Address-keyed registry of pools mapped outside the object space
 */

use crate::core::types::Address;
use crate::memory::types::{AllocatorInfo, Pool, SpaceType};
use std::collections::BTreeMap;

/// A pool that owns its own mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonObjectPool {
    pub pool: Pool,
    pub info: AllocatorInfo,
    pub space: SpaceType,
}

#[derive(Debug, Default)]
pub struct NonObjectPoolTable {
    pools: BTreeMap<Address, NonObjectPool>,
}

impl NonObjectPoolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pool: Pool, info: AllocatorInfo, space: SpaceType) {
        self.pools
            .insert(pool.address(), NonObjectPool { pool, info, space });
    }

    pub fn remove(&mut self, addr: Address) -> Option<NonObjectPool> {
        self.pools.remove(&addr)
    }

    /// Entry whose range contains `addr`
    pub fn find(&self, addr: Address) -> Option<&NonObjectPool> {
        self.pools
            .range(..=addr)
            .next_back()
            .map(|(_, entry)| entry)
            .filter(|entry| entry.pool.contains(addr))
    }

    pub fn drain(&mut self) -> impl Iterator<Item = NonObjectPool> + '_ {
        std::mem::take(&mut self.pools).into_values()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}
