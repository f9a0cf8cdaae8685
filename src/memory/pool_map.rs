/*!
 * Heap Pool Map
 *
 * Granule table over the object-space reservation: one entry per
 * `POOL_ALIGNMENT` bytes recording which pool, space and allocator own it.
 *
 * Writers run under the pool lock. Readers classify addresses without any
 * lock: an entry's fields are written first and then published with a
 * release store on `committed`; a reader acquires `committed` before reading
 * the fields. An address handed out by an allocator is therefore always
 * observed fully initialised, and stays so until the pool is freed.
 */

use super::types::{AllocatorInfo, AllocatorType, SpaceType};
use crate::core::limits::POOL_ALIGNMENT;
use crate::core::types::{is_aligned, Address, Size};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct GranuleEntry {
    committed: AtomicBool,
    space: AtomicU8,
    allocator_type: AtomicU8,
    allocator_addr: AtomicUsize,
    /// Offset of the first byte of the owning pool
    pool_start: AtomicUsize,
}

#[derive(Debug)]
pub struct PoolMap {
    entries: Box<[GranuleEntry]>,
}

impl PoolMap {
    /// Table covering `heap_size` bytes of object space
    pub fn new(heap_size: Size) -> Self {
        let count = heap_size / POOL_ALIGNMENT;
        let entries = (0..count).map(|_| GranuleEntry::default()).collect();
        Self { entries }
    }

    #[inline]
    fn index(offset: usize) -> usize {
        offset / POOL_ALIGNMENT
    }

    fn entry(&self, offset: usize) -> Option<&GranuleEntry> {
        let entry = self.entries.get(Self::index(offset))?;
        entry.committed.load(Ordering::Acquire).then_some(entry)
    }

    /// Publish a pool starting at `offset` (relative to the reservation start)
    ///
    /// Caller holds the pool lock.
    pub fn add_pool_to_map(
        &self,
        offset: usize,
        size: Size,
        space: SpaceType,
        allocator_type: AllocatorType,
        allocator_addr: Address,
    ) {
        debug_assert!(is_aligned(offset, POOL_ALIGNMENT));
        debug_assert!(is_aligned(size, POOL_ALIGNMENT));
        let first = Self::index(offset);
        let last = Self::index(offset + size);
        for entry in &self.entries[first..last] {
            debug_assert!(!entry.committed.load(Ordering::Relaxed));
            entry.space.store(space.index() as u8, Ordering::Relaxed);
            entry
                .allocator_type
                .store(allocator_type.index() as u8, Ordering::Relaxed);
            entry.allocator_addr.store(allocator_addr, Ordering::Relaxed);
            entry.pool_start.store(offset, Ordering::Relaxed);
            entry.committed.store(true, Ordering::Release);
        }
    }

    /// Withdraw a pool; caller holds the pool lock
    pub fn remove_pool_from_map(&self, offset: usize, size: Size) {
        debug_assert!(is_aligned(offset, POOL_ALIGNMENT));
        let first = Self::index(offset);
        let last = Self::index(offset + size);
        for entry in &self.entries[first..last] {
            debug_assert!(entry.committed.load(Ordering::Relaxed));
            entry.committed.store(false, Ordering::Release);
        }
    }

    pub fn get_space_type(&self, offset: usize) -> Option<SpaceType> {
        self.entry(offset)
            .and_then(|e| SpaceType::from_index(e.space.load(Ordering::Relaxed) as usize))
    }

    pub fn get_allocator_info(&self, offset: usize) -> Option<AllocatorInfo> {
        let entry = self.entry(offset)?;
        let allocator_type =
            AllocatorType::from_index(entry.allocator_type.load(Ordering::Relaxed) as usize)?;
        Some(AllocatorInfo::new(
            allocator_type,
            entry.allocator_addr.load(Ordering::Relaxed),
        ))
    }

    /// Offset of the first byte of the pool containing `offset`
    pub fn get_first_byte_of_pool_for_addr(&self, offset: usize) -> Option<usize> {
        self.entry(offset)
            .map(|e| e.pool_start.load(Ordering::Relaxed))
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .iter()
            .all(|e| !e.committed.load(Ordering::Acquire))
    }
}
