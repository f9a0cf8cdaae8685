/*!
 * Arena Scope Guard
 * Rolls an arena allocator back to its entry size on drop
 */

use super::allocator::ArenaAllocator;
use crate::core::guard::{release_on_drop, Guard, GuardDrop, GuardError, GuardMetadata, GuardResult};
use crate::core::types::Size;
use std::ops::{Deref, DerefMut};

/// Everything allocated through the scope is reclaimed when it ends
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use vm_mempool::arena::ArenaAllocator;
/// use vm_mempool::memory::{MemConfig, PoolManager, PoolType, SpaceType};
///
/// let manager = Arc::new(PoolManager::with_backend(PoolType::Malloc, &MemConfig::default()));
/// let mut allocator = ArenaAllocator::new(manager, SpaceType::Compiler);
/// {
///     let scope = allocator.scope();
///     let nodes = scope.new_array::<u32>(128).expect("arena");
///     nodes[0] = 1;
/// }
/// assert_eq!(allocator.get_allocated_size(), 0);
/// ```
pub struct ArenaScope<'a> {
    allocator: &'a mut ArenaAllocator,
    entry_size: Size,
    metadata: GuardMetadata,
    active: bool,
}

impl<'a> ArenaScope<'a> {
    pub(crate) fn new(allocator: &'a mut ArenaAllocator) -> Self {
        let entry_size = allocator.get_allocated_size();
        Self {
            allocator,
            entry_size,
            metadata: GuardMetadata::new("arena_scope").with_size(entry_size),
            active: true,
        }
    }

    /// Allocated size the allocator returns to
    #[inline]
    pub fn entry_size(&self) -> Size {
        self.entry_size
    }

    /// Keep everything allocated in the scope
    pub fn commit(mut self) {
        self.active = false;
    }
}

impl Deref for ArenaScope<'_> {
    type Target = ArenaAllocator;

    fn deref(&self) -> &ArenaAllocator {
        &*self.allocator
    }
}

impl DerefMut for ArenaScope<'_> {
    fn deref_mut(&mut self) -> &mut ArenaAllocator {
        &mut *self.allocator
    }
}

impl Guard for ArenaScope<'_> {
    fn resource_type(&self) -> &'static str {
        "arena_scope"
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
        self.allocator.resize(self.entry_size);
        self.active = false;
        Ok(())
    }
}

impl GuardDrop for ArenaScope<'_> {
    fn on_drop(&mut self) {
        release_on_drop(self);
    }
}

impl Drop for ArenaScope<'_> {
    fn drop(&mut self) {
        self.on_drop();
    }
}
