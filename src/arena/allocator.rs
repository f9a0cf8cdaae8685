/*!
 * Arena Allocator
 *
 * Bump allocation over a chain of pool-backed arenas. Nothing is freed
 * individually: callers roll the allocator back with `resize` (or an
 * `ArenaScope`) and everything goes back to the pool manager on drop.
 * Values placed in the arena are never dropped.
 */

use super::inline::FixedBuffer;
use super::scope::ArenaScope;
use super::types::{Arena, ArenaId};
use crate::core::limits::{ARENA_DEFAULT_ALIGNMENT, DEFAULT_ARENA_SIZE, POOL_ALIGNMENT};
use crate::core::types::{align_up, checked_align_up, Address, Size};
use crate::memory::manager::PoolManager;
use crate::memory::types::{AllocatorType, SpaceType};
use log::{debug, error};
use std::cell::RefCell;
use std::mem::{align_of, size_of, MaybeUninit};
use std::ptr::NonNull;
use std::sync::Arc;

/// Called once per failed pool request, before `None` is returned
pub type OomHandler = fn();

#[derive(Debug, Default)]
struct ArenaChain {
    /// Allocation order; the head is the last element
    arenas: Vec<Arena>,
    inline: Option<FixedBuffer>,
}

impl ArenaChain {
    fn head(&self) -> Option<ArenaId> {
        self.arenas.len().checked_sub(1).map(ArenaId)
    }

    fn allocated_size(&self) -> Size {
        let inline = self.inline.as_ref().map_or(0, FixedBuffer::get_allocated_size);
        inline + self.arenas.iter().map(Arena::get_occupied_size).sum::<Size>()
    }
}

/// Bump allocator for short-lived compiler and runtime data
///
/// Allocation takes `&self`, so many values can be live at once; anything
/// that rolls memory back takes `&mut self`, which the borrow checker only
/// grants once those values are gone.
pub struct ArenaAllocator {
    manager: Arc<PoolManager>,
    space: SpaceType,
    arena_size: Size,
    oom_handler: Option<OomHandler>,
    chain: RefCell<ArenaChain>,
}

impl ArenaAllocator {
    pub fn new(manager: Arc<PoolManager>, space: SpaceType) -> Self {
        Self {
            manager,
            space,
            arena_size: DEFAULT_ARENA_SIZE,
            oom_handler: None,
            chain: RefCell::new(ArenaChain::default()),
        }
    }

    /// Serve the first `size` bytes from a heap buffer before touching pools
    ///
    /// The buffer is allocated here with the global allocator; it does not
    /// count against `space` and is not visible to pool address lookups.
    pub fn with_inline_buffer(manager: Arc<PoolManager>, space: SpaceType, size: Size) -> Self {
        let allocator = Self::new(manager, space);
        allocator.chain.borrow_mut().inline = Some(FixedBuffer::new(size));
        allocator
    }

    pub fn with_oom_handler(mut self, handler: OomHandler) -> Self {
        self.oom_handler = Some(handler);
        self
    }

    /// Minimum size of each arena requested from the pool manager
    pub fn with_arena_size(mut self, size: Size) -> Self {
        self.arena_size = align_up(size.max(POOL_ALIGNMENT), POOL_ALIGNMENT);
        self
    }

    #[inline]
    pub fn space_type(&self) -> SpaceType {
        self.space
    }

    #[inline]
    pub fn manager(&self) -> &Arc<PoolManager> {
        &self.manager
    }

    fn alloc_raw(&self, size: Size, align: Size) -> Option<Address> {
        debug_assert!(align.is_power_of_two());
        let mut chain = self.chain.borrow_mut();

        // Once pools are in play the inline buffer is closed, so the
        // allocation order stays monotonic for `resize`.
        if chain.arenas.is_empty() {
            if let Some(addr) = chain.inline.as_mut().and_then(|b| b.alloc(size, align)) {
                return Some(addr);
            }
        }
        if let Some(addr) = chain.arenas.last_mut().and_then(|a| a.alloc(size, align)) {
            return Some(addr);
        }

        // A request too large to size an arena for is reported like any other OOM
        let arena = size
            .checked_add(align)
            .and_then(|needed| checked_align_up(needed.max(self.arena_size), POOL_ALIGNMENT))
            .and_then(|arena_size| {
                self.manager
                    .alloc_arena(arena_size, self.space, AllocatorType::ArenaAllocator, None)
            });
        let Some(mut arena) = arena else {
            error!(
                "Arena allocator for {} out of memory: {} bytes requested",
                self.space, size
            );
            if let Some(handler) = self.oom_handler {
                handler();
            }
            return None;
        };

        arena.set_next(chain.head());
        let addr = arena.alloc(size, align);
        chain.arenas.push(arena);
        debug!(
            "Arena allocator for {} grew to {} arenas",
            self.space,
            chain.arenas.len()
        );
        addr
    }

    /// `size` bytes aligned to `align`, or `None` when no pool can be had
    pub fn alloc(&self, size: Size, align: Size) -> Option<NonNull<u8>> {
        self.alloc_raw(size, align.max(1))
            .and_then(|addr| NonNull::new(addr as *mut u8))
    }

    /// `size` bytes at the default arena alignment
    #[inline]
    pub fn alloc_bytes(&self, size: Size) -> Option<NonNull<u8>> {
        self.alloc(size, ARENA_DEFAULT_ALIGNMENT)
    }

    /// Move `value` into the arena
    ///
    /// The value is never dropped.
    #[allow(clippy::mut_from_ref)]
    pub fn new_value<T>(&self, value: T) -> Option<&mut T> {
        let ptr = self.alloc(size_of::<T>(), align_of::<T>())?.cast::<T>();
        // SAFETY: ptr is fresh, aligned and sized for T, and lives as long as &self.
        unsafe {
            ptr.as_ptr().write(value);
            Some(&mut *ptr.as_ptr())
        }
    }

    /// Uninitialised room for `len` values of `T`
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_array<T>(&self, len: usize) -> Option<&mut [MaybeUninit<T>]> {
        let bytes = size_of::<T>().checked_mul(len)?;
        let ptr = self.alloc(bytes, align_of::<T>())?.cast::<MaybeUninit<T>>();
        // SAFETY: the range is fresh, aligned and `len` elements long;
        // MaybeUninit needs no initialisation.
        Some(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), len) })
    }

    /// `len` default-constructed values of `T`
    #[allow(clippy::mut_from_ref)]
    pub fn new_array<T: Default>(&self, len: usize) -> Option<&mut [T]> {
        let slots = self.alloc_array::<T>(len)?;
        for slot in slots.iter_mut() {
            slot.write(T::default());
        }
        // SAFETY: every element was just written.
        Some(unsafe { &mut *(slots as *mut [MaybeUninit<T>] as *mut [T]) })
    }

    /// Copy `values` into the arena
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_copy<T: Copy>(&self, values: &[T]) -> Option<&mut [T]> {
        let slots = self.alloc_array::<T>(values.len())?;
        for (slot, value) in slots.iter_mut().zip(values) {
            slot.write(*value);
        }
        // SAFETY: every element was just written.
        Some(unsafe { &mut *(slots as *mut [MaybeUninit<T>] as *mut [T]) })
    }

    #[allow(clippy::mut_from_ref)]
    pub fn alloc_str(&self, value: &str) -> Option<&mut str> {
        let bytes = self.alloc_slice_copy(value.as_bytes())?;
        // SAFETY: copied from a valid str.
        Some(unsafe { std::str::from_utf8_unchecked_mut(bytes) })
    }

    /// Bytes handed out so far, alignment padding included
    pub fn get_allocated_size(&self) -> Size {
        self.chain.borrow().allocated_size()
    }

    pub fn arena_count(&self) -> usize {
        self.chain.borrow().arenas.len()
    }

    /// Roll back to `new_size` allocated bytes
    ///
    /// Arenas that lie wholly past the boundary go back to the pool manager;
    /// the arena holding the boundary keeps its pool with a trimmed cursor.
    pub fn resize(&mut self, new_size: Size) {
        let manager = &self.manager;
        let chain = self.chain.get_mut();
        let cur_size = chain.allocated_size();
        if new_size >= cur_size {
            debug_assert_eq!(new_size, cur_size, "resize can only shrink");
            return;
        }

        let mut bytes_to_delete = cur_size - new_size;
        while bytes_to_delete != 0 {
            let Some(head) = chain.arenas.last_mut() else {
                break;
            };
            let occupied = head.get_occupied_size();
            if occupied < bytes_to_delete {
                if let Some(arena) = chain.arenas.pop() {
                    manager.free_arena(arena);
                }
                bytes_to_delete -= occupied;
            } else {
                head.resize(occupied - bytes_to_delete);
                bytes_to_delete = 0;
            }
        }
        if bytes_to_delete > 0 {
            if let Some(inline) = chain.inline.as_mut() {
                let inline_size = inline.get_allocated_size();
                debug_assert!(inline_size >= bytes_to_delete);
                inline.resize(inline_size.saturating_sub(bytes_to_delete));
                bytes_to_delete = 0;
            }
        }
        debug_assert_eq!(bytes_to_delete, 0);
    }

    /// Roll back automatically when the returned scope drops
    pub fn scope(&mut self) -> ArenaScope<'_> {
        ArenaScope::new(self)
    }

    /// Whether `addr` was handed out by this allocator
    pub fn in_arena(&self, addr: Address) -> bool {
        let chain = self.chain.borrow();
        chain.inline.as_ref().is_some_and(|b| b.contains(addr))
            || chain.arenas.iter().any(|a| a.in_arena(addr))
    }

    /// Walk the chain from the most recent arena back
    pub fn visit_arenas<F: FnMut(&Arena)>(&self, mut visitor: F) {
        let chain = self.chain.borrow();
        let mut cursor = chain.head();
        while let Some(ArenaId(index)) = cursor {
            let arena = &chain.arenas[index];
            visitor(arena);
            cursor = arena.next();
        }
    }
}

impl Drop for ArenaAllocator {
    fn drop(&mut self) {
        let chain = self.chain.get_mut();
        while let Some(arena) = chain.arenas.pop() {
            self.manager.free_arena(arena);
        }
    }
}
