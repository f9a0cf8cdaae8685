/*!
 * Code Allocator
 *
 * Executable memory for compiled code. Bytes are copied into page-aligned
 * arena memory from the code space, then the pages are made read+execute.
 * The union of everything handed out is kept so a program counter can be
 * classified without touching the allocator lock.
 */

use crate::arena::ArenaAllocator;
use crate::core::errors::MemResult;
use crate::core::os;
use crate::core::types::{checked_align_up, Address, Size};
use crate::memory::manager::PoolManager;
use crate::memory::stats::MemStats;
use crate::memory::types::SpaceType;
use log::{debug, error};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A writable, page-aligned range of code memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRange {
    start: Address,
    size: Size,
}

impl MapRange {
    pub fn new(start: Address, size: Size) -> Self {
        Self { start, size }
    }

    #[inline]
    pub fn start(&self) -> Address {
        self.start
    }

    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    #[inline]
    pub fn end(&self) -> Address {
        self.start + self.size
    }

    #[inline]
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start && addr < self.end()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.start as *const u8
    }

    /// The range as bytes, for filling in code before it is protected
    ///
    /// # Safety
    ///
    /// The range must still be writable and not aliased.
    pub unsafe fn as_mut_slice<'a>(&self) -> &'a mut [u8] {
        std::slice::from_raw_parts_mut(self.start as *mut u8, self.size)
    }
}

#[derive(Debug, Clone, Copy)]
struct CodeRange {
    start: Address,
    end: Address,
}

impl CodeRange {
    const EMPTY: CodeRange = CodeRange {
        start: Address::MAX,
        end: 0,
    };
}

/// Allocator of executable code
pub struct CodeAllocator {
    arena_allocator: Mutex<ArenaAllocator>,
    code_range: RwLock<CodeRange>,
    stats: Arc<MemStats>,
    installed: AtomicUsize,
}

impl CodeAllocator {
    pub fn new(manager: Arc<PoolManager>, stats: Arc<MemStats>) -> Self {
        Self {
            arena_allocator: Mutex::new(ArenaAllocator::new(manager, SpaceType::Code)),
            code_range: RwLock::new(CodeRange::EMPTY),
            stats,
            installed: AtomicUsize::new(0),
        }
    }

    fn alloc_pages(&self, size: Size) -> Option<MapRange> {
        let page = os::page_size();
        let rounded = checked_align_up(size.max(1), page)?;
        let arena = self.arena_allocator.lock();
        let mem = arena.alloc(rounded, page)?;
        Some(MapRange::new(mem.as_ptr() as Address, rounded))
    }

    fn record(&self, range: &MapRange, size: Size) {
        self.stats.record_allocate(size, SpaceType::Code);
        self.installed.fetch_add(size, Ordering::Relaxed);
        let mut code_range = self.code_range.write();
        code_range.start = code_range.start.min(range.start());
        code_range.end = code_range.end.max(range.end());
    }

    /// Copy `code` into fresh executable memory
    ///
    /// Returns a pointer to the first instruction, or `None` when the code
    /// space is exhausted or the pages could not be protected.
    #[tracing::instrument(level = "debug", skip(self, code), fields(size = code.len()))]
    pub fn allocate_code(&self, code: &[u8]) -> Option<*const u8> {
        let range = self.alloc_pages(code.len())?;
        // SAFETY: the range is fresh, writable and at least code.len() bytes.
        unsafe { std::ptr::copy_nonoverlapping(code.as_ptr(), range.start() as *mut u8, code.len()) };
        if let Err(e) = Self::protect_code(&range) {
            error!("Failed to protect {} bytes of code: {}", code.len(), e);
            return None;
        }
        self.record(&range, code.len());
        debug!("Installed {} bytes of code at {:#x}", code.len(), range.start());
        Some(range.as_ptr())
    }

    /// Writable code memory the caller fills and then passes to [`Self::protect_code`]
    pub fn allocate_code_unprotected(&self, size: Size) -> Option<MapRange> {
        let range = self.alloc_pages(size)?;
        self.record(&range, size);
        Some(range)
    }

    /// Make `range` read+execute
    pub fn protect_code(range: &MapRange) -> MemResult<()> {
        os::protect_read_exec(range.start(), range.size())
    }

    /// Whether `pc` lies within code handed out by this allocator
    pub fn in_allocated_code_range(&self, pc: Address) -> bool {
        let code_range = self.code_range.read();
        pc >= code_range.start && pc < code_range.end
    }

    pub fn stats(&self) -> &Arc<MemStats> {
        &self.stats
    }
}

impl Drop for CodeAllocator {
    /// Code arenas go back to the code space with the allocator
    fn drop(&mut self) {
        let installed = *self.installed.get_mut();
        self.stats.record_free(installed, SpaceType::Code);
        debug!("Released {} bytes of code", installed);
    }
}
