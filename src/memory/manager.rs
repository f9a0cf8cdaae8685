/*!
 * Pool Manager
 * Owns the active pool backend and routes arena traffic to it
 */

use super::config::MemConfig;
use super::malloc::MallocMemPool;
use super::mmap::MmapMemPool;
use super::traits::MemPool;
use super::types::{AllocatorType, OsPagesAllocPolicy, OsPagesPolicy, PoolType, SpaceType};
use crate::arena::Arena;
use crate::core::errors::fatal;
use crate::core::types::{Address, Size};
use log::{debug, info};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

/// The concrete backend selected at initialization
pub enum Backend {
    Mmap(MmapMemPool),
    Malloc(MallocMemPool),
}

impl Backend {
    pub fn pool_type(&self) -> PoolType {
        match self {
            Backend::Mmap(_) => PoolType::Mmap,
            Backend::Malloc(_) => PoolType::Malloc,
        }
    }

    fn as_mem_pool(&self) -> &(dyn MemPool + 'static) {
        match self {
            Backend::Mmap(pool) => pool,
            Backend::Malloc(pool) => pool,
        }
    }
}

pub enum PoolManagerState {
    Uninitialized,
    Initialized(Backend),
}

/// Process-wide access point to the pool backend
///
/// Created uninitialized and shared by `Arc`. Initializing twice, or
/// finalizing or using it while uninitialized, is a contract violation.
pub struct PoolManager {
    state: RwLock<PoolManagerState>,
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PoolManagerState::Uninitialized),
        }
    }

    /// A manager already initialized with `pool_type`
    pub fn with_backend(pool_type: PoolType, config: &MemConfig) -> Self {
        let manager = Self::new();
        manager.initialize(pool_type, config);
        manager
    }

    /// Bring up the backend; panics if already initialized or the reservation fails
    pub fn initialize(&self, pool_type: PoolType, config: &MemConfig) {
        let mut state = self.state.write();
        if matches!(*state, PoolManagerState::Initialized(_)) {
            fatal(format_args!("pool manager initialized twice"));
        }
        let backend = match pool_type {
            PoolType::Mmap => match MmapMemPool::new(config) {
                Ok(pool) => Backend::Mmap(pool),
                Err(e) => fatal(format_args!("failed to set up mmap pool: {}", e)),
            },
            PoolType::Malloc => Backend::Malloc(MallocMemPool::new()),
        };
        *state = PoolManagerState::Initialized(backend);
        info!("Pool manager initialized with {:?} backend", pool_type);
    }

    /// Tear the backend down, releasing everything it reserved
    pub fn finalize(&self) {
        let mut state = self.state.write();
        match std::mem::replace(&mut *state, PoolManagerState::Uninitialized) {
            PoolManagerState::Initialized(backend) => {
                drop(backend);
                info!("Pool manager finalized");
            }
            PoolManagerState::Uninitialized => {
                fatal(format_args!("pool manager finalized while uninitialized"))
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.state.read(), PoolManagerState::Initialized(_))
    }

    pub fn pool_type(&self) -> Option<PoolType> {
        match &*self.state.read() {
            PoolManagerState::Initialized(backend) => Some(backend.pool_type()),
            PoolManagerState::Uninitialized => None,
        }
    }

    /// The active backend behind the common interface
    pub fn mem_pool(&self) -> MappedRwLockReadGuard<'_, dyn MemPool> {
        let guard = self.state.read();
        match RwLockReadGuard::try_map(guard, |state| match state {
            PoolManagerState::Initialized(backend) => Some(backend.as_mem_pool()),
            PoolManagerState::Uninitialized => None,
        }) {
            Ok(pool) => pool,
            Err(_) => fatal(format_args!("pool manager used before initialization")),
        }
    }

    /// The mmap backend; panics if another backend is active
    pub fn get_mmap_mem_pool(&self) -> MappedRwLockReadGuard<'_, MmapMemPool> {
        let guard = self.state.read();
        match RwLockReadGuard::try_map(guard, |state| match state {
            PoolManagerState::Initialized(Backend::Mmap(pool)) => Some(pool),
            _ => None,
        }) {
            Ok(pool) => pool,
            Err(_) => fatal(format_args!("mmap pool requested but not active")),
        }
    }

    /// The malloc backend; panics if another backend is active
    pub fn get_malloc_mem_pool(&self) -> MappedRwLockReadGuard<'_, MallocMemPool> {
        let guard = self.state.read();
        match RwLockReadGuard::try_map(guard, |state| match state {
            PoolManagerState::Initialized(Backend::Malloc(pool)) => Some(pool),
            _ => None,
        }) {
            Ok(pool) => pool,
            Err(_) => fatal(format_args!("malloc pool requested but not active")),
        }
    }

    /// Arena of `size` bytes without zero-fill
    pub fn alloc_arena(
        &self,
        size: Size,
        space: SpaceType,
        allocator_type: AllocatorType,
        allocator_addr: Option<Address>,
    ) -> Option<Arena> {
        let arena = self.mem_pool().alloc_arena_with_policy(
            size,
            space,
            allocator_type,
            allocator_addr,
            OsPagesAllocPolicy::NoPolicy,
        );
        if let Some(arena) = &arena {
            debug!("Arena {:#x} ({} bytes) for {}", arena.mem(), arena.get_size(), space);
        }
        arena
    }

    /// Return an arena, releasing its pages immediately
    pub fn free_arena(&self, arena: Arena) {
        self.mem_pool()
            .free_arena_with_policy(arena, OsPagesPolicy::ImmediateReturn);
    }
}
