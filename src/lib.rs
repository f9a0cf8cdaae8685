/*!
 * VM Memory Pool Library
 * Pool, arena and code allocation for a managed-language runtime
 */

pub mod arena;
pub mod code;
pub mod core;
pub mod logging;
pub mod memory;

// Re-exports
pub use arena::{ArenaAllocator, ArenaScope, ArenaString, ArenaVec};
pub use code::{CodeAllocator, MapRange};
pub use crate::core::errors::{MemError, MemResult};
pub use logging::init_tracing;
pub use memory::{
    AllocatorInfo, AllocatorType, MallocMemPool, MemConfig, MemPool, MemStats, MmapMemPool,
    OsPagesAllocPolicy, OsPagesPolicy, Pool, PoolManager, PoolType, SpaceType,
};
