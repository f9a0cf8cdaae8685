/*!
 * Memory Module
 * Pool backends, address classification and the manager in front of them
 */

pub mod config;
pub mod guard_ext;
pub mod malloc;
pub mod manager;
pub mod mmap;
pub mod pool_map;
pub mod stats;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use config::MemConfig;
pub use guard_ext::{PoolGuard, PoolGuardExt};
pub use malloc::MallocMemPool;
pub use manager::{Backend, PoolManager, PoolManagerState};
pub use mmap::MmapMemPool;
pub use stats::{MemStats, MemStatsSnapshot, SpaceStats};
pub use traits::MemPool;
pub use types::*;
