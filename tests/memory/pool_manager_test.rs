/*!
 * Pool Manager Tests
 * Backend selection, arena routing and lifecycle across both backends
 */

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use vm_mempool::core::limits::POOL_ALIGNMENT;
use vm_mempool::core::types::MB;
use vm_mempool::memory::{AllocatorType, MemConfig, MemPool, PoolManager, PoolType, SpaceType};

fn config() -> MemConfig {
    MemConfig::empty()
        .with_object_pool_size(4 * MB)
        .with_internal_size(4 * MB)
        .with_compiler_size(4 * MB)
}

#[test]
fn test_arena_round_trip_on_both_backends() {
    for pool_type in [PoolType::Mmap, PoolType::Malloc] {
        let manager = PoolManager::with_backend(pool_type, &config());
        assert_eq!(manager.pool_type(), Some(pool_type));

        let arena = manager
            .alloc_arena(MB, SpaceType::Compiler, AllocatorType::ArenaAllocator, None)
            .expect("arena");
        assert_eq!(arena.get_size(), MB);
        assert_eq!(arena.get_occupied_size(), 0);

        let pool = manager.mem_pool();
        assert_eq!(pool.get_space_type_for_addr(arena.mem()), Some(SpaceType::Compiler));
        let info = pool.get_allocator_info_for_addr(arena.mem() + 10).expect("info");
        assert_eq!(info.allocator_type(), AllocatorType::ArenaAllocator);
        drop(pool);

        manager.free_arena(arena);
        manager.finalize();
    }
}

#[test]
fn test_mmap_quota_is_reported_as_none() {
    let manager = PoolManager::with_backend(PoolType::Mmap, &config());
    let first = manager.alloc_arena(4 * MB, SpaceType::Internal, AllocatorType::ArenaAllocator, None);
    assert!(first.is_some());
    let second =
        manager.alloc_arena(POOL_ALIGNMENT, SpaceType::Internal, AllocatorType::ArenaAllocator, None);
    assert!(second.is_none());

    // Other spaces keep their own budget
    let compiler =
        manager.alloc_arena(POOL_ALIGNMENT, SpaceType::Compiler, AllocatorType::ArenaAllocator, None);
    assert!(compiler.is_some());

    if let Some(arena) = first {
        manager.free_arena(arena);
    }
    if let Some(arena) = compiler {
        manager.free_arena(arena);
    }
    assert_eq!(
        manager.get_mmap_mem_pool().get_non_object_space_used_bytes(SpaceType::Internal),
        0
    );
}

#[test]
fn test_reinitialize_after_finalize() {
    let manager = PoolManager::new();
    manager.initialize(PoolType::Mmap, &config());
    manager.finalize();
    manager.initialize(PoolType::Malloc, &config());
    assert_eq!(manager.pool_type(), Some(PoolType::Malloc));
    manager.finalize();
    assert_eq!(manager.pool_type(), None);
}

#[test]
#[should_panic(expected = "mmap pool requested")]
fn test_wrong_backend_accessor_is_fatal() {
    let manager = PoolManager::with_backend(PoolType::Malloc, &config());
    let _pool = manager.get_mmap_mem_pool();
}

#[test]
#[should_panic(expected = "finalized while uninitialized")]
fn test_finalize_twice_is_fatal() {
    let manager = PoolManager::with_backend(PoolType::Malloc, &config());
    manager.finalize();
    manager.finalize();
}

#[test]
fn test_concurrent_arena_traffic() {
    let manager = Arc::new(PoolManager::with_backend(
        PoolType::Mmap,
        &MemConfig::empty()
            .with_object_pool_size(POOL_ALIGNMENT)
            .with_internal_size(64 * MB),
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for _ in 0..32 {
                    let arena = manager
                        .alloc_arena(
                            POOL_ALIGNMENT,
                            SpaceType::Internal,
                            AllocatorType::ArenaAllocator,
                            None,
                        )
                        .expect("arena");
                    manager.free_arena(arena);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }
    assert_eq!(
        manager.get_mmap_mem_pool().get_non_object_space_used_bytes(SpaceType::Internal),
        0
    );
}
