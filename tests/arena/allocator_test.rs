/*!
 * Arena Allocator Tests
 * Bump allocation, rollback, inline buffers and OOM reporting
 */

use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vm_mempool::arena::ArenaAllocator;
use vm_mempool::core::limits::POOL_ALIGNMENT;
use vm_mempool::core::types::{KB, MB};
use vm_mempool::memory::{MemConfig, MemPool, PoolManager, PoolType, SpaceType};

fn mmap_manager(internal: usize) -> Arc<PoolManager> {
    let config = MemConfig::empty()
        .with_object_pool_size(POOL_ALIGNMENT)
        .with_internal_size(internal)
        .with_compiler_size(16 * MB);
    Arc::new(PoolManager::with_backend(PoolType::Mmap, &config))
}

fn malloc_manager() -> Arc<PoolManager> {
    Arc::new(PoolManager::with_backend(PoolType::Malloc, &MemConfig::default()))
}

#[test]
fn test_many_small_values_share_one_arena() {
    let allocator = ArenaAllocator::new(mmap_manager(4 * MB), SpaceType::Compiler);
    let values: Vec<&mut u64> = (0..1000u64)
        .map(|i| allocator.new_value(i).expect("value"))
        .collect();

    assert_eq!(allocator.arena_count(), 1);
    assert_eq!(allocator.get_allocated_size(), 1000 * 8);
    assert!(values.iter().enumerate().all(|(i, v)| **v == i as u64));
    assert!(allocator.in_arena(&*values[500] as *const u64 as usize));
}

#[test]
fn test_alignment_is_honoured() {
    let allocator = ArenaAllocator::new(malloc_manager(), SpaceType::Internal);
    allocator.alloc(1, 1).expect("byte");
    for align in [2usize, 16, 64, 4096] {
        let ptr = allocator.alloc(3, align).expect("aligned");
        assert_eq!(ptr.as_ptr() as usize % align, 0);
    }
}

#[test]
fn test_resize_frees_trailing_arenas() {
    let mut allocator =
        ArenaAllocator::new(mmap_manager(8 * MB), SpaceType::Internal).with_arena_size(POOL_ALIGNMENT);
    allocator.alloc_bytes(100 * KB).expect("first");
    let mark = allocator.get_allocated_size();

    for _ in 0..4 {
        allocator.alloc_bytes(200 * KB).expect("chunk");
    }
    assert_eq!(allocator.arena_count(), 5);

    // The arena whose contents exactly cover the excess stays, emptied
    allocator.resize(mark);
    assert_eq!(allocator.get_allocated_size(), mark);
    assert_eq!(allocator.arena_count(), 2);
    assert_eq!(
        allocator
            .manager()
            .get_mmap_mem_pool()
            .get_non_object_space_used_bytes(SpaceType::Internal),
        2 * POOL_ALIGNMENT
    );

    allocator.resize(KB);
    assert_eq!(allocator.arena_count(), 1);
    assert_eq!(allocator.get_allocated_size(), KB);
}

#[test]
fn test_scope_rolls_back_and_commit_keeps() {
    let mut allocator = ArenaAllocator::new(malloc_manager(), SpaceType::Compiler);
    allocator.new_value(7u32).expect("value");
    let before = allocator.get_allocated_size();

    {
        let scope = allocator.scope();
        assert_eq!(scope.entry_size(), before);
        scope.new_array::<u64>(10_000).expect("array");
        assert!(scope.get_allocated_size() > before);
    }
    assert_eq!(allocator.get_allocated_size(), before);

    {
        let scope = allocator.scope();
        scope.alloc_str("kept").expect("str");
        scope.commit();
    }
    assert_eq!(allocator.get_allocated_size(), before + 4);
}

#[test]
fn test_inline_buffer_serves_first_requests() {
    let mut allocator =
        ArenaAllocator::with_inline_buffer(malloc_manager(), SpaceType::Compiler, 256);
    allocator.alloc_slice_copy(&[1u8; 200]).expect("inline");
    assert_eq!(allocator.arena_count(), 0);

    // Does not fit the rest of the buffer, so the first arena opens
    allocator.alloc_bytes(100).expect("arena");
    assert_eq!(allocator.arena_count(), 1);
    assert_eq!(allocator.get_allocated_size(), 300);

    allocator.resize(50);
    assert_eq!(allocator.arena_count(), 0);
    assert_eq!(allocator.get_allocated_size(), 50);
}

#[test]
fn test_inline_buffer_lives_outside_the_pools() {
    let manager = mmap_manager(MB);
    let allocator = ArenaAllocator::with_inline_buffer(Arc::clone(&manager), SpaceType::Internal, 4 * KB);
    let ptr = allocator.alloc_bytes(100).expect("inline");
    let addr = ptr.as_ptr() as usize;

    assert!(allocator.in_arena(addr));
    let mem_pool = manager.get_mmap_mem_pool();
    assert_eq!(mem_pool.get_non_object_space_used_bytes(SpaceType::Internal), 0);
    assert_eq!(mem_pool.get_space_type_for_addr(addr), None);
}

#[test]
fn test_new_array_and_alloc_array() {
    let allocator = ArenaAllocator::new(malloc_manager(), SpaceType::Internal);
    let zeros = allocator.new_array::<u32>(16).expect("array");
    assert!(zeros.iter().all(|&v| v == 0));
    zeros[3] = 9;

    let slots = allocator.alloc_array::<String>(2).expect("slots");
    slots[0].write(String::from("a"));
    slots[1].write(String::from("b"));
    // SAFETY: both slots were just written.
    let strings = unsafe { [slots[0].assume_init_read(), slots[1].assume_init_read()] };
    assert_eq!(strings.concat(), "ab");
    assert_eq!(zeros[3], 9);
}

#[test]
fn test_visit_arenas_walks_newest_first() {
    let allocator =
        ArenaAllocator::new(malloc_manager(), SpaceType::Internal).with_arena_size(POOL_ALIGNMENT);
    let first = allocator.alloc_bytes(200 * KB).expect("first");
    let second = allocator.alloc_bytes(200 * KB).expect("second");

    let mut starts = Vec::new();
    allocator.visit_arenas(|arena| starts.push(arena.mem()));
    assert_eq!(starts, vec![second.as_ptr() as usize, first.as_ptr() as usize]);
}

static OOM_CALLS: AtomicUsize = AtomicUsize::new(0);

fn count_oom() {
    OOM_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[test]
#[serial]
fn test_oom_handler_runs_on_exhaustion() {
    OOM_CALLS.store(0, Ordering::SeqCst);
    let allocator = ArenaAllocator::new(mmap_manager(POOL_ALIGNMENT), SpaceType::Internal)
        .with_arena_size(POOL_ALIGNMENT)
        .with_oom_handler(count_oom);

    assert!(allocator.alloc_bytes(KB).is_some());
    assert_eq!(OOM_CALLS.load(Ordering::SeqCst), 0);

    assert!(allocator.alloc_bytes(POOL_ALIGNMENT).is_none());
    assert_eq!(OOM_CALLS.load(Ordering::SeqCst), 1);

    // The failed request leaves the chain usable
    assert!(allocator.alloc_bytes(KB).is_some());
    assert_eq!(allocator.arena_count(), 1);
}

#[test]
#[serial]
fn test_unsizable_request_is_reported_as_oom() {
    OOM_CALLS.store(0, Ordering::SeqCst);
    let allocator = ArenaAllocator::new(mmap_manager(MB), SpaceType::Internal).with_oom_handler(count_oom);

    assert!(allocator.alloc(usize::MAX - 4096, 8).is_none());
    assert_eq!(OOM_CALLS.load(Ordering::SeqCst), 1);
    assert!(allocator.alloc_array::<u8>(usize::MAX - 4096).is_none());
    assert_eq!(OOM_CALLS.load(Ordering::SeqCst), 2);
    assert!(allocator.alloc_array::<u64>(usize::MAX / 4).is_none());
    assert_eq!(allocator.arena_count(), 0);

    assert!(allocator.alloc_bytes(KB).is_some());
    assert_eq!(allocator.get_allocated_size(), KB);
}

#[test]
fn test_drop_returns_all_arenas() {
    let manager = mmap_manager(4 * MB);
    {
        let allocator =
            ArenaAllocator::new(Arc::clone(&manager), SpaceType::Internal).with_arena_size(POOL_ALIGNMENT);
        for _ in 0..3 {
            allocator.alloc_bytes(200 * KB).expect("chunk");
        }
        assert_eq!(
            manager.get_mmap_mem_pool().get_non_object_space_used_bytes(SpaceType::Internal),
            3 * POOL_ALIGNMENT
        );
    }
    assert_eq!(
        manager.get_mmap_mem_pool().get_non_object_space_used_bytes(SpaceType::Internal),
        0
    );
}
