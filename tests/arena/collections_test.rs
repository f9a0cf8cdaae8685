/*!
 * Arena Collection Tests
 */

use pretty_assertions::assert_eq;
use std::sync::Arc;
use vm_mempool::arena::{ArenaAllocator, ArenaString, ArenaVec};
use vm_mempool::core::limits::POOL_ALIGNMENT;
use vm_mempool::memory::{MemConfig, PoolManager, PoolType, SpaceType};

fn allocator() -> ArenaAllocator {
    let manager = Arc::new(PoolManager::with_backend(PoolType::Malloc, &MemConfig::default()));
    ArenaAllocator::new(manager, SpaceType::Compiler)
}

#[test]
fn test_vec_with_capacity_does_not_regrow() {
    let allocator = allocator();
    let mut vec = ArenaVec::with_capacity_in(64, &allocator).expect("vec");
    let used = allocator.get_allocated_size();
    for i in 0..64u16 {
        vec.push(i);
    }
    assert_eq!(allocator.get_allocated_size(), used);
    assert_eq!(vec.capacity(), 64);
    assert_eq!(&vec[..3], &[0, 1, 2]);
}

#[test]
fn test_vec_try_push_hands_value_back_on_exhaustion() {
    let manager = Arc::new(PoolManager::with_backend(
        PoolType::Mmap,
        &MemConfig::empty()
            .with_object_pool_size(POOL_ALIGNMENT)
            .with_internal_size(POOL_ALIGNMENT),
    ));
    let allocator =
        ArenaAllocator::new(manager, SpaceType::Internal).with_arena_size(POOL_ALIGNMENT);
    let mut vec: ArenaVec<'_, [u8; 1024]> = ArenaVec::new_in(&allocator);

    let mut rejected = None;
    for _ in 0..1024 {
        if let Err(value) = vec.try_push([7; 1024]) {
            rejected = Some(value);
            break;
        }
    }
    assert_eq!(rejected.map(|v| v[0]), Some(7));
    assert!(!vec.is_empty());
    assert!(vec.iter().all(|chunk| chunk[1023] == 7));
}

#[test]
fn test_vec_clear_and_reuse() {
    let allocator = allocator();
    let mut vec = ArenaVec::new_in(&allocator);
    vec.extend(["a".to_string(), "b".to_string()]);
    vec.clear();
    assert!(vec.is_empty());
    vec.push("c".to_string());
    assert_eq!(format!("{:?}", vec), r#"["c"]"#);
}

#[test]
fn test_strings_share_one_arena() {
    let allocator = allocator();
    let names: Vec<ArenaString<'_>> = ["alpha", "beta", "gamma"]
        .iter()
        .map(|name| ArenaString::from_str_in(name, &allocator).expect("name"))
        .collect();
    assert_eq!(allocator.arena_count(), 1);
    assert_eq!(names[1], "beta");
    assert_eq!(names.iter().map(|n| n.len()).sum::<usize>(), 14);
    assert_eq!(names[2].to_string(), "gamma");
}
