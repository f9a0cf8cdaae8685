/*!
 * Object Space Invariant Tests
 * Random alloc/free sequences keep the accounting and zeroing guarantees
 */

use proptest::prelude::*;
use vm_mempool::core::limits::POOL_ALIGNMENT;
use vm_mempool::core::types::MB;
use vm_mempool::memory::{
    AllocatorType, MemConfig, MemPool, MmapMemPool, OsPagesAllocPolicy, OsPagesPolicy, Pool,
    SpaceType,
};

const OBJECT_SPACE: usize = 16 * MB;

#[derive(Debug, Clone)]
enum Op {
    Alloc { units: usize, zeroed: bool },
    Free { index: usize, return_pages: bool },
    ReleaseFree,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1usize..=16, any::<bool>()).prop_map(|(units, zeroed)| Op::Alloc { units, zeroed }),
        3 => (any::<usize>(), any::<bool>())
            .prop_map(|(index, return_pages)| Op::Free { index, return_pages }),
        1 => Just(Op::ReleaseFree),
    ]
}

fn touch(pool: Pool) {
    // SAFETY: pool is live and writable.
    unsafe {
        pool.mem().write_bytes(0xAB, 64);
        pool.mem().add(pool.size() - 64).write_bytes(0xAB, 64);
    }
}

fn edges_are_zero(pool: Pool) -> bool {
    // SAFETY: pool is live and readable.
    let (head, tail) = unsafe {
        (
            std::slice::from_raw_parts(pool.mem(), 64),
            std::slice::from_raw_parts(pool.mem().add(pool.size() - 64), 64),
        )
    };
    head.iter().chain(tail).all(|&b| b == 0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn object_space_accounting_holds(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mem_pool = MmapMemPool::new(&MemConfig::empty().with_object_pool_size(OBJECT_SPACE))
            .expect("mmap pool");
        let mut live: Vec<Pool> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc { units, zeroed } => {
                    let policy = if zeroed {
                        OsPagesAllocPolicy::ZeroedMemory
                    } else {
                        OsPagesAllocPolicy::NoPolicy
                    };
                    let size = units * POOL_ALIGNMENT;
                    let can_fit = mem_pool.have_enough_pools_in_object_space(1, size);
                    let pool = mem_pool.alloc_pool_with_policy(
                        size,
                        SpaceType::Object,
                        AllocatorType::HumongousAllocator,
                        None,
                        policy,
                    );
                    prop_assert_eq!(can_fit, !pool.is_null());
                    if !pool.is_null() {
                        if zeroed {
                            prop_assert!(edges_are_zero(pool));
                        }
                        for other in &live {
                            prop_assert!(pool.end() <= other.address() || other.end() <= pool.address());
                        }
                        touch(pool);
                        live.push(pool);
                    }
                }
                Op::Free { index, return_pages } if !live.is_empty() => {
                    let pool = live.swap_remove(index % live.len());
                    let policy = if return_pages {
                        OsPagesPolicy::ImmediateReturn
                    } else {
                        OsPagesPolicy::NoReturn
                    };
                    mem_pool.free_pool_with_policy(pool.mem(), pool.size(), policy);
                }
                Op::Free { .. } => {}
                Op::ReleaseFree => mem_pool.release_pages_in_free_pools(),
            }

            let used: usize = live.iter().map(|p| p.size()).sum();
            prop_assert_eq!(mem_pool.get_object_used_bytes(), used);
            prop_assert_eq!(mem_pool.get_object_space_accounted_bytes(), OBJECT_SPACE);
        }

        for pool in live {
            mem_pool.free_pool(pool.mem(), pool.size());
        }
        prop_assert_eq!(mem_pool.get_object_space_free_bytes(), OBJECT_SPACE);
    }
}
