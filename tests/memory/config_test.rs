/*!
 * Memory Config Tests
 * Environment overrides on top of the defaults
 */

use pretty_assertions::assert_eq;
use serial_test::serial;
use std::env;
use vm_mempool::core::types::MB;
use vm_mempool::memory::MemConfig;

const VARS: [&str; 6] = [
    "MEMPOOL_OBJECT_POOL_SIZE",
    "MEMPOOL_INTERNAL_SIZE",
    "MEMPOOL_COMPILER_SIZE",
    "MEMPOOL_CODE_SIZE",
    "MEMPOOL_FRAMES_SIZE",
    "MEMPOOL_STACKS_SIZE",
];

fn clear_vars() {
    for name in VARS {
        env::remove_var(name);
    }
}

#[test]
#[serial]
fn test_from_env_without_overrides_is_default() {
    clear_vars();
    assert_eq!(MemConfig::from_env(), MemConfig::default());
}

#[test]
#[serial]
fn test_from_env_applies_overrides_and_skips_garbage() {
    clear_vars();
    env::set_var("MEMPOOL_CODE_SIZE", "1048576");
    env::set_var("MEMPOOL_STACKS_SIZE", " 2097152 ");
    env::set_var("MEMPOOL_COMPILER_SIZE", "bogus");
    env::set_var("MEMPOOL_FRAMES_SIZE", "-1");

    let config = MemConfig::from_env();
    clear_vars();

    let defaults = MemConfig::default();
    assert_eq!(config.code_size, MB);
    assert_eq!(config.stacks_size, 2 * MB);
    assert_eq!(config.compiler_size, defaults.compiler_size);
    assert_eq!(config.frames_size, defaults.frames_size);
    assert_eq!(config.internal_size, defaults.internal_size);
    assert_eq!(config.object_pool_size, defaults.object_pool_size);
}

#[test]
#[serial]
fn test_from_env_shrinking_object_space_clamps_initial_size() {
    clear_vars();
    env::set_var("MEMPOOL_OBJECT_POOL_SIZE", "4194304");

    let config = MemConfig::from_env();
    clear_vars();

    assert_eq!(config.object_pool_size, 4 * MB);
    assert_eq!(config.initial_object_pool_size, 4 * MB);
    assert!(config.validate().is_ok());
}
