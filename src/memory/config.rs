/*!
 * Memory Configuration
 *
 * Byte budgets per space, fixed before the pool is constructed
 */

use crate::core::errors::{MemError, MemResult};
use crate::core::limits::{
    DEFAULT_CODE_SIZE, DEFAULT_COMPILER_SIZE, DEFAULT_FRAMES_SIZE, DEFAULT_INTERNAL_SIZE,
    DEFAULT_OBJECT_POOL_SIZE, DEFAULT_STACKS_SIZE, MAX_HEAP_SIZE, POOL_ALIGNMENT,
};
use crate::core::types::{is_aligned, Size};
use crate::memory::types::SpaceType;
use log::warn;
use serde::{Deserialize, Serialize};

/// Memory budgets for every space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemConfig {
    /// Size of the single object-space reservation
    pub object_pool_size: Size,
    pub internal_size: Size,
    pub compiler_size: Size,
    pub code_size: Size,
    pub frames_size: Size,
    pub stacks_size: Size,
    /// Heap size a GC would start with; informational for the pool
    pub initial_object_pool_size: Size,
}

impl Default for MemConfig {
    fn default() -> Self {
        Self {
            object_pool_size: DEFAULT_OBJECT_POOL_SIZE,
            internal_size: DEFAULT_INTERNAL_SIZE,
            compiler_size: DEFAULT_COMPILER_SIZE,
            code_size: DEFAULT_CODE_SIZE,
            frames_size: DEFAULT_FRAMES_SIZE,
            stacks_size: DEFAULT_STACKS_SIZE,
            initial_object_pool_size: DEFAULT_OBJECT_POOL_SIZE,
        }
    }
}

impl MemConfig {
    /// All budgets given explicitly, in the order object/internal/compiler/code/frames/stacks
    pub const fn new(
        object_pool_size: Size,
        internal_size: Size,
        compiler_size: Size,
        code_size: Size,
        frames_size: Size,
        stacks_size: Size,
    ) -> Self {
        Self {
            object_pool_size,
            internal_size,
            compiler_size,
            code_size,
            frames_size,
            stacks_size,
            initial_object_pool_size: object_pool_size,
        }
    }

    /// Every budget zero; useful as a base for the `with_*` builders
    pub const fn empty() -> Self {
        Self::new(0, 0, 0, 0, 0, 0)
    }

    pub fn with_object_pool_size(mut self, size: Size) -> Self {
        self.object_pool_size = size;
        if self.initial_object_pool_size > size {
            self.initial_object_pool_size = size;
        }
        self
    }

    pub fn with_internal_size(mut self, size: Size) -> Self {
        self.internal_size = size;
        self
    }

    pub fn with_compiler_size(mut self, size: Size) -> Self {
        self.compiler_size = size;
        self
    }

    pub fn with_code_size(mut self, size: Size) -> Self {
        self.code_size = size;
        self
    }

    pub fn with_frames_size(mut self, size: Size) -> Self {
        self.frames_size = size;
        self
    }

    pub fn with_stacks_size(mut self, size: Size) -> Self {
        self.stacks_size = size;
        self
    }

    pub fn with_initial_object_pool_size(mut self, size: Size) -> Self {
        self.initial_object_pool_size = size;
        self
    }

    /// Read overrides from the environment on top of the defaults
    ///
    /// Environment variables:
    /// - MEMPOOL_OBJECT_POOL_SIZE, MEMPOOL_INTERNAL_SIZE, MEMPOOL_COMPILER_SIZE
    /// - MEMPOOL_CODE_SIZE, MEMPOOL_FRAMES_SIZE, MEMPOOL_STACKS_SIZE
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let read = |name: &str, slot: &mut Size| {
            if let Ok(raw) = std::env::var(name) {
                match raw.trim().parse::<Size>() {
                    Ok(value) => *slot = value,
                    Err(e) => warn!("Ignoring {}={:?}: {}", name, raw, e),
                }
            }
        };
        read("MEMPOOL_OBJECT_POOL_SIZE", &mut config.object_pool_size);
        read("MEMPOOL_INTERNAL_SIZE", &mut config.internal_size);
        read("MEMPOOL_COMPILER_SIZE", &mut config.compiler_size);
        read("MEMPOOL_CODE_SIZE", &mut config.code_size);
        read("MEMPOOL_FRAMES_SIZE", &mut config.frames_size);
        read("MEMPOOL_STACKS_SIZE", &mut config.stacks_size);
        config.initial_object_pool_size = config.initial_object_pool_size.min(config.object_pool_size);
        config
    }

    /// Quota for a non-object space; heap spaces have none
    pub fn space_limit(&self, space: SpaceType) -> Option<Size> {
        match space {
            SpaceType::Object | SpaceType::HumongousObject | SpaceType::NonMovableObject => None,
            SpaceType::Code => Some(self.code_size),
            SpaceType::Compiler => Some(self.compiler_size),
            SpaceType::Internal => Some(self.internal_size),
            SpaceType::Frames => Some(self.frames_size),
            SpaceType::NativeStacks => Some(self.stacks_size),
        }
    }

    pub fn validate(&self) -> MemResult<()> {
        if self.object_pool_size > MAX_HEAP_SIZE {
            return Err(MemError::InvalidConfig(format!(
                "object_pool_size {} exceeds the {} byte ceiling",
                self.object_pool_size, MAX_HEAP_SIZE
            )));
        }
        if !is_aligned(self.object_pool_size, POOL_ALIGNMENT) {
            return Err(MemError::Misaligned {
                value: self.object_pool_size,
                alignment: POOL_ALIGNMENT,
            });
        }
        if self.initial_object_pool_size > self.object_pool_size {
            return Err(MemError::InvalidConfig(format!(
                "initial_object_pool_size {} exceeds object_pool_size {}",
                self.initial_object_pool_size, self.object_pool_size
            )));
        }
        Ok(())
    }
}
