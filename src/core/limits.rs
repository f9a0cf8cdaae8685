/*!
 * System Limits and Constants
 *
 * Centralized location for pool, arena and heap sizing constants.
 */

use super::types::{GB, KB, MB, Size};

// =============================================================================
// POOL GEOMETRY
// =============================================================================

/// Every pool starts on, and spans a multiple of, this boundary (256KB)
/// The heap granule table is indexed at this granularity
pub const POOL_ALIGNMENT: Size = 256 * KB;

/// Fallback OS page size when the system cannot be queried
pub const DEFAULT_PAGE_SIZE: Size = 4 * KB;

/// Largest object space a single reservation may cover
#[cfg(target_pointer_width = "64")]
pub const MAX_HEAP_SIZE: Size = 64 * GB;
#[cfg(not(target_pointer_width = "64"))]
pub const MAX_HEAP_SIZE: Size = GB;

// =============================================================================
// ARENA SIZING
// =============================================================================

/// Default arena size (1MB), one pool per arena
pub const DEFAULT_ARENA_SIZE: Size = MB;

/// Alignment of the first usable byte inside an arena
pub const ARENA_DEFAULT_ALIGNMENT: Size = 8;

// =============================================================================
// DEFAULT SPACE BUDGETS
// =============================================================================

pub const DEFAULT_OBJECT_POOL_SIZE: Size = 256 * MB;
pub const DEFAULT_INTERNAL_SIZE: Size = 64 * MB;
pub const DEFAULT_COMPILER_SIZE: Size = 64 * MB;
pub const DEFAULT_CODE_SIZE: Size = 64 * MB;
pub const DEFAULT_FRAMES_SIZE: Size = 64 * MB;
pub const DEFAULT_STACKS_SIZE: Size = 64 * MB;
