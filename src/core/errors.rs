/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::memory::types::SpaceType;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Memory operation result
pub type MemResult<T> = Result<T, MemError>;

/// Recoverable memory subsystem errors
///
/// Contract violations (double initialization, corrupted pool maps, failed
/// unmaps) are not represented here: they are fatal and panic after logging.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum MemError {
    #[error("Out of memory: requested {requested} bytes for {space}")]
    #[diagnostic(
        code(mem::out_of_memory),
        help("The object space reservation is exhausted. Free pools or raise object_pool_size.")
    )]
    OutOfMemory { requested: usize, space: SpaceType },

    #[error("Quota exceeded for {space}: requested {requested} bytes, {current} of {limit} bytes in use")]
    #[diagnostic(
        code(mem::quota_exceeded),
        help("Each non-object space has its own byte budget configured in MemConfig.")
    )]
    QuotaExceeded {
        requested: usize,
        space: SpaceType,
        current: usize,
        limit: usize,
    },

    #[error("{op} failed with errno {errno}")]
    #[diagnostic(code(mem::os))]
    Os { op: String, errno: i32 },

    #[error("Invalid memory configuration: {0}")]
    #[diagnostic(code(mem::invalid_config))]
    InvalidConfig(String),

    #[error("Value {value:#x} is not aligned to {alignment} bytes")]
    #[diagnostic(code(mem::misaligned))]
    Misaligned { value: usize, alignment: usize },

    #[error("Zero-sized allocation requested for {0}")]
    #[diagnostic(code(mem::empty_request))]
    EmptyRequest(SpaceType),

    #[error("Address 0x{0:x} does not belong to any pool")]
    #[diagnostic(code(mem::unknown_address))]
    UnknownAddress(usize),
}

impl MemError {
    /// Whether the caller may treat this as a dropped request rather than a bug
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            MemError::OutOfMemory { .. } | MemError::QuotaExceeded { .. } | MemError::Os { .. }
        )
    }

    pub(crate) fn os(op: &str, err: nix::Error) -> Self {
        MemError::Os {
            op: op.to_string(),
            errno: err as i32,
        }
    }
}

/// Report a broken allocator invariant and stop
///
/// These are programming-contract violations, never environment conditions.
#[cold]
#[track_caller]
pub fn fatal(message: std::fmt::Arguments<'_>) -> ! {
    log::error!("{}", message);
    panic!("{}", message);
}
