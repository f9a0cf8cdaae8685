/*!
 * Core Module
 * Fundamental types, OS primitives and error handling
 */

pub mod errors;
pub mod guard;
pub mod limits;
pub mod os;
pub mod sanitizer;
pub mod types;

// Re-export for convenience
pub use errors::*;
pub use guard::{Guard, GuardDrop, GuardError, GuardMetadata, GuardResult};
pub use types::*;
