/*!
 * Arena Module
 * Pool-backed bump allocation for compiler and runtime scratch data
 */

pub mod allocator;
pub mod collections;
pub mod inline;
pub mod scope;
pub mod types;

pub use allocator::{ArenaAllocator, OomHandler};
pub use collections::{ArenaString, ArenaVec};
pub use inline::FixedBuffer;
pub use scope::ArenaScope;
pub use types::{Arena, ArenaId};
