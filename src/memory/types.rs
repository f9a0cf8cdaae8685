/*!
 * Memory Types
 * Shared vocabulary crossing the allocator boundary
 */

use crate::core::types::{Address, Size};
use serde::{Deserialize, Serialize};
use std::ffi::CStr;

/// Logical memory category a pool is allocated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpaceType {
    Object,
    HumongousObject,
    NonMovableObject,
    Code,
    Compiler,
    Internal,
    Frames,
    NativeStacks,
}

impl SpaceType {
    pub const COUNT: usize = 8;

    pub const ALL: [SpaceType; Self::COUNT] = [
        SpaceType::Object,
        SpaceType::HumongousObject,
        SpaceType::NonMovableObject,
        SpaceType::Code,
        SpaceType::Compiler,
        SpaceType::Internal,
        SpaceType::Frames,
        SpaceType::NativeStacks,
    ];

    /// Dense index for per-space tables
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Heap spaces share the single object-space reservation
    #[inline]
    pub const fn is_heap_space(self) -> bool {
        matches!(
            self,
            SpaceType::Object | SpaceType::HumongousObject | SpaceType::NonMovableObject
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SpaceType::Object => "vm-Object Space",
            SpaceType::HumongousObject => "vm-Humongous Object Space",
            SpaceType::NonMovableObject => "vm-Non Movable Space",
            SpaceType::Code => "vm-Code Space",
            SpaceType::Compiler => "vm-Compiler Space",
            SpaceType::Internal => "vm-Internal Space",
            SpaceType::Frames => "vm-Frames Space",
            SpaceType::NativeStacks => "vm-Native Stacks Space",
        }
    }

    /// Name used to tag anonymous mappings
    pub const fn tag(self) -> &'static CStr {
        match self {
            SpaceType::Object => c"vm-Object Space",
            SpaceType::HumongousObject => c"vm-Humongous Object Space",
            SpaceType::NonMovableObject => c"vm-Non Movable Space",
            SpaceType::Code => c"vm-Code Space",
            SpaceType::Compiler => c"vm-Compiler Space",
            SpaceType::Internal => c"vm-Internal Space",
            SpaceType::Frames => c"vm-Frames Space",
            SpaceType::NativeStacks => c"vm-Native Stacks Space",
        }
    }
}

impl std::fmt::Display for SpaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of allocator that owns a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocatorType {
    Undefined,
    RunslotsAllocator,
    FreelistAllocator,
    HumongousAllocator,
    ArenaAllocator,
    TlabAllocator,
    BumpAllocator,
    RegionAllocator,
    FrameAllocator,
    NativeStacksAllocator,
}

impl AllocatorType {
    pub const ALL: [AllocatorType; 10] = [
        AllocatorType::Undefined,
        AllocatorType::RunslotsAllocator,
        AllocatorType::FreelistAllocator,
        AllocatorType::HumongousAllocator,
        AllocatorType::ArenaAllocator,
        AllocatorType::TlabAllocator,
        AllocatorType::BumpAllocator,
        AllocatorType::RegionAllocator,
        AllocatorType::FrameAllocator,
        AllocatorType::NativeStacksAllocator,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// What happens to the pages of a freed pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsPagesPolicy {
    /// Keep the pages resident for faster reuse
    NoReturn,
    /// Release the pages to the OS right away
    ImmediateReturn,
}

/// What an allocation requires of the pages it receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsPagesAllocPolicy {
    NoPolicy,
    /// Returned memory must read as zero
    ZeroedMemory,
}

/// Backend selected by the pool manager at start-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PoolType {
    #[default]
    Mmap,
    Malloc,
}

/// A contiguous byte range tracked by the allocator
///
/// Plain value: holding a `Pool` grants no access by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pool {
    size: Size,
    address: *mut u8,
}

// SAFETY: a Pool is an (address, size) pair; all accesses through it are
// unsafe and synchronised by the owning allocator.
unsafe impl Send for Pool {}
// SAFETY: see above.
unsafe impl Sync for Pool {}

impl Pool {
    #[inline]
    pub const fn new(size: Size, address: *mut u8) -> Self {
        Self { size, address }
    }

    #[inline]
    pub fn from_address(size: Size, address: Address) -> Self {
        Self::new(size, address as *mut u8)
    }

    /// The failure sentinel: zero bytes at null
    #[inline]
    pub const fn null() -> Self {
        Self::new(0, std::ptr::null_mut())
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.address.is_null()
    }

    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    #[inline]
    pub fn mem(&self) -> *mut u8 {
        self.address
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.address as Address
    }

    #[inline]
    pub fn end(&self) -> Address {
        self.address() + self.size
    }

    #[inline]
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.address() && addr < self.end()
    }
}

/// Owner of a pool: allocator kind and the address of its header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocatorInfo {
    allocator_type: AllocatorType,
    header_addr: Address,
}

impl AllocatorInfo {
    pub const fn new(allocator_type: AllocatorType, header_addr: Address) -> Self {
        Self {
            allocator_type,
            header_addr,
        }
    }

    #[inline]
    pub fn allocator_type(&self) -> AllocatorType {
        self.allocator_type
    }

    #[inline]
    pub fn header_addr(&self) -> Address {
        self.header_addr
    }
}
