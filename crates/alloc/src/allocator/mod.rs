//! Allocation strategies and the contract they share
//!
//! Every strategy implements [`Allocator`]. Containers either hold a concrete
//! allocator, an [`AnyAllocator`], or an [`AllocatorId`](crate::core::AllocatorId)
//! resolved through an [`AllocatorRegistry`].

// Contract and plumbing
mod any;
mod default;
mod kind;
mod registry;
mod traits;

// Allocator implementations
pub mod arena;
pub mod debug;
pub mod heap;
pub mod hybrid;
pub mod pool;
pub mod stack;

// Re-exports for convenience
pub use any::AnyAllocator;
pub use arena::{ArenaAllocator, ArenaConfig};
pub use debug::{DebugAllocator, DebugConfig, LeakAction, SizeOfFn};
pub use default::{DefaultAllocator, default_allocator};
#[cfg(feature = "libc")]
pub use heap::LibcHeap;
pub use heap::{HeapAllocator, HeapBackend, SystemHeap};
pub use hybrid::{ForwardPoolAllocator, HybridPoolAllocator};
pub use kind::AllocatorKind;
pub use pool::{DEFAULT_CHUNK_SIZE, FixedPoolAllocator, PoolConfig};
pub use registry::{AllocatorHandle, AllocatorRegistry, MAX_CACHED_ALLOCATORS};
pub use stack::{StackAllocator, StackConfig, StackMarker, StackScope};
pub use traits::{Allocator, AllocatorExt, BlockSize};
