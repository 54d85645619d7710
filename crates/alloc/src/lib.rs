//! Pluggable raw-memory allocators for manually managed containers
//!
//! Containers request untyped blocks from an allocator, write fixed-size
//! values into them and hand the blocks back exactly once. The same
//! container code runs over every strategy in this crate:
//!
//! - [`HeapAllocator`](allocator::HeapAllocator): the process heap
//! - [`ArenaAllocator`](allocator::ArenaAllocator): bump allocation, whole-buffer reclaim
//! - [`StackAllocator`](allocator::StackAllocator): strict LIFO with per-block headers
//! - [`FixedPoolAllocator`](allocator::FixedPoolAllocator): free list of equal chunks
//! - [`HybridPoolAllocator`](allocator::HybridPoolAllocator) and
//!   [`ForwardPoolAllocator`](allocator::ForwardPoolAllocator): pool with a fallback
//! - [`DebugAllocator`](allocator::DebugAllocator): leak-tracking decorator
//!
//! Allocators are single-threaded: use one instance per thread or add
//! external locking.
//!
//! # Features
//!
//! - `logging` (default): structured logging through `tracing`
//! - `libc`: `malloc`-family heap backend
//! - `diagnostics`: the default allocator tracks leaks and checks them at
//!   process exit
//!
//! # Example
//!
//! ```
//! use nebula_alloc::prelude::*;
//!
//! fn main() -> nebula_alloc::Result<()> {
//!     let pool = FixedPoolAllocator::new(10, 400)?;
//!
//!     let block = pool.allocate_array::<i32>(4, true)?;
//!     unsafe {
//!         for i in 0..4 {
//!             block.as_ptr().add(i).write(i as i32 + 1);
//!         }
//!         pool.free_array(block)?;
//!     }
//!
//!     let err = pool.allocate(600, 1, false).unwrap_err();
//!     assert!(err.is_out_of_memory());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unsafe_code)]

// Core modules
pub mod allocator;
pub mod core;
pub mod error;
pub mod utils;

// Re-export common types for convenience
pub use allocator::{Allocator, AllocatorExt, AllocatorKind, default_allocator};
pub use error::{AllocError, AllocResult, ErrorKind, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commonly used items
pub mod prelude {
    pub use crate::allocator::{
        Allocator, AllocatorExt, AllocatorKind, AllocatorRegistry, AnyAllocator, ArenaAllocator,
        BlockSize, DebugAllocator, FixedPoolAllocator, ForwardPoolAllocator, HeapAllocator,
        HybridPoolAllocator, StackAllocator, default_allocator,
    };
    pub use crate::core::{AllocatorId, MemoryUsage, Resettable};
    pub use crate::error::{AllocError, AllocResult, ErrorKind};
}
