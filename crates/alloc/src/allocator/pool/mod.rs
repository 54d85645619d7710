//! Fixed-size pool allocator
//!
//! A pool allocator for equal-size chunks with an intrusive free list.
//! Provides O(1) allocation/deallocation for requests up to one chunk.
//!
//! ## Modules
//! - `allocator` - Main `FixedPoolAllocator` implementation
//! - `chunks` - Chunk storage shared with the embedded hybrid pool
//! - `config` - Configuration variants (production, debug)

mod allocator;
pub(crate) mod chunks;
mod config;

pub use allocator::{DEFAULT_CHUNK_SIZE, FixedPoolAllocator};
pub use config::PoolConfig;
