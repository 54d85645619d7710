//! Main fixed pool allocator implementation
//!
//! # Safety
//!
//! This module implements a pool allocator over an intrusive free list:
//! - Fixed-size chunks organized in a singly-linked free list
//! - Free chunks store the next pointer in their first bytes
//! - Chunk pointers validated on deallocation (bounds + chunk boundary)
//!
//! ## Invariants
//!
//! - All chunks are aligned to 16 bytes and at least one pointer wide
//! - Free list contains only valid, unallocated chunks
//! - `free_chunks() + allocated_chunks() == chunk_count()` while active

use core::ptr::NonNull;

use super::PoolConfig;
use super::chunks::Chunks;
use crate::allocator::{Allocator, AllocatorKind, BlockSize};
use crate::core::{Identity, MemoryUsage, Resettable};
use crate::error::AllocResult;
use crate::utils::byte_size;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

const KIND: AllocatorKind = AllocatorKind::FixedPool;

/// Chunk size used when none is given
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Pool allocator for fixed-size chunks
///
/// Every request up to the chunk size takes one whole chunk. Requests larger
/// than a chunk fail with out-of-memory even when chunks are free.
///
/// # Memory Layout
/// ```text
/// [Chunk0][Chunk1][Chunk2][Chunk3]...[ChunkN]
///    ↓       ↓       ↓       ↓           ↓
/// [free] → [free] → [used] → [free] → [used] → null
/// ```
pub struct FixedPoolAllocator {
    chunks: Chunks,
    config: PoolConfig,
    identity: Identity,
}

impl FixedPoolAllocator {
    /// Creates a pool of `chunk_count` chunks of `chunk_size` bytes
    ///
    /// # Errors
    /// Returns an error if either parameter is zero or the total size
    /// overflows.
    pub fn new(chunk_count: usize, chunk_size: usize) -> AllocResult<Self> {
        Self::with_config(chunk_count, chunk_size, PoolConfig::default())
    }

    /// Creates a pool of `chunk_count` chunks of [`DEFAULT_CHUNK_SIZE`] bytes
    pub fn with_chunk_count(chunk_count: usize) -> AllocResult<Self> {
        Self::new(chunk_count, DEFAULT_CHUNK_SIZE)
    }

    /// Creates a new pool allocator with custom configuration
    pub fn with_config(
        chunk_count: usize,
        chunk_size: usize,
        config: PoolConfig,
    ) -> AllocResult<Self> {
        let chunks = Chunks::new(KIND, chunk_count, chunk_size)?;

        #[cfg(feature = "logging")]
        debug!(
            chunk_count,
            chunk_size = chunks.chunk_size(),
            "fixed pool allocator created"
        );

        Ok(Self {
            chunks,
            config,
            identity: Identity::new(),
        })
    }

    /// Creates a pool with production configuration
    pub fn production(chunk_count: usize, chunk_size: usize) -> AllocResult<Self> {
        Self::with_config(chunk_count, chunk_size, PoolConfig::production())
    }

    /// Creates a pool with debug configuration
    pub fn debug(chunk_count: usize, chunk_size: usize) -> AllocResult<Self> {
        Self::with_config(chunk_count, chunk_size, PoolConfig::debug())
    }

    /// Usable bytes per chunk
    pub fn chunk_size(&self) -> usize {
        self.chunks.chunk_size()
    }

    /// Total number of chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.count()
    }

    /// Chunks currently on the free list
    pub fn free_chunks(&self) -> usize {
        self.chunks.free_count()
    }

    /// Chunks currently handed out
    pub fn allocated_chunks(&self) -> usize {
        if self.is_disposed() {
            0
        } else {
            self.chunk_count() - self.free_chunks()
        }
    }

    /// Checks if a block lies inside the pool's buffer
    pub fn contains(&self, block: NonNull<u8>) -> bool {
        self.chunks.contains(block)
    }

    /// Fails unless `block` is the start of one of this pool's chunks
    pub(crate) fn check_owned(&self, block: NonNull<u8>) -> AllocResult<()> {
        self.chunks.check_owned(block)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

// SAFETY: chunks are disjoint, 16-byte aligned slices of an owned buffer and
// each one is on the free list or handed out, never both.
unsafe impl Allocator for FixedPoolAllocator {
    fn allocate(
        &self,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        self.chunks.check_active()?;
        let bytes = byte_size(count, element_size)?;
        let chunk = self.chunks.allocate(bytes, zero_fill)?;

        #[cfg(feature = "logging")]
        trace!(bytes, free = self.free_chunks(), "fixed pool allocate");

        Ok(chunk)
    }

    unsafe fn reallocate(
        &self,
        block: NonNull<u8>,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        self.chunks.check_owned(block)?;
        let bytes = byte_size(count, element_size)?;
        // SAFETY: forwarded contract; ownership was checked above.
        unsafe { self.chunks.resize(block, bytes, zero_fill) }
    }

    unsafe fn free(&self, block: NonNull<u8>) -> AllocResult<()> {
        // SAFETY: forwarded contract; ownership is checked inside.
        unsafe { self.chunks.free(block, self.config.dealloc_pattern) }
    }

    fn kind(&self) -> AllocatorKind {
        KIND
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn dispose(&self) -> AllocResult<()> {
        #[cfg(feature = "logging")]
        let outstanding = self.allocated_chunks();

        if self.chunks.release() {
            #[cfg(feature = "logging")]
            debug!(outstanding, "fixed pool allocator disposed");
        }
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.chunks.is_released()
    }
}

impl BlockSize for FixedPoolAllocator {
    unsafe fn block_size(&self, block: NonNull<u8>) -> Option<usize> {
        self.contains(block).then_some(self.chunk_size())
    }
}

impl MemoryUsage for FixedPoolAllocator {
    fn used_memory(&self) -> usize {
        self.allocated_chunks() * self.chunk_size()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.free_chunks() * self.chunk_size())
    }
}

impl Resettable for FixedPoolAllocator {
    unsafe fn reset(&self) {
        self.chunks.rebuild();
    }
}

impl core::fmt::Debug for FixedPoolAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FixedPoolAllocator")
            .field("chunk_size", &self.chunk_size())
            .field("chunk_count", &self.chunk_count())
            .field("free_chunks", &self.free_chunks())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::{AllocError, ErrorKind};

    #[test]
    fn test_free_list_reuse() {
        let pool = FixedPoolAllocator::new(4, 64).unwrap();
        let first = pool.allocate(16, 4, false).unwrap();
        unsafe { pool.free(first).unwrap() };
        let again = pool.allocate(16, 4, false).unwrap();
        assert_eq!(first, again, "pool should reuse freed chunks");
    }

    #[test]
    fn test_exhaustion_then_recovery() {
        let pool = FixedPoolAllocator::new(2, 32).unwrap();
        let a = pool.allocate(1, 32, false).unwrap();
        let _b = pool.allocate(1, 32, false).unwrap();
        let err = pool.allocate(1, 8, false).unwrap_err();
        assert_eq!(
            err,
            AllocError::OutOfMemory {
                allocator: AllocatorKind::FixedPool,
                requested: 8,
                available: 0,
            }
        );
        unsafe { pool.free(a).unwrap() };
        assert!(pool.allocate(1, 8, false).is_ok());
    }

    #[test]
    fn test_zero_fill_clears_recycled_chunk() {
        let pool = FixedPoolAllocator::debug(1, 32).unwrap();
        let block = pool.allocate(32, 1, false).unwrap();
        unsafe {
            block.as_ptr().write_bytes(0xAB, 32);
            pool.free(block).unwrap();
        }
        let block = pool.allocate(32, 1, true).unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(block.as_ptr(), 32) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_debug_pattern_poisons_freed_chunk() {
        let pool = FixedPoolAllocator::debug(2, 32).unwrap();
        let block = pool.allocate(32, 1, true).unwrap();
        unsafe { pool.free(block).unwrap() };
        // The first word now holds the free-list link; the rest is poisoned.
        let link = size_of::<usize>();
        let tail = unsafe { core::slice::from_raw_parts(block.as_ptr().add(link), 32 - link) };
        assert!(tail.iter().all(|&b| b == 0xDD));
    }

    #[test]
    fn test_reallocate_within_chunk_keeps_block() {
        let pool = FixedPoolAllocator::new(1, 64).unwrap();
        let block = pool.allocate(2, 8, false).unwrap();
        let same = unsafe { pool.reallocate(block, 8, 8, false) }.unwrap();
        assert_eq!(same, block);
        let err = unsafe { pool.reallocate(block, 9, 8, false) }.unwrap_err();
        assert!(err.is_out_of_memory());
    }

    #[test]
    fn test_growth_within_chunk_zeroes_exposed_bytes() {
        let pool = FixedPoolAllocator::production(2, 64).unwrap();
        let block = pool.allocate(8, 1, false).unwrap();
        unsafe {
            block.as_ptr().write_bytes(0x42, 8);
            block.as_ptr().add(8).write_bytes(0xEE, 56);
            let same = pool.reallocate(block, 64, 1, true).unwrap();
            assert_eq!(same, block);
        }
        let bytes = unsafe { core::slice::from_raw_parts(block.as_ptr(), 64) };
        assert!(bytes[..8].iter().all(|&b| b == 0x42));
        assert!(bytes[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_accounting() {
        let pool = FixedPoolAllocator::new(4, 100).unwrap();
        let _a = pool.allocate(1, 1, false).unwrap();
        assert_eq!(pool.allocated_chunks(), 1);
        assert_eq!(pool.used_memory(), 100);
        assert_eq!(pool.available_memory(), Some(300));
        assert_eq!(pool.memory_usage_percent(), Some(25.0));
    }

    #[test]
    fn test_reset_returns_every_chunk() {
        let pool = FixedPoolAllocator::new(3, 16).unwrap();
        for _ in 0..3 {
            pool.allocate(1, 16, false).unwrap();
        }
        assert_eq!(pool.free_chunks(), 0);
        unsafe { pool.reset() };
        assert_eq!(pool.free_chunks(), 3);
    }

    #[test]
    fn test_dispose() {
        let pool = FixedPoolAllocator::with_chunk_count(2).unwrap();
        assert_eq!(pool.chunk_size(), DEFAULT_CHUNK_SIZE);
        let block = pool.allocate(1, 8, false).unwrap();
        pool.dispose().unwrap();
        pool.dispose().unwrap();
        assert!(pool.is_disposed());
        assert_eq!(pool.allocated_chunks(), 0);
        assert_eq!(
            unsafe { pool.free(block) }.unwrap_err().kind(),
            ErrorKind::Disposed
        );
        assert_eq!(
            pool.allocate(1, 8, false).unwrap_err().kind(),
            ErrorKind::Disposed
        );
    }
}
