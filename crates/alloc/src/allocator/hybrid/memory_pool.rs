//! Hybrid pool with embedded chunk storage

use core::fmt;
use core::ptr::NonNull;

use super::PoolSide;
use crate::allocator::pool::chunks::Chunks;
use crate::allocator::{Allocator, AllocatorKind, BlockSize, PoolConfig};
use crate::core::Identity;
use crate::error::AllocResult;

#[cfg(feature = "logging")]
use tracing::debug;

const KIND: AllocatorKind = AllocatorKind::HybridPool;

/// Chunk size of [`HybridPoolAllocator::with_fallback`]
pub const DEFAULT_HYBRID_CHUNK_SIZE: usize = 1024;

/// Chunk count of [`HybridPoolAllocator::with_fallback`]
pub const DEFAULT_HYBRID_CHUNK_COUNT: usize = 10;

/// Embedded pool plus its debug fill pattern
struct EmbeddedPool {
    chunks: Chunks,
    config: PoolConfig,
}

impl PoolSide for EmbeddedPool {
    fn chunk_size(&self) -> usize {
        self.chunks.chunk_size()
    }

    fn owns(&self, block: NonNull<u8>) -> bool {
        self.chunks.contains(block)
    }

    fn take_chunk(&self, bytes: usize, zero_fill: bool) -> AllocResult<NonNull<u8>> {
        self.chunks.allocate(bytes, zero_fill)
    }

    fn check_chunk(&self, block: NonNull<u8>) -> AllocResult<()> {
        self.chunks.check_owned(block)
    }

    unsafe fn keep_chunk(
        &self,
        block: NonNull<u8>,
        bytes: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        // SAFETY: forwarded contract.
        unsafe { self.chunks.resize(block, bytes, zero_fill) }
    }

    unsafe fn give_back(&self, block: NonNull<u8>) -> AllocResult<()> {
        // SAFETY: forwarded contract.
        unsafe { self.chunks.free(block, self.config.dealloc_pattern) }
    }

    fn release(&self) -> bool {
        self.chunks.release()
    }

    fn is_released(&self) -> bool {
        self.chunks.is_released()
    }
}

/// Pool of equal-size chunks that hands larger requests to a fallback
///
/// The threshold is the chunk size. Pass the fallback by value to let
/// [`dispose`](Allocator::dispose) cascade to it, or by reference / `Rc` to
/// keep it alive past this allocator.
///
/// # Examples
///
/// ```
/// use nebula_alloc::allocator::{Allocator, HeapAllocator, HybridPoolAllocator};
///
/// let hybrid = HybridPoolAllocator::new(4, 64, HeapAllocator::new()).unwrap();
/// let small = hybrid.allocate(16, 4, true).unwrap();
/// let large = hybrid.allocate(65, 1, true).unwrap();
/// assert!(hybrid.pool_owns(small));
/// assert!(!hybrid.pool_owns(large));
/// unsafe {
///     hybrid.free(large).unwrap();
///     hybrid.free(small).unwrap();
/// }
/// ```
pub struct HybridPoolAllocator<F> {
    pool: EmbeddedPool,
    fallback: F,
    identity: Identity,
}

impl<F: Allocator> HybridPoolAllocator<F> {
    /// Creates a pool of `chunk_count` chunks of `chunk_size` bytes
    pub fn new(chunk_count: usize, chunk_size: usize, fallback: F) -> AllocResult<Self> {
        Self::with_config(chunk_count, chunk_size, fallback, PoolConfig::default())
    }

    /// Creates a pool with the default geometry in front of `fallback`
    pub fn with_fallback(fallback: F) -> AllocResult<Self> {
        Self::new(DEFAULT_HYBRID_CHUNK_COUNT, DEFAULT_HYBRID_CHUNK_SIZE, fallback)
    }

    /// Creates a hybrid pool with custom configuration
    pub fn with_config(
        chunk_count: usize,
        chunk_size: usize,
        fallback: F,
        config: PoolConfig,
    ) -> AllocResult<Self> {
        let chunks = Chunks::new(KIND, chunk_count, chunk_size)?;

        #[cfg(feature = "logging")]
        debug!(
            chunk_count,
            threshold = chunks.chunk_size(),
            fallback = %fallback.kind(),
            "hybrid pool allocator created"
        );

        Ok(Self {
            pool: EmbeddedPool { chunks, config },
            fallback,
            identity: Identity::new(),
        })
    }

    /// Largest request served by the pool
    pub fn threshold(&self) -> usize {
        self.pool.chunk_size()
    }

    /// Whether `block` lies inside the embedded pool
    pub fn pool_owns(&self, block: NonNull<u8>) -> bool {
        self.pool.owns(block)
    }

    /// Chunks currently free in the pool
    pub fn free_chunks(&self) -> usize {
        self.pool.chunks.free_count()
    }

    pub fn chunk_count(&self) -> usize {
        self.pool.chunks.count()
    }

    /// Allocator serving requests above the threshold
    pub fn fallback(&self) -> &F {
        &self.fallback
    }
}

// SAFETY: pool chunks are disjoint and 16-byte aligned; every other block is
// produced by the fallback, which upholds the same contract.
unsafe impl<F: Allocator> Allocator for HybridPoolAllocator<F> {
    fn allocate(
        &self,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        super::allocate(KIND, &self.pool, &self.fallback, count, element_size, zero_fill)
    }

    unsafe fn reallocate(
        &self,
        block: NonNull<u8>,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        // SAFETY: forwarded contract.
        unsafe {
            super::reallocate(
                KIND,
                &self.pool,
                &self.fallback,
                block,
                count,
                element_size,
                zero_fill,
            )
        }
    }

    unsafe fn free(&self, block: NonNull<u8>) -> AllocResult<()> {
        // SAFETY: forwarded contract.
        unsafe { super::free(KIND, &self.pool, &self.fallback, block) }
    }

    fn kind(&self) -> AllocatorKind {
        KIND
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn dispose(&self) -> AllocResult<()> {
        super::dispose(KIND, &self.pool, &self.fallback)
    }

    fn is_disposed(&self) -> bool {
        self.pool.is_released()
    }
}

impl<F: Allocator + BlockSize> BlockSize for HybridPoolAllocator<F> {
    unsafe fn block_size(&self, block: NonNull<u8>) -> Option<usize> {
        // SAFETY: forwarded contract.
        unsafe { super::block_size(&self.pool, &self.fallback, block) }
    }
}

impl<F: fmt::Debug> fmt::Debug for HybridPoolAllocator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridPoolAllocator")
            .field("pool", &self.pool.chunks)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::allocator::{ArenaAllocator, HeapAllocator};
    use crate::error::ErrorKind;

    #[test]
    fn test_threshold_routing() {
        let hybrid = HybridPoolAllocator::new(2, 32, HeapAllocator::new()).unwrap();
        assert_eq!(hybrid.threshold(), 32);

        let at = hybrid.allocate(32, 1, false).unwrap();
        let above = hybrid.allocate(33, 1, false).unwrap();
        assert!(hybrid.pool_owns(at));
        assert!(!hybrid.pool_owns(above));
        assert_eq!(unsafe { hybrid.block_size(above) }, Some(33));
        assert_eq!(unsafe { hybrid.block_size(at) }, Some(32));

        unsafe {
            hybrid.free(above).unwrap();
            hybrid.free(at).unwrap();
        }
        assert_eq!(hybrid.free_chunks(), 2);
    }

    #[test]
    fn test_exhausted_pool_does_not_spill() {
        let hybrid = HybridPoolAllocator::new(1, 16, HeapAllocator::new()).unwrap();
        let _held = hybrid.allocate(4, 4, false).unwrap();
        let err = hybrid.allocate(1, 1, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    }

    #[test]
    fn test_growth_past_threshold_carries_one_chunk() {
        let hybrid = HybridPoolAllocator::new(2, 16, HeapAllocator::new()).unwrap();
        let block = hybrid.allocate(16, 1, false).unwrap();
        unsafe {
            for i in 0..16 {
                block.as_ptr().add(i).write(i as u8 + 1);
            }
            let moved = hybrid.reallocate(block, 40, 1, true).unwrap();
            assert!(!hybrid.pool_owns(moved));
            let bytes = core::slice::from_raw_parts(moved.as_ptr(), 40);
            let expected: Vec<u8> = (1..=16).chain(core::iter::repeat_n(0, 24)).collect();
            assert_eq!(bytes, expected.as_slice());
            assert_eq!(hybrid.free_chunks(), 2);
            hybrid.free(moved).unwrap();
        }
    }

    #[test]
    fn test_dispose_cascades_to_owned_fallback() {
        let hybrid = HybridPoolAllocator::new(2, 16, ArenaAllocator::new(64).unwrap()).unwrap();
        hybrid.dispose().unwrap();
        assert!(hybrid.is_disposed());
        assert!(hybrid.fallback().is_disposed());
        assert_eq!(
            hybrid.allocate(1, 1, false).unwrap_err().kind(),
            ErrorKind::Disposed
        );
    }

    #[test]
    fn test_shared_fallback_survives_dispose() {
        let arena = Rc::new(ArenaAllocator::new(64).unwrap());
        let hybrid = HybridPoolAllocator::new(2, 16, Rc::clone(&arena)).unwrap();
        hybrid.dispose().unwrap();
        assert!(hybrid.is_disposed());
        assert!(!arena.is_disposed());
    }
}
