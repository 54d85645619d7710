//! Hybrid pool built on [`FixedPoolAllocator`]

use core::fmt;
use core::ptr::NonNull;

use super::PoolSide;
use crate::allocator::{Allocator, AllocatorKind, BlockSize, FixedPoolAllocator};
use crate::core::Identity;
use crate::error::AllocResult;

#[cfg(feature = "logging")]
use tracing::debug;

const KIND: AllocatorKind = AllocatorKind::ForwardPool;

/// Chunk count of [`ForwardPoolAllocator::with_fallback`]
pub const DEFAULT_FORWARD_CHUNK_COUNT: usize = 10;

impl PoolSide for FixedPoolAllocator {
    fn chunk_size(&self) -> usize {
        FixedPoolAllocator::chunk_size(self)
    }

    fn owns(&self, block: NonNull<u8>) -> bool {
        self.contains(block)
    }

    fn take_chunk(&self, bytes: usize, zero_fill: bool) -> AllocResult<NonNull<u8>> {
        self.allocate(bytes, 1, zero_fill)
    }

    fn check_chunk(&self, block: NonNull<u8>) -> AllocResult<()> {
        self.check_owned(block)
    }

    unsafe fn keep_chunk(
        &self,
        block: NonNull<u8>,
        bytes: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        // SAFETY: forwarded contract.
        unsafe { self.reallocate(block, bytes, 1, zero_fill) }
    }

    unsafe fn give_back(&self, block: NonNull<u8>) -> AllocResult<()> {
        // SAFETY: forwarded contract.
        unsafe { self.free(block) }
    }

    fn release(&self) -> bool {
        !self.is_disposed() && self.dispose().is_ok()
    }

    fn is_released(&self) -> bool {
        self.is_disposed()
    }
}

/// Fixed pool that forwards requests above its chunk size to a fallback
///
/// Same routing as [`HybridPoolAllocator`](super::HybridPoolAllocator), with
/// the pool being an ordinary [`FixedPoolAllocator`] that stays reachable
/// through [`pool`](Self::pool).
pub struct ForwardPoolAllocator<F> {
    pool: FixedPoolAllocator,
    fallback: F,
    identity: Identity,
}

impl<F: Allocator> ForwardPoolAllocator<F> {
    /// Wraps an existing pool
    pub fn from_pool(pool: FixedPoolAllocator, fallback: F) -> Self {
        #[cfg(feature = "logging")]
        debug!(
            chunk_count = pool.chunk_count(),
            threshold = pool.chunk_size(),
            fallback = %fallback.kind(),
            "forward pool allocator created"
        );

        Self {
            pool,
            fallback,
            identity: Identity::new(),
        }
    }

    /// Creates a pool of `chunk_count` chunks of `chunk_size` bytes
    pub fn new(chunk_count: usize, chunk_size: usize, fallback: F) -> AllocResult<Self> {
        Ok(Self::from_pool(
            FixedPoolAllocator::new(chunk_count, chunk_size)?,
            fallback,
        ))
    }

    /// Creates a pool of [`DEFAULT_FORWARD_CHUNK_COUNT`] default-size chunks
    pub fn with_fallback(fallback: F) -> AllocResult<Self> {
        Ok(Self::from_pool(
            FixedPoolAllocator::with_chunk_count(DEFAULT_FORWARD_CHUNK_COUNT)?,
            fallback,
        ))
    }

    /// Largest request served by the pool
    pub fn threshold(&self) -> usize {
        self.pool.chunk_size()
    }

    /// Whether `block` lies inside the pool
    pub fn pool_owns(&self, block: NonNull<u8>) -> bool {
        self.pool.contains(block)
    }

    /// The underlying fixed pool
    pub fn pool(&self) -> &FixedPoolAllocator {
        &self.pool
    }

    /// Allocator serving requests above the threshold
    pub fn fallback(&self) -> &F {
        &self.fallback
    }
}

// SAFETY: pool blocks come from FixedPoolAllocator and the rest from the
// fallback; both uphold the allocator contract.
unsafe impl<F: Allocator> Allocator for ForwardPoolAllocator<F> {
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
        self.pool.is_disposed()
    }
}

impl<F: Allocator + BlockSize> BlockSize for ForwardPoolAllocator<F> {
    unsafe fn block_size(&self, block: NonNull<u8>) -> Option<usize> {
        // SAFETY: forwarded contract.
        unsafe { super::block_size(&self.pool, &self.fallback, block) }
    }
}

impl<F: fmt::Debug> fmt::Debug for ForwardPoolAllocator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardPoolAllocator")
            .field("pool", &self.pool)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}
