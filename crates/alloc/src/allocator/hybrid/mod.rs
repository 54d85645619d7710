//! Pool allocators with a fallback for large requests
//!
//! Both variants route a request by size: up to the pool's chunk size (the
//! threshold) it is served by the pool, above it by the fallback allocator.
//! They differ only in where the pool lives:
//!
//! - [`HybridPoolAllocator`] embeds its own chunk storage
//! - [`ForwardPoolAllocator`] drives a [`FixedPoolAllocator`] through its
//!   public contract
//!
//! ## Routing rules
//!
//! - An exhausted pool fails with out-of-memory; small requests never spill
//!   into the fallback
//! - Growing a pool block past the threshold moves it to the fallback and
//!   carries exactly `threshold` bytes over
//! - Blocks outside the pool's buffer belong to the fallback
//! - Disposal releases the pool, then disposes the fallback if this
//!   allocator owns it
//!
//! [`FixedPoolAllocator`]: super::FixedPoolAllocator

mod forward;
mod memory_pool;

use core::ptr::{self, NonNull};

pub use forward::{DEFAULT_FORWARD_CHUNK_COUNT, ForwardPoolAllocator};
pub use memory_pool::{DEFAULT_HYBRID_CHUNK_COUNT, DEFAULT_HYBRID_CHUNK_SIZE, HybridPoolAllocator};

use super::{Allocator, AllocatorKind, BlockSize};
use crate::error::{AllocError, AllocResult};
use crate::utils::byte_size;

#[cfg(feature = "logging")]
use tracing::debug;

/// Pool half of a hybrid allocator
pub(crate) trait PoolSide {
    /// Largest request the pool serves
    fn chunk_size(&self) -> usize;

    /// Whether `block` lies inside the pool's buffer
    fn owns(&self, block: NonNull<u8>) -> bool;

    fn take_chunk(&self, bytes: usize, zero_fill: bool) -> AllocResult<NonNull<u8>>;

    /// Fails unless `block` starts one of the pool's chunks
    fn check_chunk(&self, block: NonNull<u8>) -> AllocResult<()>;

    /// Resizes a pool block within its chunk, zeroing newly exposed bytes
    /// when asked
    ///
    /// # Safety
    /// `block` must be a live chunk taken from this pool.
    unsafe fn keep_chunk(
        &self,
        block: NonNull<u8>,
        bytes: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>>;

    /// # Safety
    /// `block` must be a live chunk taken from this pool.
    unsafe fn give_back(&self, block: NonNull<u8>) -> AllocResult<()>;

    /// Frees the pool's buffer; `false` if it was already released
    fn release(&self) -> bool;

    fn is_released(&self) -> bool;
}

fn check_active<P: PoolSide>(kind: AllocatorKind, pool: &P) -> AllocResult<()> {
    if pool.is_released() {
        Err(AllocError::disposed(kind))
    } else {
        Ok(())
    }
}

fn allocate<P, F>(
    kind: AllocatorKind,
    pool: &P,
    fallback: &F,
    count: usize,
    element_size: usize,
    zero_fill: bool,
) -> AllocResult<NonNull<u8>>
where
    P: PoolSide,
    F: Allocator,
{
    check_active(kind, pool)?;
    let bytes = byte_size(count, element_size)?;
    if bytes <= pool.chunk_size() {
        return pool.take_chunk(bytes, zero_fill);
    }

    #[cfg(feature = "logging")]
    debug!(%kind, bytes, threshold = pool.chunk_size(), "request above threshold, using fallback");

    fallback.allocate(count, element_size, zero_fill)
}

/// # Safety
/// `block` must be a live block of the pool or of the fallback.
unsafe fn reallocate<P, F>(
    kind: AllocatorKind,
    pool: &P,
    fallback: &F,
    block: NonNull<u8>,
    count: usize,
    element_size: usize,
    zero_fill: bool,
) -> AllocResult<NonNull<u8>>
where
    P: PoolSide,
    F: Allocator,
{
    check_active(kind, pool)?;
    if !pool.owns(block) {
        // SAFETY: not a pool block, so by contract it came from the fallback.
        return unsafe { fallback.reallocate(block, count, element_size, zero_fill) };
    }

    let bytes = byte_size(count, element_size)?;
    let threshold = pool.chunk_size();
    if bytes <= threshold {
        // SAFETY: forwarded contract.
        return unsafe { pool.keep_chunk(block, bytes, zero_fill) };
    }

    pool.check_chunk(block)?;
    let moved = fallback.allocate(count, element_size, zero_fill)?;
    // SAFETY: the chunk holds `threshold` bytes, the fresh block holds
    // `bytes > threshold`, and they come from different allocators.
    unsafe { ptr::copy_nonoverlapping(block.as_ptr(), moved.as_ptr(), threshold) };
    // SAFETY: block is a live pool chunk and is not used after this point.
    unsafe { pool.give_back(block) }?;

    #[cfg(feature = "logging")]
    debug!(%kind, bytes, threshold, "pool block relocated to fallback");

    Ok(moved)
}

/// # Safety
/// `block` must be a live block of the pool or of the fallback.
unsafe fn free<P, F>(
    kind: AllocatorKind,
    pool: &P,
    fallback: &F,
    block: NonNull<u8>,
) -> AllocResult<()>
where
    P: PoolSide,
    F: Allocator,
{
    check_active(kind, pool)?;
    if pool.owns(block) {
        // SAFETY: forwarded contract.
        unsafe { pool.give_back(block) }
    } else {
        // SAFETY: forwarded contract.
        unsafe { fallback.free(block) }
    }
}

fn dispose<P, F>(_kind: AllocatorKind, pool: &P, fallback: &F) -> AllocResult<()>
where
    P: PoolSide,
    F: Allocator,
{
    if !pool.release() {
        return Ok(());
    }

    #[cfg(feature = "logging")]
    debug!(kind = %_kind, fallback = %fallback.kind(), "hybrid pool disposed");

    fallback.dispose()
}

/// # Safety
/// `block` must be a live block of the pool or of the fallback.
unsafe fn block_size<P, F>(pool: &P, fallback: &F, block: NonNull<u8>) -> Option<usize>
where
    P: PoolSide,
    F: BlockSize,
{
    if pool.owns(block) {
        Some(pool.chunk_size())
    } else {
        // SAFETY: forwarded contract.
        unsafe { fallback.block_size(block) }
    }
}
