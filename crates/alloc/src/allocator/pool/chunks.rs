//! Chunk storage shared by the fixed pool and the embedded hybrid pool
//!
//! # Safety
//!
//! - Chunks are laid out at multiples of `stride`, which is the chunk size
//!   rounded up to [`MAX_ALIGN`], so every chunk is pointer aligned and can
//!   hold a free-list link
//! - A pointer is accepted back only if it lies inside the buffer on a
//!   chunk boundary
//! - The free list is cleared together with the buffer, so no dangling node
//!   survives disposal
//! - Each handed-out chunk records the bytes last requested for it, so an
//!   in-place resize knows which tail bytes are newly exposed

use core::cell::Cell;
use core::ptr::{self, NonNull};

use crate::allocator::AllocatorKind;
use crate::core::buffer::Buffer;
use crate::core::free_list::FreeList;
use crate::error::{AllocError, AllocResult};
use crate::utils::{MAX_ALIGN, checked_align_up};

/// Equal-size chunks carved from one buffer plus their free list
pub(crate) struct Chunks {
    buffer: Buffer,
    free: FreeList,
    /// Requested size per chunk, by chunk index
    sizes: Box<[Cell<usize>]>,
    chunk_size: usize,
    stride: usize,
    count: usize,
    kind: AllocatorKind,
}

// SAFETY: the free list only links chunks of the owned buffer, so moving the
// whole structure to another thread moves every pointer's target with it.
unsafe impl Send for Chunks {}

impl Chunks {
    /// Creates `count` chunks of at least `chunk_size` bytes, all free
    pub(crate) fn new(kind: AllocatorKind, count: usize, chunk_size: usize) -> AllocResult<Self> {
        if chunk_size == 0 {
            return Err(AllocError::invalid_argument("chunk size must be positive"));
        }
        if count == 0 {
            return Err(AllocError::invalid_argument("chunk count must be positive"));
        }

        let chunk_size = chunk_size.max(size_of::<usize>());
        let stride = checked_align_up(chunk_size, MAX_ALIGN)
            .ok_or_else(|| AllocError::size_overflow(count, chunk_size))?;
        let len = stride
            .checked_mul(count)
            .ok_or_else(|| AllocError::size_overflow(count, stride))?;

        let chunks = Self {
            buffer: Buffer::new(len)?,
            free: FreeList::new(),
            sizes: (0..count).map(|_| Cell::new(0)).collect(),
            chunk_size,
            stride,
            count,
            kind,
        };
        chunks.rebuild();
        Ok(chunks)
    }

    /// Puts every chunk back on the free list
    pub(crate) fn rebuild(&self) {
        if let Some(base) = self.buffer.get() {
            // SAFETY: the buffer holds `count` chunks of `stride` bytes,
            // stride is a multiple of MAX_ALIGN and the caller gave up every
            // outstanding chunk.
            unsafe { self.free.rebuild(base, self.stride, self.count) };
        }
    }

    #[inline]
    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub(crate) fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Whether `block` lies inside the buffer
    #[inline]
    pub(crate) fn contains(&self, block: NonNull<u8>) -> bool {
        self.buffer.contains(block)
    }

    /// Fails with a disposed error once the buffer is released
    #[inline]
    pub(crate) fn check_active(&self) -> AllocResult<()> {
        self.buffer.base(self.kind).map(|_| ())
    }

    /// Validates that `block` is the start of one of our chunks
    pub(crate) fn check_owned(&self, block: NonNull<u8>) -> AllocResult<()> {
        self.chunk_index(block).map(|_| ())
    }

    /// Index of the chunk starting at `block`
    fn chunk_index(&self, block: NonNull<u8>) -> AllocResult<usize> {
        self.check_active()?;
        match self.buffer.offset_of(block) {
            Some(offset) if offset % self.stride == 0 => Ok(offset / self.stride),
            Some(offset) => Err(AllocError::invalid_argument(format!(
                "block at offset {offset} is not on a {}-byte chunk boundary",
                self.stride
            ))),
            None => Err(AllocError::not_owned(self.kind, block.as_ptr())),
        }
    }

    /// Pops a chunk for a request of `bytes`
    pub(crate) fn allocate(&self, bytes: usize, zero_fill: bool) -> AllocResult<NonNull<u8>> {
        let base = self.buffer.base(self.kind)?;
        if bytes > self.chunk_size {
            return Err(AllocError::out_of_memory(self.kind, bytes, self.chunk_size));
        }
        let chunk = self
            .free
            .pop()
            .ok_or_else(|| AllocError::out_of_memory(self.kind, bytes, 0))?;
        if zero_fill {
            // SAFETY: the chunk was just unlinked and spans chunk_size bytes.
            unsafe { ptr::write_bytes(chunk.as_ptr(), 0, self.chunk_size) };
        }
        let index = (chunk.as_ptr().addr() - base.as_ptr().addr()) / self.stride;
        self.sizes[index].set(bytes);
        Ok(chunk)
    }

    /// Resizes a handed-out chunk in place to `bytes`
    ///
    /// With `zero_fill`, bytes past the previously requested size are zeroed.
    ///
    /// # Safety
    /// `block` must be a chunk handed out by [`allocate`](Self::allocate)
    /// that has not been freed since.
    pub(crate) unsafe fn resize(
        &self,
        block: NonNull<u8>,
        bytes: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        let index = self.chunk_index(block)?;
        if bytes > self.chunk_size {
            return Err(AllocError::out_of_memory(self.kind, bytes, self.chunk_size));
        }
        let used = &self.sizes[index];
        if zero_fill && bytes > used.get() {
            // SAFETY: used..bytes lies inside a chunk the caller holds.
            unsafe { ptr::write_bytes(block.as_ptr().add(used.get()), 0, bytes - used.get()) };
        }
        used.set(bytes);
        Ok(block)
    }

    /// Pushes `block` back, poisoning it with `pattern` first
    ///
    /// # Safety
    /// `block` must be a chunk handed out by [`allocate`](Self::allocate)
    /// that has not been freed since.
    pub(crate) unsafe fn free(&self, block: NonNull<u8>, pattern: Option<u8>) -> AllocResult<()> {
        self.check_owned(block)?;
        if let Some(byte) = pattern {
            // SAFETY: block is an owned chunk of chunk_size bytes.
            unsafe { ptr::write_bytes(block.as_ptr(), byte, self.chunk_size) };
        }
        // SAFETY: ownership and chunk boundary checked above; the caller
        // guarantees it is not already on the list.
        unsafe { self.free.push(block) };
        Ok(())
    }

    /// Frees the buffer; returns `false` if it was already released
    pub(crate) fn release(&self) -> bool {
        self.free.clear();
        self.buffer.release()
    }

    #[inline]
    pub(crate) fn is_released(&self) -> bool {
        self.buffer.is_released()
    }
}

impl core::fmt::Debug for Chunks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Chunks")
            .field("chunk_size", &self.chunk_size)
            .field("count", &self.count)
            .field("free", &self.free.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn tiny_chunks_still_fit_a_link() {
        let chunks = Chunks::new(AllocatorKind::FixedPool, 4, 1).unwrap();
        assert_eq!(chunks.chunk_size(), size_of::<usize>());
        assert_eq!(chunks.free_count(), 4);
    }

    #[test]
    fn chunks_are_handed_out_lowest_first() {
        let chunks = Chunks::new(AllocatorKind::FixedPool, 3, 24).unwrap();
        let a = chunks.allocate(8, false).unwrap();
        let b = chunks.allocate(8, false).unwrap();
        assert_eq!(b.as_ptr().addr() - a.as_ptr().addr(), 32);
        assert_eq!(a.as_ptr().addr() % MAX_ALIGN, 0);
    }

    #[test]
    fn resize_zeroes_only_the_exposed_tail() {
        let chunks = Chunks::new(AllocatorKind::FixedPool, 1, 64).unwrap();
        let block = chunks.allocate(8, false).unwrap();
        unsafe {
            block.as_ptr().write_bytes(0x11, 8);
            block.as_ptr().add(8).write_bytes(0xEE, 56);
            chunks.resize(block, 64, true).unwrap();
        }
        let bytes = unsafe { core::slice::from_raw_parts(block.as_ptr(), 64) };
        assert!(bytes[..8].iter().all(|&b| b == 0x11));
        assert!(bytes[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn off_boundary_pointer_is_invalid() {
        let chunks = Chunks::new(AllocatorKind::FixedPool, 2, 32).unwrap();
        let block = chunks.allocate(32, false).unwrap();
        let inner = unsafe { block.add(4) };
        let err = unsafe { chunks.free(inner, None) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(matches!(err, AllocError::InvalidArgument { .. }));
    }

    #[test]
    fn zero_parameters_are_rejected() {
        assert!(Chunks::new(AllocatorKind::FixedPool, 0, 8).is_err());
        assert!(Chunks::new(AllocatorKind::FixedPool, 8, 0).is_err());
    }

    #[test]
    fn release_forgets_free_list() {
        let chunks = Chunks::new(AllocatorKind::HybridPool, 2, 16).unwrap();
        assert!(chunks.release());
        assert_eq!(chunks.free_count(), 0);
        assert_eq!(
            chunks.allocate(8, false).unwrap_err().kind(),
            ErrorKind::Disposed
        );
        chunks.rebuild();
        assert_eq!(chunks.free_count(), 0);
    }
}
