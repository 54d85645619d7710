//! Arena (bump) allocator
//!
//! Allocates by advancing a single offset through a fixed buffer. Individual
//! blocks are never reclaimed; the whole buffer goes away on disposal or is
//! rewound with [`Resettable::reset`].
//!
//! # Safety
//!
//! - Blocks are carved from `[offset, offset + bytes)` and the offset only
//!   moves forward, so live blocks never overlap
//! - The most recent block may be resized in place because nothing lies
//!   after it
//! - Every pointer accepted by `reallocate`/`free` is range-checked against
//!   the buffer before use

use core::cell::Cell;
use core::ptr::{self, NonNull};

use super::{Allocator, AllocatorKind};
use crate::core::buffer::Buffer;
use crate::core::{Identity, MemoryUsage, Resettable};
use crate::error::{AllocError, AllocResult};
use crate::utils::{byte_size, checked_align_up, element_align};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

const KIND: AllocatorKind = AllocatorKind::Arena;

/// Configuration for the arena allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Fill pattern for blocks handed out without zero fill
    pub alloc_pattern: Option<u8>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            alloc_pattern: if cfg!(debug_assertions) { Some(0xCC) } else { None },
        }
    }
}

impl ArenaConfig {
    /// Production configuration - no fill patterns
    pub fn production() -> Self {
        Self {
            alloc_pattern: None,
        }
    }

    /// Debug configuration - poison fresh blocks
    pub fn debug() -> Self {
        Self {
            alloc_pattern: Some(0xCC),
        }
    }
}

/// Monotonic bump allocator over a fixed buffer
///
/// # Memory Layout
/// ```text
/// [start]----[block1]----[block2]----[offset]----[free]----[end]
///                        ^ last
/// ```
pub struct ArenaAllocator {
    buffer: Buffer,
    offset: Cell<usize>,
    /// Start offset of the most recent block, the only one that can grow in place
    last: Cell<Option<usize>>,
    config: ArenaConfig,
    identity: Identity,
}

impl ArenaAllocator {
    /// Creates an arena with `capacity` bytes
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, ArenaConfig::default())
    }

    /// Creates an arena with custom configuration
    pub fn with_config(capacity: usize, config: ArenaConfig) -> AllocResult<Self> {
        let buffer = Buffer::new(capacity)?;

        #[cfg(feature = "logging")]
        debug!(capacity, "arena allocator created");

        Ok(Self {
            buffer,
            offset: Cell::new(0),
            last: Cell::new(None),
            config,
            identity: Identity::new(),
        })
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes consumed so far, padding included
    pub fn used(&self) -> usize {
        self.offset.get()
    }

    /// Bytes left before the arena is exhausted
    pub fn remaining(&self) -> usize {
        self.capacity() - self.used()
    }

    /// Checks if a block lies inside this arena's buffer
    pub fn contains(&self, block: NonNull<u8>) -> bool {
        self.buffer.contains(block)
    }

    /// Bumps the offset for `bytes` aligned to `align`; returns the block start
    fn bump(&self, bytes: usize, align: usize) -> AllocResult<usize> {
        let offset = self.offset.get();
        let start = checked_align_up(offset, align)
            .and_then(|start| start.checked_add(bytes).map(|end| (start, end)));
        match start {
            Some((start, end)) if end <= self.capacity() => {
                self.offset.set(end);
                self.last.set(Some(start));
                Ok(start)
            }
            _ => Err(AllocError::out_of_memory(
                KIND,
                bytes,
                self.capacity() - offset,
            )),
        }
    }

    fn fill(&self, block: NonNull<u8>, len: usize, zero_fill: bool) {
        let pattern = if zero_fill {
            Some(0)
        } else {
            self.config.alloc_pattern
        };
        if let Some(byte) = pattern {
            // SAFETY: block..block + len is a freshly bumped range of the buffer.
            unsafe { ptr::write_bytes(block.as_ptr(), byte, len) };
        }
    }
}

// SAFETY: blocks are disjoint bumped ranges of an owned, MAX_ALIGN-aligned
// buffer, aligned to element_align(element_size).
unsafe impl Allocator for ArenaAllocator {
    fn allocate(
        &self,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        let base = self.buffer.base(KIND)?;
        let bytes = byte_size(count, element_size)?;
        let start = self.bump(bytes, element_align(element_size))?;

        // SAFETY: start + bytes <= capacity.
        let block = unsafe { base.add(start) };
        self.fill(block, bytes, zero_fill);

        #[cfg(feature = "logging")]
        trace!(bytes, start, "arena allocate");

        Ok(block)
    }

    unsafe fn reallocate(
        &self,
        block: NonNull<u8>,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        self.buffer.base(KIND)?;
        let bytes = byte_size(count, element_size)?;
        let start = self
            .buffer
            .offset_of(block)
            .ok_or_else(|| AllocError::not_owned(KIND, block.as_ptr()))?;
        let used = self.offset.get();

        let in_place = self.last.get() == Some(start) && start % element_align(element_size) == 0;
        if in_place {
            let end = start
                .checked_add(bytes)
                .filter(|&end| end <= self.capacity())
                .ok_or_else(|| AllocError::out_of_memory(KIND, bytes, self.capacity() - start))?;
            if zero_fill && end > used {
                // SAFETY: used..end lies inside the buffer and past every live block.
                unsafe { ptr::write_bytes(block.as_ptr().add(used - start), 0, end - used) };
            }
            self.offset.set(end);
            return Ok(block);
        }

        // Interior blocks cannot move the bump offset, so the block is copied
        // into a fresh allocation. Its exact size is unknown; everything up to
        // the current offset is carried over, capped at the new size.
        let fresh = self.allocate(count, element_size, zero_fill)?;
        let carried = bytes.min(used - start);
        // SAFETY: the source range ends at the old offset and the fresh block
        // starts at or after it, so the ranges are disjoint and in bounds.
        unsafe { ptr::copy_nonoverlapping(block.as_ptr(), fresh.as_ptr(), carried) };

        #[cfg(feature = "logging")]
        debug!(bytes, carried, "arena relocated interior block");

        Ok(fresh)
    }

    unsafe fn free(&self, block: NonNull<u8>) -> AllocResult<()> {
        self.buffer.base(KIND)?;
        if self.buffer.contains(block) {
            Ok(())
        } else {
            Err(AllocError::not_owned(KIND, block.as_ptr()))
        }
    }

    fn kind(&self) -> AllocatorKind {
        KIND
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn dispose(&self) -> AllocResult<()> {
        if self.buffer.release() {
            #[cfg(feature = "logging")]
            debug!(used = self.offset.get(), "arena allocator disposed");

            self.offset.set(0);
            self.last.set(None);
        }
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.buffer.is_released()
    }
}

impl MemoryUsage for ArenaAllocator {
    fn used_memory(&self) -> usize {
        self.used()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(if self.is_disposed() { 0 } else { self.remaining() })
    }
}

impl Resettable for ArenaAllocator {
    unsafe fn reset(&self) {
        self.offset.set(0);
        self.last.set(None);
    }
}

impl core::fmt::Debug for ArenaAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_bumps_monotonically() {
        let arena = ArenaAllocator::with_config(64, ArenaConfig::production()).unwrap();
        let a = arena.allocate(4, 4, true).unwrap();
        unsafe { arena.free(a).unwrap() };
        let b = arena.allocate(4, 4, true).unwrap();
        assert_ne!(a, b);
        assert_eq!(arena.used(), 32);
    }

    #[test]
    fn test_exhaustion_reports_remaining() {
        let arena = ArenaAllocator::new(16).unwrap();
        arena.allocate(10, 1, false).unwrap();
        let err = arena.allocate(8, 1, false).unwrap_err();
        assert_eq!(
            err,
            AllocError::OutOfMemory {
                allocator: AllocatorKind::Arena,
                requested: 8,
                available: 6,
            }
        );
        assert_eq!(arena.used(), 10);
    }

    #[test]
    fn test_elements_are_aligned() {
        let arena = ArenaAllocator::new(64).unwrap();
        arena.allocate(3, 1, false).unwrap();
        let block = arena.allocate(2, 8, false).unwrap();
        assert_eq!(block.as_ptr().addr() % 8, 0);
        assert_eq!(arena.used(), 8 + 16);
    }

    #[test]
    fn test_grow_last_in_place_zeroes_tail() {
        let arena = ArenaAllocator::new(64).unwrap();
        let block = arena.allocate(2, 4, false).unwrap();
        unsafe {
            block.cast::<[u32; 2]>().as_ptr().write([7, 9]);
            let grown = arena.reallocate(block, 4, 4, true).unwrap();
            assert_eq!(grown, block);
            assert_eq!(grown.cast::<[u32; 4]>().as_ptr().read(), [7, 9, 0, 0]);
        }
        assert_eq!(arena.used(), 16);
    }

    #[test]
    fn test_shrink_last_gives_bytes_back() {
        let arena = ArenaAllocator::new(64).unwrap();
        let block = arena.allocate(32, 1, false).unwrap();
        let shrunk = unsafe { arena.reallocate(block, 8, 1, false) }.unwrap();
        assert_eq!(shrunk, block);
        assert_eq!(arena.used(), 8);
    }

    #[test]
    fn test_interior_reallocate_copies_forward() {
        let arena = ArenaAllocator::new(128).unwrap();
        let first = arena.allocate(4, 4, true).unwrap();
        unsafe { first.cast::<[u32; 4]>().as_ptr().write([1, 2, 3, 4]) };
        let _second = arena.allocate(4, 4, true).unwrap();

        let moved = unsafe { arena.reallocate(first, 6, 4, true) }.unwrap();
        assert_ne!(moved, first);
        let values = unsafe { moved.cast::<[u32; 4]>().as_ptr().read() };
        assert_eq!(values, [1, 2, 3, 4]);
    }

    #[test]
    fn test_foreign_block_is_not_owned() {
        let arena = ArenaAllocator::new(32).unwrap();
        let other = ArenaAllocator::new(32).unwrap();
        let block = other.allocate(1, 8, false).unwrap();
        let err = unsafe { arena.free(block) }.unwrap_err();
        assert!(matches!(err, AllocError::NotOwned { .. }));
    }

    #[test]
    fn test_disposed_arena_rejects_everything() {
        let arena = ArenaAllocator::new(32).unwrap();
        let block = arena.allocate(1, 8, false).unwrap();
        arena.dispose().unwrap();
        assert!(arena.is_disposed());
        assert_eq!(
            arena.allocate(1, 1, false).unwrap_err().kind(),
            ErrorKind::Disposed
        );
        assert_eq!(
            unsafe { arena.free(block) }.unwrap_err().kind(),
            ErrorKind::Disposed
        );
        assert_eq!(arena.available_memory(), Some(0));
    }

    #[test]
    fn test_reset_rewinds() {
        let arena = ArenaAllocator::new(32).unwrap();
        let first = arena.allocate(16, 1, false).unwrap();
        unsafe { arena.reset() };
        assert_eq!(arena.used(), 0);
        let again = arena.allocate(16, 1, false).unwrap();
        assert_eq!(first, again);
    }
}
