//! Owned backing region for the buffer-based strategies
//!
//! # Safety
//!
//! - The region is allocated with [`MAX_ALIGN`] alignment and zeroed
//! - Blocks are always derived from `base` by pointer offset so they keep
//!   the allocation's provenance
//! - `release` frees the region at most once; after it `base` is `None`
//!   and every strategy maps that state to a disposed error

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;

use crate::allocator::AllocatorKind;
use crate::error::{AllocError, AllocResult};
use crate::utils::MAX_ALIGN;

/// Fixed-size, zero-initialised memory region owned by one allocator
pub(crate) struct Buffer {
    base: Cell<Option<NonNull<u8>>>,
    len: usize,
}

// SAFETY: Buffer uniquely owns its heap region; moving it to another thread
// moves that ownership. It is not Sync because `base` is a Cell.
unsafe impl Send for Buffer {}

impl Buffer {
    /// Allocates a zeroed region of `len` bytes
    pub(crate) fn new(len: usize) -> AllocResult<Self> {
        if len == 0 {
            return Err(AllocError::invalid_argument("buffer capacity must be positive"));
        }
        let layout = Layout::from_size_align(len, MAX_ALIGN)
            .map_err(|_| AllocError::invalid_argument("buffer capacity exceeds address space"))?;

        // SAFETY: layout has a non-zero size (checked above).
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        let base = NonNull::new(raw).ok_or_else(|| AllocError::heap_refused(len))?;

        Ok(Self {
            base: Cell::new(Some(base)),
            len,
        })
    }

    /// Start of the region, or a disposed error once released
    #[inline]
    pub(crate) fn base(&self, kind: AllocatorKind) -> AllocResult<NonNull<u8>> {
        self.base.get().ok_or_else(|| AllocError::disposed(kind))
    }

    /// Start of the region without raising a disposed error
    #[inline]
    pub(crate) fn get(&self) -> Option<NonNull<u8>> {
        self.base.get()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_released(&self) -> bool {
        self.base.get().is_none()
    }

    /// Byte offset of `block` inside the region, if the region owns it
    #[inline]
    pub(crate) fn offset_of(&self, block: NonNull<u8>) -> Option<usize> {
        let start = self.base.get()?.as_ptr().addr();
        let offset = block.as_ptr().addr().checked_sub(start)?;
        (offset < self.len).then_some(offset)
    }

    #[inline]
    pub(crate) fn contains(&self, block: NonNull<u8>) -> bool {
        self.offset_of(block).is_some()
    }

    /// Frees the region; returns `false` if it was already released
    pub(crate) fn release(&self) -> bool {
        let Some(base) = self.base.take() else {
            return false;
        };
        // SAFETY: base came from alloc_zeroed with this exact layout, and
        // taking it out of the cell guarantees a single deallocation.
        unsafe {
            std::alloc::dealloc(
                base.as_ptr(),
                Layout::from_size_align_unchecked(self.len, MAX_ALIGN),
            );
        }
        true
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl core::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Buffer")
            .field("base", &self.base.get())
            .field("len", &self.len)
            .finish()
    }
}
