//! Heap allocator implementation
//!
//! Provides an allocator over a [`HeapBackend`], translating the backend's
//! raw failure signals into [`AllocError`]s: a null result becomes an
//! out-of-memory error and a rejected free becomes an invalid-pointer error.

mod backend;

use core::ptr::NonNull;

#[cfg(feature = "libc")]
pub use backend::LibcHeap;
pub use backend::{HEADER_SIZE, HeapBackend, SystemHeap};

use super::{Allocator, AllocatorKind, BlockSize};
use crate::core::Identity;
use crate::error::{AllocError, AllocResult};
use crate::utils::byte_size;

#[cfg(feature = "logging")]
use tracing::trace;

/// Allocator backed by the process heap
///
/// Stateless apart from its registry identity, so a single instance can be
/// shared across threads when the backend is `Sync`.
#[derive(Debug, Default)]
pub struct HeapAllocator<B = SystemHeap> {
    backend: B,
    identity: Identity,
}

impl HeapAllocator {
    /// Creates a heap allocator over the system heap
    #[inline]
    pub const fn new() -> Self {
        Self::with_backend(SystemHeap)
    }
}

impl<B> HeapAllocator<B> {
    /// Creates a heap allocator over a custom backend
    #[inline]
    pub const fn with_backend(backend: B) -> Self {
        Self {
            backend,
            identity: Identity::new(),
        }
    }

    /// Returns the backend
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: HeapBackend> HeapAllocator<B> {
    /// Requested size of a live heap block
    ///
    /// # Safety
    /// `block` must be a live block of this allocator.
    pub unsafe fn size_of(&self, block: NonNull<u8>) -> Option<usize> {
        // SAFETY: forwarded contract.
        unsafe { self.backend.heap_size_of(block.as_ptr()) }
    }
}

// SAFETY: blocks come straight from the backend, which guarantees validity
// and MAX_ALIGN alignment.
unsafe impl<B: HeapBackend> Allocator for HeapAllocator<B> {
    fn allocate(
        &self,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        let bytes = byte_size(count, element_size)?;
        let block = NonNull::new(self.backend.heap_allocate(bytes, zero_fill))
            .ok_or_else(|| AllocError::heap_refused(bytes))?;

        #[cfg(feature = "logging")]
        trace!(bytes, zero_fill, "heap allocate");

        Ok(block)
    }

    unsafe fn reallocate(
        &self,
        block: NonNull<u8>,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        let bytes = byte_size(count, element_size)?;
        // SAFETY: caller guarantees block is a live heap block.
        if unsafe { self.size_of(block) }.is_none() {
            return Err(AllocError::invalid_pointer(block.as_ptr()));
        }
        // SAFETY: block was validated by the backend above.
        let moved = unsafe {
            self.backend
                .heap_reallocate(block.as_ptr(), bytes, zero_fill)
        };
        NonNull::new(moved).ok_or_else(|| AllocError::heap_refused(bytes))
    }

    unsafe fn free(&self, block: NonNull<u8>) -> AllocResult<()> {
        // SAFETY: forwarded contract.
        if unsafe { self.backend.heap_free(block.as_ptr()) } {
            Ok(())
        } else {
            Err(AllocError::invalid_pointer(block.as_ptr()))
        }
    }

    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Heap
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl<B: HeapBackend> BlockSize for HeapAllocator<B> {
    unsafe fn block_size(&self, block: NonNull<u8>) -> Option<usize> {
        // SAFETY: forwarded contract.
        unsafe { self.size_of(block) }
    }
}

#[cfg(test)]
mod tests {
    use core::ptr;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::allocator::AllocatorExt;
    use crate::error::ErrorKind;

    /// Backend that refuses every request
    struct RefusingHeap;

    // SAFETY: never hands out a block.
    unsafe impl HeapBackend for RefusingHeap {
        fn heap_allocate(&self, _size: usize, _zero_fill: bool) -> *mut u8 {
            ptr::null_mut()
        }

        unsafe fn heap_reallocate(&self, _block: *mut u8, _size: usize, _zero: bool) -> *mut u8 {
            ptr::null_mut()
        }

        unsafe fn heap_free(&self, _block: *mut u8) -> bool {
            false
        }

        unsafe fn heap_size_of(&self, _block: *mut u8) -> Option<usize> {
            Some(0)
        }
    }

    #[test]
    fn test_basic_allocation() {
        let heap = HeapAllocator::new();
        let block = heap.allocate(4, 4, true).unwrap();
        unsafe {
            assert_eq!(heap.size_of(block), Some(16));
            let bytes = core::slice::from_raw_parts(block.as_ptr(), 16);
            assert!(bytes.iter().all(|&b| b == 0));
            heap.free(block).unwrap();
        }
    }

    #[test]
    fn test_reallocation_preserves_and_zeroes_tail() {
        let heap = HeapAllocator::new();
        let block = heap.allocate_array::<i32>(4, true).unwrap();
        unsafe {
            for i in 0..4 {
                block.as_ptr().add(i).write(i as i32 + 1);
            }
            let grown = heap.reallocate_array(block, 8, true).unwrap();
            let values = core::slice::from_raw_parts(grown.as_ptr(), 8);
            assert_eq!(values, &[1, 2, 3, 4, 0, 0, 0, 0]);
            assert_eq!(heap.size_of(grown.cast()), Some(32));
            heap.free_array(grown).unwrap();
        }
    }

    #[test]
    fn test_null_from_backend_is_out_of_memory() {
        let heap = HeapAllocator::with_backend(RefusingHeap);
        let err = heap.allocate(1, 8, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
        assert_eq!(err.code(), "ALLOC:OOM:HEAP");
    }

    #[test]
    fn test_rejected_free_is_invalid_pointer() {
        let heap = HeapAllocator::with_backend(RefusingHeap);
        let mut slot = [0u8; 32];
        let block = NonNull::new(slot.as_mut_ptr()).unwrap();
        let err = unsafe { heap.free(block) }.unwrap_err();
        assert!(matches!(err, AllocError::InvalidPointer { .. }));
    }

    #[test]
    fn test_free_rejects_foreign_block() {
        let heap = HeapAllocator::new();
        #[repr(align(16))]
        struct Aligned([u8; 64]);
        let mut foreign = Aligned([0; 64]);
        // 32 bytes in, so the header read stays inside `foreign`
        let block = NonNull::new(unsafe { foreign.0.as_mut_ptr().add(32) }).unwrap();
        let err = unsafe { heap.free(block) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_invalid_counts() {
        let heap = HeapAllocator::new();
        assert_eq!(
            heap.allocate(0, 8, false).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            heap.allocate(8, 0, false).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[cfg(feature = "libc")]
    #[test]
    fn test_libc_backend_round_trip() {
        let heap = HeapAllocator::with_backend(LibcHeap);
        let block = heap.allocate(3, 8, true).unwrap();
        unsafe {
            assert_eq!(heap.size_of(block), Some(24));
            let grown = heap.reallocate(block, 6, 8, true).unwrap();
            assert_eq!(heap.size_of(grown), Some(48));
            heap.free(grown).unwrap();
        }
    }
}
