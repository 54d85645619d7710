//! OS heap primitives
//!
//! A [`HeapBackend`] speaks the raw heap protocol: null on allocation
//! failure and `false` on a rejected free. [`HeapAllocator`](super::HeapAllocator)
//! turns those signals into typed errors.
//!
//! Both bundled backends prefix each block with a [`HEADER_SIZE`]-byte header
//! holding the requested size and a canary word, which makes `heap_size_of`
//! exact and lets `heap_free` reject pointers it never issued.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use std::alloc::System;

use crate::utils::MAX_ALIGN;

/// Bytes reserved in front of every heap block
pub const HEADER_SIZE: usize = MAX_ALIGN;

const CANARY: usize = 0xA110_C8ED;

/// Raw process-heap primitives
///
/// # Safety
///
/// Implementors must return blocks aligned to [`MAX_ALIGN`] that stay valid
/// until passed to `heap_free` or replaced by `heap_reallocate`.
pub unsafe trait HeapBackend {
    /// Allocates `size` bytes, zeroed if asked; null on failure
    fn heap_allocate(&self, size: usize, zero_fill: bool) -> *mut u8;

    /// Resizes a block to `new_size` bytes; null on failure, leaving `block` intact
    ///
    /// When `zero_fill` is set, bytes past the old size read as zero.
    ///
    /// # Safety
    /// `block` must be a live block of this backend.
    unsafe fn heap_reallocate(&self, block: *mut u8, new_size: usize, zero_fill: bool) -> *mut u8;

    /// Releases a block; `false` when the backend rejects the pointer
    ///
    /// # Safety
    /// `block` must point at least [`HEADER_SIZE`] bytes into readable memory.
    unsafe fn heap_free(&self, block: *mut u8) -> bool;

    /// Requested size of a block, `None` if the backend does not recognise it
    ///
    /// # Safety
    /// `block` must point at least [`HEADER_SIZE`] bytes into readable memory.
    unsafe fn heap_size_of(&self, block: *mut u8) -> Option<usize>;
}

// ============================================================================
// Header helpers
// ============================================================================

#[inline]
unsafe fn write_header(raw: *mut u8, size: usize) -> *mut u8 {
    // SAFETY: raw is the start of an allocation of at least HEADER_SIZE bytes
    // aligned to MAX_ALIGN, which is enough for two usize words.
    unsafe {
        raw.cast::<usize>().write(size);
        raw.cast::<usize>().add(1).write(CANARY);
        raw.add(HEADER_SIZE)
    }
}

/// Returns the allocation start and stored size if the canary matches
#[inline]
unsafe fn read_header(block: *mut u8) -> Option<(*mut u8, usize)> {
    if block.is_null() || block.addr() % MAX_ALIGN != 0 {
        return None;
    }
    // SAFETY: the caller guarantees HEADER_SIZE readable bytes before block.
    unsafe {
        let raw = block.sub(HEADER_SIZE);
        let canary = raw.cast::<usize>().add(1).read();
        let size = raw.cast::<usize>().read();
        (canary == CANARY).then_some((raw, size))
    }
}

#[inline]
unsafe fn clear_canary(raw: *mut u8) {
    // SAFETY: raw is a live allocation start with a header.
    unsafe { raw.cast::<usize>().add(1).write(0) };
}

#[inline]
fn total_layout(size: usize) -> Option<Layout> {
    let total = size.checked_add(HEADER_SIZE)?;
    Layout::from_size_align(total, MAX_ALIGN).ok()
}

// ============================================================================
// System heap
// ============================================================================

/// Backend over Rust's [`System`] allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHeap;

// SAFETY: System returns MAX_ALIGN-aligned allocations for our layouts and
// HEADER_SIZE is a multiple of MAX_ALIGN.
unsafe impl HeapBackend for SystemHeap {
    fn heap_allocate(&self, size: usize, zero_fill: bool) -> *mut u8 {
        let Some(layout) = total_layout(size) else {
            return ptr::null_mut();
        };
        // SAFETY: layout is non-zero sized (it includes the header).
        let raw = unsafe {
            if zero_fill {
                System.alloc_zeroed(layout)
            } else {
                System.alloc(layout)
            }
        };
        if raw.is_null() {
            return raw;
        }
        // SAFETY: raw is a fresh allocation of layout.size() bytes.
        unsafe { write_header(raw, size) }
    }

    unsafe fn heap_reallocate(&self, block: *mut u8, new_size: usize, zero_fill: bool) -> *mut u8 {
        // SAFETY: forwarded contract.
        let Some((raw, old_size)) = (unsafe { read_header(block) }) else {
            return ptr::null_mut();
        };
        let (Some(old_layout), Some(new_layout)) = (total_layout(old_size), total_layout(new_size))
        else {
            return ptr::null_mut();
        };

        // SAFETY: raw was allocated by System with old_layout.
        let moved = unsafe { System.realloc(raw, old_layout, new_layout.size()) };
        if moved.is_null() {
            return moved;
        }
        // SAFETY: moved holds new_layout.size() bytes; the zeroed range is the
        // grown tail past the preserved payload.
        unsafe {
            let payload = write_header(moved, new_size);
            if zero_fill && new_size > old_size {
                ptr::write_bytes(payload.add(old_size), 0, new_size - old_size);
            }
            payload
        }
    }

    unsafe fn heap_free(&self, block: *mut u8) -> bool {
        // SAFETY: forwarded contract.
        let Some((raw, size)) = (unsafe { read_header(block) }) else {
            return false;
        };
        let Some(layout) = total_layout(size) else {
            return false;
        };
        // SAFETY: raw is a live System allocation of `layout`.
        unsafe {
            clear_canary(raw);
            System.dealloc(raw, layout);
        }
        true
    }

    unsafe fn heap_size_of(&self, block: *mut u8) -> Option<usize> {
        // SAFETY: forwarded contract.
        unsafe { read_header(block) }.map(|(_, size)| size)
    }
}

// ============================================================================
// C heap
// ============================================================================

/// Backend over the C runtime's `malloc` family
#[cfg(feature = "libc")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LibcHeap;

// SAFETY: malloc returns storage aligned for max_align_t (16 bytes on the
// 64-bit targets we build for) and the header preserves that alignment.
#[cfg(feature = "libc")]
unsafe impl HeapBackend for LibcHeap {
    fn heap_allocate(&self, size: usize, zero_fill: bool) -> *mut u8 {
        let Some(total) = size.checked_add(HEADER_SIZE) else {
            return ptr::null_mut();
        };
        // SAFETY: plain C allocation calls.
        let raw = unsafe {
            if zero_fill {
                libc::calloc(1, total)
            } else {
                libc::malloc(total)
            }
        }
        .cast::<u8>();
        if raw.is_null() || raw.addr() % MAX_ALIGN != 0 {
            // SAFETY: free(NULL) is a no-op; otherwise raw came from malloc.
            unsafe { libc::free(raw.cast()) };
            return ptr::null_mut();
        }
        // SAFETY: raw holds `total` bytes.
        unsafe { write_header(raw, size) }
    }

    unsafe fn heap_reallocate(&self, block: *mut u8, new_size: usize, zero_fill: bool) -> *mut u8 {
        // SAFETY: forwarded contract.
        let Some((raw, old_size)) = (unsafe { read_header(block) }) else {
            return ptr::null_mut();
        };
        let Some(total) = new_size.checked_add(HEADER_SIZE) else {
            return ptr::null_mut();
        };
        // SAFETY: raw came from malloc/calloc.
        let moved = unsafe { libc::realloc(raw.cast(), total) }.cast::<u8>();
        if moved.is_null() {
            return moved;
        }
        // SAFETY: moved holds `total` bytes.
        unsafe {
            let payload = write_header(moved, new_size);
            if zero_fill && new_size > old_size {
                ptr::write_bytes(payload.add(old_size), 0, new_size - old_size);
            }
            payload
        }
    }

    unsafe fn heap_free(&self, block: *mut u8) -> bool {
        // SAFETY: forwarded contract.
        let Some((raw, _)) = (unsafe { read_header(block) }) else {
            return false;
        };
        // SAFETY: raw came from malloc/calloc/realloc.
        unsafe {
            clear_canary(raw);
            libc::free(raw.cast());
        }
        true
    }

    unsafe fn heap_size_of(&self, block: *mut u8) -> Option<usize> {
        // SAFETY: forwarded contract.
        unsafe { read_header(block) }.map(|(_, size)| size)
    }
}
