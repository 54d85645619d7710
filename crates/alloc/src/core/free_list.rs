//! Intrusive singly-linked list of free chunks
//!
//! A free chunk stores the link to the next free chunk in its first machine
//! word, so chunks must be at least one pointer wide and pointer aligned.

use core::cell::Cell;
use core::ptr::{self, NonNull};

/// Node in the free list
///
/// When a chunk is free, its first bytes hold a pointer to the next free
/// chunk, forming a linked list.
#[repr(C)]
struct FreeChunk {
    next: Option<NonNull<FreeChunk>>,
}

/// Head of the free list plus a count of its nodes
#[derive(Debug, Default)]
pub(crate) struct FreeList {
    head: Cell<Option<NonNull<FreeChunk>>>,
    len: Cell<usize>,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            head: Cell::new(None),
            len: Cell::new(0),
        }
    }

    /// Links `count` chunks of `stride` bytes starting at `base`, lowest address first.
    ///
    /// # Safety
    /// - `base..base + stride * count` must be writable memory owned by the caller
    /// - `base` and `stride` must keep every chunk pointer aligned
    /// - No chunk of the region may be in use
    pub(crate) unsafe fn rebuild(&self, base: NonNull<u8>, stride: usize, count: usize) {
        debug_assert!(stride >= size_of::<FreeChunk>());
        debug_assert_eq!(stride % align_of::<FreeChunk>(), 0);

        let mut next = None;
        for index in (0..count).rev() {
            // SAFETY: index * stride is inside the region per the caller contract.
            let chunk = unsafe { base.add(index * stride) }.cast::<FreeChunk>();
            // SAFETY: chunk is aligned, writable and unused.
            unsafe { chunk.as_ptr().write(FreeChunk { next }) };
            next = Some(chunk);
        }
        self.head.set(next);
        self.len.set(count);
    }

    /// Pops the head chunk
    pub(crate) fn pop(&self) -> Option<NonNull<u8>> {
        let head = self.head.get()?;
        // SAFETY: every node on the list was written by rebuild or push and
        // is not handed out while linked.
        let next = unsafe { ptr::read(head.as_ptr()).next };
        self.head.set(next);
        self.len.set(self.len.get() - 1);
        Some(head.cast())
    }

    /// Pushes a chunk back as the new head
    ///
    /// # Safety
    /// `chunk` must be an aligned chunk of the region this list was built
    /// over, currently handed out and not already on the list.
    pub(crate) unsafe fn push(&self, chunk: NonNull<u8>) {
        let node = chunk.cast::<FreeChunk>();
        // SAFETY: guaranteed by the caller contract.
        unsafe {
            node.as_ptr().write(FreeChunk {
                next: self.head.get(),
            });
        }
        self.head.set(Some(node));
        self.len.set(self.len.get() + 1);
    }

    /// Forgets every node, used when the backing region is released
    pub(crate) fn clear(&self) {
        self.head.set(None);
        self.len.set(0);
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len.get()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.get().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::AllocatorKind;
    use crate::core::buffer::Buffer;

    #[test]
    fn pops_in_address_order_then_reuses_last_pushed() {
        let buffer = Buffer::new(4 * 16).unwrap();
        let base = buffer.base(AllocatorKind::FixedPool).unwrap();
        let list = FreeList::new();
        // SAFETY: the buffer holds four 16-byte chunks.
        unsafe { list.rebuild(base, 16, 4) };
        assert_eq!(list.len(), 4);

        let first = list.pop().unwrap();
        let second = list.pop().unwrap();
        assert_eq!(first, base);
        // SAFETY: second chunk starts 16 bytes in.
        assert_eq!(second, unsafe { base.add(16) });

        // SAFETY: first was popped from this list.
        unsafe { list.push(first) };
        assert_eq!(list.pop(), Some(first));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn empty_after_draining() {
        let buffer = Buffer::new(2 * 16).unwrap();
        let base = buffer.base(AllocatorKind::FixedPool).unwrap();
        let list = FreeList::new();
        // SAFETY: two 16-byte chunks.
        unsafe { list.rebuild(base, 16, 2) };
        assert!(list.pop().is_some());
        assert!(list.pop().is_some());
        assert!(list.pop().is_none());
        assert!(list.is_empty());
        list.clear();
        assert_eq!(list.len(), 0);
    }
}
