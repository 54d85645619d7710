//! Closed set of allocation strategies behind one type
//!
//! Containers that pick a strategy at runtime hold an [`AnyAllocator`]
//! instead of a trait object. Every call is a `match` on the variant.

use core::ptr::NonNull;

use super::{
    Allocator, AllocatorKind, ArenaAllocator, BlockSize, DebugAllocator, FixedPoolAllocator,
    ForwardPoolAllocator, HeapAllocator, HybridPoolAllocator, StackAllocator,
};
use crate::core::Identity;
use crate::error::AllocResult;

/// Any of the bundled allocators
///
/// Hybrid fallbacks and the debug decorator nest further `AnyAllocator`s, so
/// compositions such as "debug over hybrid over heap" are one value.
///
/// # Examples
///
/// ```
/// use nebula_alloc::allocator::{Allocator, AnyAllocator, AllocatorKind, ArenaAllocator};
///
/// let any = AnyAllocator::from(ArenaAllocator::new(256).unwrap());
/// assert_eq!(any.kind(), AllocatorKind::Arena);
/// let block = any.allocate(8, 4, true).unwrap();
/// unsafe { any.free(block).unwrap() };
/// ```
#[derive(Debug)]
pub enum AnyAllocator {
    Heap(HeapAllocator),
    Arena(ArenaAllocator),
    Stack(StackAllocator),
    FixedPool(FixedPoolAllocator),
    HybridPool(HybridPoolAllocator<Box<AnyAllocator>>),
    ForwardPool(ForwardPoolAllocator<Box<AnyAllocator>>),
    Debug(Box<DebugAllocator<AnyAllocator>>),
}

macro_rules! dispatch {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            AnyAllocator::Heap($inner) => $body,
            AnyAllocator::Arena($inner) => $body,
            AnyAllocator::Stack($inner) => $body,
            AnyAllocator::FixedPool($inner) => $body,
            AnyAllocator::HybridPool($inner) => $body,
            AnyAllocator::ForwardPool($inner) => $body,
            AnyAllocator::Debug($inner) => $body,
        }
    };
}

impl AnyAllocator {
    /// Wraps `self` in the leak-tracking decorator
    ///
    /// Arenas cannot measure their blocks, so a tracked arena refuses every
    /// allocation with an invalid-argument error.
    pub fn tracked(self) -> Self {
        Self::Debug(Box::new(DebugAllocator::new(self)))
    }
}

// SAFETY: every variant upholds the allocator contract itself.
unsafe impl Allocator for AnyAllocator {
    fn allocate(
        &self,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        dispatch!(self, inner => inner.allocate(count, element_size, zero_fill))
    }

    unsafe fn reallocate(
        &self,
        block: NonNull<u8>,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        // SAFETY: forwarded contract.
        dispatch!(self, inner => unsafe { inner.reallocate(block, count, element_size, zero_fill) })
    }

    unsafe fn free(&self, block: NonNull<u8>) -> AllocResult<()> {
        // SAFETY: forwarded contract.
        dispatch!(self, inner => unsafe { inner.free(block) })
    }

    fn kind(&self) -> AllocatorKind {
        dispatch!(self, inner => inner.kind())
    }

    fn identity(&self) -> &Identity {
        dispatch!(self, inner => inner.identity())
    }

    fn dispose(&self) -> AllocResult<()> {
        dispatch!(self, inner => inner.dispose())
    }

    fn is_disposed(&self) -> bool {
        dispatch!(self, inner => inner.is_disposed())
    }
}

impl BlockSize for AnyAllocator {
    unsafe fn block_size(&self, block: NonNull<u8>) -> Option<usize> {
        // SAFETY: forwarded contract.
        unsafe {
            match self {
                Self::Heap(inner) => inner.block_size(block),
                Self::Arena(_) => None,
                Self::Stack(inner) => inner.block_size(block),
                Self::FixedPool(inner) => inner.block_size(block),
                Self::HybridPool(inner) => inner.block_size(block),
                Self::ForwardPool(inner) => inner.block_size(block),
                Self::Debug(inner) => inner.block_size(block),
            }
        }
    }
}

impl From<HeapAllocator> for AnyAllocator {
    fn from(allocator: HeapAllocator) -> Self {
        Self::Heap(allocator)
    }
}

impl From<ArenaAllocator> for AnyAllocator {
    fn from(allocator: ArenaAllocator) -> Self {
        Self::Arena(allocator)
    }
}

impl From<StackAllocator> for AnyAllocator {
    fn from(allocator: StackAllocator) -> Self {
        Self::Stack(allocator)
    }
}

impl From<FixedPoolAllocator> for AnyAllocator {
    fn from(allocator: FixedPoolAllocator) -> Self {
        Self::FixedPool(allocator)
    }
}

impl From<HybridPoolAllocator<Box<AnyAllocator>>> for AnyAllocator {
    fn from(allocator: HybridPoolAllocator<Box<AnyAllocator>>) -> Self {
        Self::HybridPool(allocator)
    }
}

impl From<ForwardPoolAllocator<Box<AnyAllocator>>> for AnyAllocator {
    fn from(allocator: ForwardPoolAllocator<Box<AnyAllocator>>) -> Self {
        Self::ForwardPool(allocator)
    }
}

impl From<DebugAllocator<AnyAllocator>> for AnyAllocator {
    fn from(allocator: DebugAllocator<AnyAllocator>) -> Self {
        Self::Debug(Box::new(allocator))
    }
}
