//! Allocator contract
//!
//! # Safety
//!
//! - [`Allocator`] is an `unsafe trait`: implementors promise that a block
//!   returned from `allocate`/`reallocate` is valid for reads and writes of
//!   `count * element_size` bytes and aligned to
//!   [`element_align(element_size)`](crate::utils::element_align)
//! - `reallocate` and `free` are `unsafe fn` because a strategy may read
//!   bookkeeping stored next to the block; callers must pass a live block
//!   produced by the same instance
//! - Typed helpers on [`AllocatorExt`] only hand out initialised slices

use core::ptr::NonNull;
use std::rc::Rc;

use super::AllocatorKind;
use crate::core::{AllocatorId, Identity};
use crate::error::{AllocError, AllocResult};
use crate::utils::MAX_ALIGN;

#[cfg(feature = "logging")]
use tracing::error;

/// The three-operation capability every strategy implements
///
/// Byte size of a request is `count * element_size`; both factors must be
/// non-zero. `zero_fill` asks for newly exposed bytes to read as zero.
///
/// # Safety
///
/// Implementors must return blocks that are valid, correctly aligned and
/// disjoint from every other live block of the same instance.
pub unsafe trait Allocator {
    /// Allocates a block for `count` elements of `element_size` bytes
    fn allocate(
        &self,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>>;

    /// Resizes `block` to `count` elements of `element_size` bytes
    ///
    /// On success the returned block replaces `block`, which must no longer
    /// be used if the address changed. On failure `block` stays valid.
    ///
    /// # Safety
    /// `block` must be a live block issued by this instance.
    unsafe fn reallocate(
        &self,
        block: NonNull<u8>,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>>;

    /// Returns `block` to the allocator
    ///
    /// # Safety
    /// `block` must be a live block issued by this instance.
    unsafe fn free(&self, block: NonNull<u8>) -> AllocResult<()>;

    /// Strategy behind this instance
    fn kind(&self) -> AllocatorKind;

    /// Identity cell written by the registry
    fn identity(&self) -> &Identity;

    /// Registry id, `None` when the instance is not cached
    fn id(&self) -> Option<AllocatorId> {
        self.identity().get()
    }

    /// Tears the allocator down; later operations fail with a disposed error
    fn dispose(&self) -> AllocResult<()> {
        Ok(())
    }

    /// Whether [`dispose`](Allocator::dispose) already ran
    fn is_disposed(&self) -> bool {
        false
    }
}

/// Allocators that can report the size of a live block
pub trait BlockSize {
    /// Size in bytes the allocator accounts for `block`, if known
    ///
    /// # Safety
    /// `block` must be a live block issued by this instance.
    unsafe fn block_size(&self, block: NonNull<u8>) -> Option<usize>;
}

/// Typed helpers for any [`Allocator`]
pub trait AllocatorExt: Allocator {
    /// Allocates room for `count` values of `T`
    fn allocate_array<T>(&self, count: usize, zero_fill: bool) -> AllocResult<NonNull<T>> {
        check_element::<T>()?;
        self.allocate(count, size_of::<T>(), zero_fill)
            .map(NonNull::cast)
    }

    /// Resizes an array block to `count` values of `T`
    ///
    /// # Safety
    /// `block` must be a live block issued by this instance.
    unsafe fn reallocate_array<T>(
        &self,
        block: NonNull<T>,
        count: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<T>> {
        check_element::<T>()?;
        // SAFETY: forwarded contract.
        unsafe { self.reallocate(block.cast(), count, size_of::<T>(), zero_fill) }
            .map(NonNull::cast)
    }

    /// Frees an array block
    ///
    /// # Safety
    /// `block` must be a live block issued by this instance.
    unsafe fn free_array<T>(&self, block: NonNull<T>) -> AllocResult<()> {
        // SAFETY: forwarded contract.
        unsafe { self.free(block.cast()) }
    }

    /// Runs `f` over a scratch slice of `count` default values
    ///
    /// The block is freed when `f` returns, and also when it panics.
    fn borrow<T, R>(&self, count: usize, f: impl FnOnce(&mut [T]) -> R) -> AllocResult<R>
    where
        T: Copy + Default,
    {
        let block = self.allocate_array::<T>(count, false)?;
        let mut guard = FreeOnDrop {
            allocator: self,
            block: Some(block.cast()),
        };

        for index in 0..count {
            // SAFETY: the block holds `count` properly aligned slots for T.
            unsafe { block.as_ptr().add(index).write(T::default()) };
        }
        // SAFETY: every slot was initialised above and the block is
        // exclusively borrowed for the duration of `f`.
        let slice = unsafe { core::slice::from_raw_parts_mut(block.as_ptr(), count) };
        let result = f(slice);

        if let Some(block) = guard.block.take() {
            // SAFETY: block came from this allocator and is still live.
            unsafe { self.free(block) }?;
        }
        Ok(result)
    }
}

impl<A: Allocator + ?Sized> AllocatorExt for A {}

fn check_element<T>() -> AllocResult<()> {
    if align_of::<T>() > MAX_ALIGN {
        return Err(AllocError::invalid_argument(format!(
            "alignment {} exceeds the supported maximum of {MAX_ALIGN}",
            align_of::<T>()
        )));
    }
    Ok(())
}

/// Frees a scratch block if [`AllocatorExt::borrow`] unwinds
struct FreeOnDrop<'a, A: Allocator + ?Sized> {
    allocator: &'a A,
    block: Option<NonNull<u8>>,
}

impl<A: Allocator + ?Sized> Drop for FreeOnDrop<'_, A> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            // SAFETY: block came from this allocator and is still live.
            if let Err(_err) = unsafe { self.allocator.free(block) } {
                #[cfg(feature = "logging")]
                error!(error = %_err, "failed to free scratch block while unwinding");
            }
        }
    }
}

// ============================================================================
// Forwarding implementations
// ============================================================================

macro_rules! forward_allocator {
    ($($dispose:ident)?) => {
        fn allocate(
            &self,
            count: usize,
            element_size: usize,
            zero_fill: bool,
        ) -> AllocResult<NonNull<u8>> {
            (**self).allocate(count, element_size, zero_fill)
        }

        unsafe fn reallocate(
            &self,
            block: NonNull<u8>,
            count: usize,
            element_size: usize,
            zero_fill: bool,
        ) -> AllocResult<NonNull<u8>> {
            // SAFETY: forwarded contract.
            unsafe { (**self).reallocate(block, count, element_size, zero_fill) }
        }

        unsafe fn free(&self, block: NonNull<u8>) -> AllocResult<()> {
            // SAFETY: forwarded contract.
            unsafe { (**self).free(block) }
        }

        fn kind(&self) -> AllocatorKind {
            (**self).kind()
        }

        fn identity(&self) -> &Identity {
            (**self).identity()
        }

        fn is_disposed(&self) -> bool {
            (**self).is_disposed()
        }

        $(
            fn $dispose(&self) -> AllocResult<()> {
                (**self).dispose()
            }
        )?
    };
}

// Borrowed and shared handles never tear down the allocator they point at.

// SAFETY: every operation forwards to the referenced allocator.
unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    forward_allocator!();
}

// SAFETY: every operation forwards to the shared allocator.
unsafe impl<A: Allocator + ?Sized> Allocator for Rc<A> {
    forward_allocator!();
}

// SAFETY: every operation forwards to the owned allocator.
unsafe impl<A: Allocator + ?Sized> Allocator for Box<A> {
    forward_allocator!(dispose);
}

impl<A: BlockSize + ?Sized> BlockSize for &A {
    unsafe fn block_size(&self, block: NonNull<u8>) -> Option<usize> {
        // SAFETY: forwarded contract.
        unsafe { (**self).block_size(block) }
    }
}

impl<A: BlockSize + ?Sized> BlockSize for Rc<A> {
    unsafe fn block_size(&self, block: NonNull<u8>) -> Option<usize> {
        // SAFETY: forwarded contract.
        unsafe { (**self).block_size(block) }
    }
}

impl<A: BlockSize + ?Sized> BlockSize for Box<A> {
    unsafe fn block_size(&self, block: NonNull<u8>) -> Option<usize> {
        // SAFETY: forwarded contract.
        unsafe { (**self).block_size(block) }
    }
}
