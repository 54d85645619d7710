//! Leak-tracking allocator decorator
//!
//! Wraps any allocator and keeps a signed running total of the bytes it has
//! handed out. The total must be zero when the decorator is disposed;
//! anything else is reported as a leak.
//!
//! # Safety
//!
//! - All unsafe operations are forwarded to the inner allocator with the
//!   same contracts
//! - The size-of function is only called on blocks the caller vouched for
//!
//! ## Invariants
//!
//! - Every successful allocation adds the block's size to the counter
//! - Every successful free subtracts the size measured before the free
//! - Reallocation adds the size difference between new and old block
//! - Failed operations never change the counter

use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};

use super::{Allocator, AllocatorKind, BlockSize};
use crate::core::{Identity, MemoryUsage};
use crate::error::{AllocError, AllocResult};
use crate::utils::byte_size;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

const KIND: AllocatorKind = AllocatorKind::Debug;

/// Reports the size the wrapped allocator accounts for a live block
///
/// # Safety
/// Implementations may read allocator bookkeeping next to the block, so the
/// block must be live and issued by the allocator passed alongside it.
pub type SizeOfFn<A> = unsafe fn(&A, NonNull<u8>) -> Option<usize>;

/// What a leaked decorator does when dropped without a successful dispose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakAction {
    /// Panic, failing the test or build that leaked
    Panic,
    /// Log the leak at error level and carry on
    Log,
}

/// Configuration for the debug allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugConfig {
    /// Reaction to outstanding bytes found on drop
    pub leak_action: LeakAction,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self::debug()
    }
}

impl DebugConfig {
    /// Production configuration - leaks are logged
    #[must_use]
    pub fn production() -> Self {
        Self {
            leak_action: LeakAction::Log,
        }
    }

    /// Debug configuration - leaks panic
    #[must_use]
    pub fn debug() -> Self {
        Self {
            leak_action: LeakAction::Panic,
        }
    }
}

/// Allocator decorator that detects leaks
///
/// # Examples
///
/// ```
/// use nebula_alloc::allocator::{Allocator, DebugAllocator, HeapAllocator};
///
/// let tracked = DebugAllocator::new(HeapAllocator::new());
/// let block = tracked.allocate(4, 8, false).unwrap();
/// assert_eq!(tracked.outstanding_bytes(), 32);
/// unsafe { tracked.free(block).unwrap() };
/// tracked.dispose().unwrap();
/// ```
pub struct DebugAllocator<A> {
    inner: A,
    size_of: SizeOfFn<A>,
    outstanding: AtomicIsize,
    peak: AtomicIsize,
    allocations: AtomicUsize,
    frees: AtomicUsize,
    disposed: AtomicBool,
    leak_reported: AtomicBool,
    config: DebugConfig,
    identity: Identity,
}

impl<A: BlockSize> DebugAllocator<A> {
    /// Wraps an allocator that can measure its own blocks
    pub fn new(inner: A) -> Self {
        Self::with_config(inner, DebugConfig::default())
    }

    /// Wraps an allocator with custom configuration
    pub fn with_config(inner: A, config: DebugConfig) -> Self {
        Self::from_parts(inner, <A as BlockSize>::block_size, config)
    }
}

impl<A> DebugAllocator<A> {
    /// Wraps an allocator using an external size-of function
    pub fn with_size_of(inner: A, size_of: SizeOfFn<A>) -> Self {
        Self::from_parts(inner, size_of, DebugConfig::default())
    }

    /// Wraps an allocator from all its parts
    pub fn from_parts(inner: A, size_of: SizeOfFn<A>, config: DebugConfig) -> Self {
        Self {
            inner,
            size_of,
            outstanding: AtomicIsize::new(0),
            peak: AtomicIsize::new(0),
            allocations: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            leak_reported: AtomicBool::new(false),
            config,
            identity: Identity::new(),
        }
    }

    /// Gets a reference to the underlying allocator
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Bytes allocated and not yet freed
    pub fn outstanding_bytes(&self) -> isize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Highest value the outstanding counter reached
    pub fn peak_bytes(&self) -> isize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Returns the total number of successful allocations
    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Returns the total number of successful frees
    pub fn free_count(&self) -> usize {
        self.frees.load(Ordering::Relaxed)
    }

    /// Check if any bytes are outstanding
    pub fn has_leaks(&self) -> bool {
        self.outstanding_bytes() != 0
    }

    pub fn config(&self) -> &DebugConfig {
        &self.config
    }

    fn adjust(&self, delta: isize) {
        let now = self.outstanding.fetch_add(delta, Ordering::Relaxed) + delta;
        self.peak.fetch_max(now, Ordering::Relaxed);
    }

    fn check_active(&self) -> AllocResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(AllocError::disposed(KIND))
        } else {
            Ok(())
        }
    }

    /// # Safety
    /// `block` must be live and issued by the inner allocator.
    unsafe fn measure(&self, block: NonNull<u8>) -> AllocResult<isize> {
        // SAFETY: forwarded contract.
        let size = unsafe { (self.size_of)(&self.inner, block) }.ok_or_else(|| {
            AllocError::invalid_argument("wrapped allocator cannot report the block size")
        })?;
        signed(size)
    }
}

fn signed(bytes: usize) -> AllocResult<isize> {
    isize::try_from(bytes).map_err(|_| AllocError::size_overflow(bytes, 1))
}

// SAFETY: every block is produced by the inner allocator, which upholds the
// contract; the decorator only reads sizes.
unsafe impl<A: Allocator> Allocator for DebugAllocator<A> {
    fn allocate(
        &self,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        self.check_active()?;
        byte_size(count, element_size)?;
        let block = self.inner.allocate(count, element_size, zero_fill)?;

        // A block that cannot be measured here could never be freed through
        // the decorator either, so it goes straight back.
        // SAFETY: block was just issued by the inner allocator.
        let size = match unsafe { self.measure(block) } {
            Ok(size) => size,
            Err(err) => {
                // SAFETY: block is live and has not been handed out.
                let _ = unsafe { self.inner.free(block) };
                return Err(err);
            }
        };
        self.adjust(size);
        self.allocations.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "logging")]
        trace!(size, outstanding = self.outstanding_bytes(), "debug allocate");

        Ok(block)
    }

    unsafe fn reallocate(
        &self,
        block: NonNull<u8>,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        self.check_active()?;
        let bytes = byte_size(count, element_size)?;
        // SAFETY: forwarded contract.
        let old = unsafe { self.measure(block) }?;
        // SAFETY: forwarded contract.
        let moved = unsafe {
            self.inner
                .reallocate(block, count, element_size, zero_fill)
        }?;

        // SAFETY: moved was just issued by the inner allocator.
        let new = unsafe { (self.size_of)(&self.inner, moved) }.unwrap_or(bytes);
        self.adjust(signed(new)? - old);

        #[cfg(feature = "logging")]
        trace!(old, new, outstanding = self.outstanding_bytes(), "debug reallocate");

        Ok(moved)
    }

    unsafe fn free(&self, block: NonNull<u8>) -> AllocResult<()> {
        self.check_active()?;
        // SAFETY: forwarded contract.
        let size = unsafe { self.measure(block) }?;
        // SAFETY: forwarded contract.
        unsafe { self.inner.free(block) }?;
        self.adjust(-size);
        self.frees.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn kind(&self) -> AllocatorKind {
        KIND
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn dispose(&self) -> AllocResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Ok(());
        }
        let outstanding = self.outstanding_bytes();
        if outstanding != 0 {
            self.leak_reported.store(true, Ordering::Relaxed);
            return Err(AllocError::leak(outstanding));
        }
        self.inner.dispose()?;
        self.disposed.store(true, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(
            allocations = self.allocation_count(),
            peak = self.peak_bytes(),
            "debug allocator disposed without leaks"
        );

        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl<A> BlockSize for DebugAllocator<A> {
    unsafe fn block_size(&self, block: NonNull<u8>) -> Option<usize> {
        // SAFETY: forwarded contract.
        unsafe { (self.size_of)(&self.inner, block) }
    }
}

impl<A> MemoryUsage for DebugAllocator<A> {
    fn used_memory(&self) -> usize {
        self.outstanding_bytes().max(0).unsigned_abs()
    }

    fn available_memory(&self) -> Option<usize> {
        None
    }
}

impl<A> Drop for DebugAllocator<A> {
    fn drop(&mut self) {
        let outstanding = *self.outstanding.get_mut();
        if outstanding == 0 || *self.disposed.get_mut() || *self.leak_reported.get_mut() {
            return;
        }
        let leak = AllocError::leak(outstanding);
        if self.config.leak_action == LeakAction::Panic && !std::thread::panicking() {
            panic!("{leak}");
        }
    }
}

impl<A: fmt::Debug> fmt::Debug for DebugAllocator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugAllocator")
            .field("inner", &self.inner)
            .field("outstanding", &self.outstanding_bytes())
            .field("peak", &self.peak_bytes())
            .field("disposed", &self.disposed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
