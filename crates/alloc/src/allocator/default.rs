//! Process-wide default allocator
//!
//! Containers that are not handed an allocator use [`default_allocator`].
//! It is the plain heap allocator, or with the `diagnostics` feature the
//! heap wrapped in a [`DebugAllocator`](super::DebugAllocator) whose counter
//! is checked when the process exits.

use std::sync::OnceLock;

use super::HeapAllocator;

/// Allocator returned by [`default_allocator`]
#[cfg(not(feature = "diagnostics"))]
pub type DefaultAllocator = HeapAllocator;

/// Allocator returned by [`default_allocator`]
#[cfg(feature = "diagnostics")]
pub type DefaultAllocator = super::DebugAllocator<HeapAllocator>;

static DEFAULT: OnceLock<DefaultAllocator> = OnceLock::new();

/// Returns the process-lifetime default allocator
pub fn default_allocator() -> &'static DefaultAllocator {
    DEFAULT.get_or_init(create)
}

#[cfg(not(feature = "diagnostics"))]
fn create() -> DefaultAllocator {
    HeapAllocator::new()
}

#[cfg(feature = "diagnostics")]
fn create() -> DefaultAllocator {
    use super::{DebugAllocator, DebugConfig};

    // SAFETY: check_at_exit is a plain extern "C" fn that only reads atomics.
    if unsafe { libc::atexit(check_at_exit) } != 0 {
        #[cfg(feature = "logging")]
        tracing::warn!("could not register the process-exit leak check");
    }

    DebugAllocator::with_config(HeapAllocator::new(), DebugConfig::production())
}

#[cfg(feature = "diagnostics")]
extern "C" fn check_at_exit() {
    let Some(allocator) = DEFAULT.get() else {
        return;
    };
    let outstanding = allocator.outstanding_bytes();
    if outstanding != 0 {
        let leak = crate::error::AllocError::leak(outstanding);
        eprintln!("nebula-alloc: {leak}");
        std::process::abort();
    }
}
