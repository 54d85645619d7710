//! Capability traits shared by the buffer-based strategies

/// Memory usage reporting
pub trait MemoryUsage {
    /// Get currently used memory in bytes
    fn used_memory(&self) -> usize;

    /// Get available memory in bytes (if known)
    fn available_memory(&self) -> Option<usize>;

    /// Get total memory capacity in bytes (if known)
    fn total_memory(&self) -> Option<usize> {
        self.available_memory()
            .map(|available| self.used_memory() + available)
    }

    /// Returns memory usage as a percentage (0.0 to 100.0)
    ///
    /// Returns `None` if total memory is unknown.
    fn memory_usage_percent(&self) -> Option<f32> {
        self.total_memory().map(|total| {
            if total == 0 {
                0.0
            } else {
                (self.used_memory() as f32 / total as f32) * 100.0
            }
        })
    }
}

/// Allocators that can reclaim every block at once without being disposed
pub trait Resettable {
    /// Reset allocator to initial state
    ///
    /// # Safety
    /// - All blocks allocated before reset become invalid immediately
    /// - Using invalidated blocks results in undefined behavior
    unsafe fn reset(&self);
}

impl<T: MemoryUsage + ?Sized> MemoryUsage for &T {
    fn used_memory(&self) -> usize {
        (**self).used_memory()
    }

    fn available_memory(&self) -> Option<usize> {
        (**self).available_memory()
    }
}

impl<T: Resettable + ?Sized> Resettable for &T {
    unsafe fn reset(&self) {
        // SAFETY: forwarded contract.
        unsafe { (**self).reset() }
    }
}
