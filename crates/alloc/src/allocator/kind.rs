use core::fmt;

/// Allocation strategy behind an allocator instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AllocatorKind {
    /// Process heap through a [`HeapBackend`](super::HeapBackend)
    Heap,
    /// Monotonic bump allocator
    Arena,
    /// LIFO allocator with per-block headers
    Stack,
    /// Free list of equal-size chunks
    FixedPool,
    /// Embedded chunk pool with a fallback allocator
    HybridPool,
    /// Fixed pool allocator forwarding large requests to a fallback
    ForwardPool,
    /// Leak-tracking decorator
    Debug,
}

impl AllocatorKind {
    /// Stable lowercase name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heap => "heap",
            Self::Arena => "arena",
            Self::Stack => "stack",
            Self::FixedPool => "fixed-pool",
            Self::HybridPool => "hybrid-pool",
            Self::ForwardPool => "forward-pool",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
