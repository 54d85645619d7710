//! Standalone error types for nebula-alloc
//!
//! Uses thiserror for clean, idiomatic Rust error definitions. Every variant
//! belongs to one [`ErrorKind`]; the usage-order, leak and disposed kinds are
//! fatal and point at a programming bug rather than a runtime condition.

use thiserror::Error;

use crate::allocator::AllocatorKind;

#[cfg(feature = "logging")]
use tracing::{error, warn};

// ============================================================================
// Error categories
// ============================================================================

/// Broad failure category of an [`AllocError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad count or size, or a block the allocator does not own
    InvalidArgument,
    /// The strategy or the heap backend has no room left
    OutOfMemory,
    /// Stack reallocate/free on a block other than the top one
    UsageOrder,
    /// Outstanding bytes at teardown
    Leak,
    /// Operation on a torn-down allocator
    Disposed,
}

impl ErrorKind {
    /// Fatal kinds are bugs in the caller, never conditions to retry.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::UsageOrder | Self::Leak | Self::Disposed)
    }
}

// ============================================================================
// Main Error Type
// ============================================================================

/// Allocation errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    // --- Argument Errors ---
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Size overflow: {count} elements of {element_size} bytes")]
    SizeOverflow { count: usize, element_size: usize },

    #[error("Block {address:#x} is not owned by this {allocator} allocator")]
    NotOwned {
        allocator: AllocatorKind,
        address: usize,
    },

    #[error("Invalid pointer {address:#x}: rejected by the heap backend")]
    InvalidPointer { address: usize },

    // --- Capacity Errors ---
    #[error("{allocator} allocator out of memory: requested {requested} bytes, available {available}")]
    OutOfMemory {
        allocator: AllocatorKind,
        requested: usize,
        available: usize,
    },

    #[error("Heap backend refused a request for {requested} bytes")]
    HeapRefused { requested: usize },

    // --- Fatal Errors ---
    #[error(
        "Stack {operation} out of LIFO order: the top block is {expected:#x} but {given:#x} was given"
    )]
    UsageOrder {
        operation: &'static str,
        expected: usize,
        given: usize,
    },

    #[error("Memory leak detected: {bytes} bytes outstanding")]
    Leak { bytes: isize },

    #[error("{allocator} allocator used after disposal")]
    Disposed { allocator: AllocatorKind },
}

impl AllocError {
    /// Category of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. }
            | Self::SizeOverflow { .. }
            | Self::NotOwned { .. }
            | Self::InvalidPointer { .. } => ErrorKind::InvalidArgument,
            Self::OutOfMemory { .. } | Self::HeapRefused { .. } => ErrorKind::OutOfMemory,
            Self::UsageOrder { .. } => ErrorKind::UsageOrder,
            Self::Leak { .. } => ErrorKind::Leak,
            Self::Disposed { .. } => ErrorKind::Disposed,
        }
    }

    /// Check if error indicates a programming bug
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    /// Check if error is an out-of-memory condition
    #[must_use]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self.kind(), ErrorKind::OutOfMemory)
    }

    /// Get error code for categorization
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "ALLOC:ARG:INVALID",
            Self::SizeOverflow { .. } => "ALLOC:ARG:OVERFLOW",
            Self::NotOwned { .. } => "ALLOC:ARG:NOT_OWNED",
            Self::InvalidPointer { .. } => "ALLOC:ARG:POINTER",
            Self::OutOfMemory { .. } => "ALLOC:OOM",
            Self::HeapRefused { .. } => "ALLOC:OOM:HEAP",
            Self::UsageOrder { .. } => "ALLOC:ORDER",
            Self::Leak { .. } => "ALLOC:LEAK",
            Self::Disposed { .. } => "ALLOC:DISPOSED",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create size overflow error
    pub const fn size_overflow(count: usize, element_size: usize) -> Self {
        Self::SizeOverflow {
            count,
            element_size,
        }
    }

    /// Create not-owned error for a block handed to the wrong allocator
    pub fn not_owned(allocator: AllocatorKind, block: *const u8) -> Self {
        Self::NotOwned {
            allocator,
            address: block.addr(),
        }
    }

    /// Create invalid pointer error
    pub fn invalid_pointer(block: *const u8) -> Self {
        Self::InvalidPointer {
            address: block.addr(),
        }
    }

    /// Create out of memory error
    pub fn out_of_memory(allocator: AllocatorKind, requested: usize, available: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(
            %allocator,
            requested, available, "allocator out of memory"
        );

        Self::OutOfMemory {
            allocator,
            requested,
            available,
        }
    }

    /// Create heap refusal error
    pub fn heap_refused(requested: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(requested, "heap backend refused allocation");

        Self::HeapRefused { requested }
    }

    /// Create usage order error
    pub fn usage_order(operation: &'static str, expected: usize, given: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(
            operation,
            expected = format_args!("{expected:#x}"),
            given = format_args!("{given:#x}"),
            "stack operation out of LIFO order"
        );

        Self::UsageOrder {
            operation,
            expected,
            given,
        }
    }

    /// Create memory leak error
    pub fn leak(bytes: isize) -> Self {
        #[cfg(feature = "logging")]
        error!(bytes, "memory leak detected");

        Self::Leak { bytes }
    }

    /// Create disposed-instance error
    pub fn disposed(allocator: AllocatorKind) -> Self {
        #[cfg(feature = "logging")]
        error!(%allocator, "allocator used after disposal");

        Self::Disposed { allocator }
    }
}

// ============================================================================
// Result Type Aliases
// ============================================================================

/// Result type for allocator operations
pub type AllocResult<T> = core::result::Result<T, AllocError>;

/// Short alias used throughout the crate
pub type Result<T> = AllocResult<T>;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn kinds_map_onto_taxonomy() {
        assert_eq!(
            AllocError::invalid_argument("count").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            AllocError::size_overflow(usize::MAX, 2).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            AllocError::heap_refused(64).kind(),
            ErrorKind::OutOfMemory
        );
        assert_eq!(
            AllocError::out_of_memory(AllocatorKind::Arena, 10, 2).kind(),
            ErrorKind::OutOfMemory
        );
        assert_eq!(
            AllocError::usage_order("free", 0x10, 0x20).kind(),
            ErrorKind::UsageOrder
        );
        assert_eq!(AllocError::leak(8).kind(), ErrorKind::Leak);
        assert_eq!(
            AllocError::disposed(AllocatorKind::Stack).kind(),
            ErrorKind::Disposed
        );
    }

    #[test]
    fn only_misuse_is_fatal() {
        assert!(!AllocError::invalid_argument("x").is_fatal());
        assert!(!AllocError::out_of_memory(AllocatorKind::FixedPool, 600, 400).is_fatal());
        assert!(AllocError::usage_order("reallocate", 1, 2).is_fatal());
        assert!(AllocError::leak(-4).is_fatal());
        assert!(AllocError::disposed(AllocatorKind::Arena).is_fatal());
    }

    #[test]
    fn usage_order_names_both_addresses() {
        let err = AllocError::usage_order("free", 0x1000, 0x2040);
        let message = err.to_string();
        assert!(message.contains("0x1000"), "{message}");
        assert!(message.contains("0x2040"), "{message}");
        assert_eq!(err.code(), "ALLOC:ORDER");
    }

    #[test]
    fn out_of_memory_message_mentions_strategy() {
        let err = AllocError::out_of_memory(AllocatorKind::FixedPool, 600, 400);
        assert_eq!(
            err.to_string(),
            "fixed-pool allocator out of memory: requested 600 bytes, available 400"
        );
        assert!(err.is_out_of_memory());
    }
}
