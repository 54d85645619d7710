//! Stack markers and scoped release

use super::StackAllocator;

/// Marker representing a position in the stack allocator
///
/// Can be used to rewind the allocator to this position, releasing every
/// block allocated after the marker was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackMarker {
    pub(super) top: usize,
    pub(super) top_header: Option<usize>,
    pub(super) frames: usize,
}

impl StackMarker {
    /// Stack usage in bytes when the marker was taken
    pub fn position(&self) -> usize {
        self.top
    }
}

/// RAII scope that rewinds the stack when dropped
///
/// Blocks allocated through the scope must not outlive it.
pub struct StackScope<'a> {
    allocator: &'a StackAllocator,
    marker: StackMarker,
}

impl<'a> StackScope<'a> {
    /// Opens a scope at the current top
    pub fn new(allocator: &'a StackAllocator) -> Self {
        let marker = allocator.mark();
        Self { allocator, marker }
    }

    /// Gets the underlying allocator
    pub fn allocator(&self) -> &'a StackAllocator {
        self.allocator
    }
}

impl Drop for StackScope<'_> {
    fn drop(&mut self) {
        // SAFETY: blocks allocated inside the scope are documented not to
        // outlive it. A disposed allocator has nothing left to rewind.
        let _ = unsafe { self.allocator.rewind(self.marker) };
    }
}

impl StackAllocator {
    /// Opens a [`StackScope`] at the current top
    pub fn scope(&self) -> StackScope<'_> {
        StackScope::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Allocator;

    #[test]
    fn test_scope_releases_inner_blocks() {
        let stack = StackAllocator::new(512).unwrap();
        let outer = stack.allocate(4, 4, false).unwrap();
        let before = stack.mark();
        {
            let scope = stack.scope();
            scope.allocator().allocate(8, 8, false).unwrap();
            scope.allocator().allocate(8, 8, false).unwrap();
            assert_eq!(stack.frame_count(), 3);
        }
        assert_eq!(stack.mark(), before);
        assert_eq!(before.position(), stack.used());
        unsafe { stack.free(outer).unwrap() };
    }
}
