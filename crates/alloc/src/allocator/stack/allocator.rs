//! Main stack allocator implementation
//!
//! # Safety
//!
//! This module implements a LIFO allocator with a header in front of every
//! block:
//! - The header records the payload size, the offset of the previous top
//!   header, and the top offset before the block was pushed
//! - Headers are read and written unaligned, so payload alignment never
//!   constrains header placement
//! - Only the block whose header is the current top may grow or be freed
//!
//! ## Invariants
//!
//! - `top` never exceeds the buffer length
//! - Following `previous` links from the top header visits every live frame
//!   in reverse allocation order
//! - A header is only read after its payload offset was checked against the
//!   buffer range

use core::cell::Cell;
use core::ptr::{self, NonNull};

use super::{StackConfig, StackMarker};
use crate::allocator::{Allocator, AllocatorKind, BlockSize};
use crate::core::buffer::Buffer;
use crate::core::{Identity, MemoryUsage, Resettable};
use crate::error::{AllocError, AllocResult};
use crate::utils::{byte_size, checked_align_up, element_align};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

const KIND: AllocatorKind = AllocatorKind::Stack;

/// Header stored in front of every stack block
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    /// Payload size in bytes
    size: usize,
    /// Offset of the previous top header, [`NO_FRAME`] for the bottom frame
    previous: usize,
    /// Top offset before this frame was pushed
    base: usize,
}

/// Bytes occupied by a frame header
pub const FRAME_HEADER_SIZE: usize = size_of::<FrameHeader>();

const NO_FRAME: usize = usize::MAX;

/// Stack allocator that supports LIFO allocation and deallocation
///
/// # Memory Layout
/// ```text
/// [header|block1][header|block2][header|block3]----[top]----[free]----[end]
///                                ^ top header
/// ```
///
/// Deallocations must happen in reverse order: block3, then block2, then block1.
pub struct StackAllocator {
    buffer: Buffer,
    top: Cell<usize>,
    top_header: Cell<Option<usize>>,
    frames: Cell<usize>,
    config: StackConfig,
    identity: Identity,
}

impl StackAllocator {
    /// Creates a new stack allocator with `capacity` bytes
    pub fn new(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, StackConfig::default())
    }

    /// Creates a new stack allocator with custom configuration
    pub fn with_config(capacity: usize, config: StackConfig) -> AllocResult<Self> {
        if capacity <= FRAME_HEADER_SIZE {
            return Err(AllocError::invalid_argument(format!(
                "stack capacity must exceed the {FRAME_HEADER_SIZE}-byte frame header"
            )));
        }
        let buffer = Buffer::new(capacity)?;

        #[cfg(feature = "logging")]
        debug!(capacity, "stack allocator created");

        Ok(Self {
            buffer,
            top: Cell::new(0),
            top_header: Cell::new(None),
            frames: Cell::new(0),
            config,
            identity: Identity::new(),
        })
    }

    /// Creates a stack allocator with production config
    pub fn production(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, StackConfig::production())
    }

    /// Creates a stack allocator with debug config
    pub fn debug(capacity: usize) -> AllocResult<Self> {
        Self::with_config(capacity, StackConfig::debug())
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes in use, headers and padding included
    pub fn used(&self) -> usize {
        self.top.get()
    }

    /// Number of live blocks
    pub fn frame_count(&self) -> usize {
        self.frames.get()
    }

    /// Checks if a pointer belongs to this stack
    pub fn contains(&self, block: NonNull<u8>) -> bool {
        self.buffer.contains(block)
    }

    /// Payload size recorded for a block, `None` if the block is not owned
    ///
    /// # Safety
    /// `block` must be a live block of this allocator.
    pub unsafe fn size_of(&self, block: NonNull<u8>) -> Option<usize> {
        let base = self.buffer.get()?;
        let offset = self.payload_offset(block).ok()?;
        // SAFETY: payload_offset checked the header lies inside the buffer.
        Some(unsafe { Self::read_header(base, offset - FRAME_HEADER_SIZE) }.size)
    }

    /// Payload address of the current top block
    pub fn top_block(&self) -> Option<NonNull<u8>> {
        let base = self.buffer.get()?;
        let header = self.top_header.get()?;
        // SAFETY: a live header is followed by its payload inside the buffer.
        Some(unsafe { base.add(header + FRAME_HEADER_SIZE) })
    }

    /// Returns the current position for a later [`rewind`](Self::rewind)
    pub fn mark(&self) -> StackMarker {
        StackMarker {
            top: self.top.get(),
            top_header: self.top_header.get(),
            frames: self.frames.get(),
        }
    }

    /// Pops every block allocated after `marker` was taken
    ///
    /// A marker whose frame was popped and replaced since it was taken is
    /// rejected with an invalid-argument error.
    ///
    /// # Safety
    /// Blocks above the marker become invalid; none of them may be used
    /// afterwards.
    pub unsafe fn rewind(&self, marker: StackMarker) -> AllocResult<()> {
        let base = self.buffer.base(KIND)?;
        if marker.top > self.top.get() || marker.frames > self.frames.get() {
            return Err(AllocError::invalid_argument(
                "stack marker lies above the current top",
            ));
        }

        // Walk the live chain down to the marker's depth; the frame found
        // there must be the one the marker recorded.
        let mut header_offset = self.top_header.get();
        for _ in marker.frames..self.frames.get() {
            let Some(offset) = header_offset else { break };
            // SAFETY: offsets on the live chain always hold a header.
            let previous = unsafe { Self::read_header(base, offset) }.previous;
            header_offset = (previous != NO_FRAME).then_some(previous);
        }
        let frame_end = header_offset.map_or(0, |offset| {
            // SAFETY: as above.
            let header = unsafe { Self::read_header(base, offset) };
            offset + FRAME_HEADER_SIZE + header.size
        });
        if header_offset != marker.top_header || frame_end != marker.top {
            return Err(AllocError::invalid_argument(
                "stack marker is stale: its frame was popped since it was taken",
            ));
        }

        #[cfg(feature = "logging")]
        trace!(
            released = self.frames.get() - marker.frames,
            "stack rewound to marker"
        );

        self.top.set(marker.top);
        self.top_header.set(marker.top_header);
        self.frames.set(marker.frames);
        Ok(())
    }

    /// Offset of `block` inside the buffer, provided it can carry a header
    fn payload_offset(&self, block: NonNull<u8>) -> AllocResult<usize> {
        match self.buffer.offset_of(block) {
            Some(offset) if offset >= FRAME_HEADER_SIZE => Ok(offset),
            _ => Err(AllocError::not_owned(KIND, block.as_ptr())),
        }
    }

    /// Address of the current top payload, zero when the stack is empty
    fn expected_address(&self) -> usize {
        self.top_block().map_or(0, |block| block.as_ptr().addr())
    }

    /// # Safety
    /// `offset..offset + FRAME_HEADER_SIZE` must lie inside the live buffer at `base`.
    unsafe fn read_header(base: NonNull<u8>, offset: usize) -> FrameHeader {
        // SAFETY: range checked by the caller; headers are stored unaligned
        // and every bit pattern is a valid FrameHeader.
        unsafe { ptr::read_unaligned(base.add(offset).cast::<FrameHeader>().as_ptr()) }
    }

    /// # Safety
    /// Same as [`read_header`](Self::read_header).
    unsafe fn write_header(base: NonNull<u8>, offset: usize, header: FrameHeader) {
        // SAFETY: range checked by the caller.
        unsafe { ptr::write_unaligned(base.add(offset).cast::<FrameHeader>().as_ptr(), header) };
    }

    /// Moves the top frame so its payload is `align`-aligned, resized to `bytes`
    ///
    /// The frame keeps its base, so the header and payload only shift
    /// upwards inside the space the frame already starts at.
    ///
    /// # Safety
    /// `block` must be the live top payload and `header` its header.
    unsafe fn realign_top(
        &self,
        base: NonNull<u8>,
        block: NonNull<u8>,
        header: FrameHeader,
        bytes: usize,
        align: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        let payload = header
            .base
            .checked_add(FRAME_HEADER_SIZE)
            .and_then(|offset| checked_align_up(offset, align));
        let end = payload.and_then(|payload| payload.checked_add(bytes));
        let (payload, end) = match (payload, end) {
            (Some(payload), Some(end)) if end <= self.capacity() => (payload, end),
            _ => {
                return Err(AllocError::out_of_memory(
                    KIND,
                    bytes,
                    self.capacity() - header.base,
                ));
            }
        };

        let kept = header.size.min(bytes);
        // SAFETY: payload + bytes <= capacity.
        let moved = unsafe { base.add(payload) };
        // SAFETY: both ranges lie inside the buffer; ptr::copy allows overlap.
        unsafe { ptr::copy(block.as_ptr(), moved.as_ptr(), kept) };
        if bytes > kept {
            // SAFETY: the tail lies inside the moved payload.
            let tail = unsafe { moved.add(kept) };
            let pattern = if zero_fill { Some(0) } else { self.config.alloc_pattern };
            self.fill(tail, bytes - kept, pattern);
        }

        let header_offset = payload - FRAME_HEADER_SIZE;
        // SAFETY: the header sits between the frame base and the moved
        // payload, after the contents were copied out of its way.
        unsafe {
            Self::write_header(
                base,
                header_offset,
                FrameHeader {
                    size: bytes,
                    ..header
                },
            );
        }
        self.top.set(end);
        self.top_header.set(Some(header_offset));

        #[cfg(feature = "logging")]
        trace!(bytes, payload, align, "stack top realigned");

        Ok(moved)
    }

    fn fill(&self, block: NonNull<u8>, len: usize, pattern: Option<u8>) {
        if let Some(byte) = pattern {
            // SAFETY: block..block + len is a payload range inside the buffer.
            unsafe { ptr::write_bytes(block.as_ptr(), byte, len) };
        }
    }
}

// SAFETY: payloads are disjoint ranges above their headers, aligned to
// element_align(element_size) within a MAX_ALIGN-aligned buffer.
unsafe impl Allocator for StackAllocator {
    fn allocate(
        &self,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        let base = self.buffer.base(KIND)?;
        let bytes = byte_size(count, element_size)?;
        let top = self.top.get();

        let payload = top
            .checked_add(FRAME_HEADER_SIZE)
            .and_then(|offset| checked_align_up(offset, element_align(element_size)));
        let end = payload.and_then(|payload| payload.checked_add(bytes));
        let (payload, end) = match (payload, end) {
            (Some(payload), Some(end)) if end <= self.capacity() => (payload, end),
            _ => {
                return Err(AllocError::out_of_memory(
                    KIND,
                    bytes,
                    self.capacity() - top,
                ));
            }
        };

        let header_offset = payload - FRAME_HEADER_SIZE;
        let header = FrameHeader {
            size: bytes,
            previous: self.top_header.get().unwrap_or(NO_FRAME),
            base: top,
        };
        // SAFETY: header_offset + FRAME_HEADER_SIZE == payload <= end <= capacity.
        unsafe { Self::write_header(base, header_offset, header) };

        self.top.set(end);
        self.top_header.set(Some(header_offset));
        self.frames.set(self.frames.get() + 1);

        // SAFETY: payload + bytes == end <= capacity.
        let block = unsafe { base.add(payload) };
        let pattern = if zero_fill { Some(0) } else { self.config.alloc_pattern };
        self.fill(block, bytes, pattern);

        #[cfg(feature = "logging")]
        trace!(bytes, payload, frames = self.frames.get(), "stack push");

        Ok(block)
    }

    unsafe fn reallocate(
        &self,
        block: NonNull<u8>,
        count: usize,
        element_size: usize,
        zero_fill: bool,
    ) -> AllocResult<NonNull<u8>> {
        let base = self.buffer.base(KIND)?;
        let bytes = byte_size(count, element_size)?;
        let payload = self.payload_offset(block)?;
        let header_offset = payload - FRAME_HEADER_SIZE;
        // SAFETY: the header range precedes an owned payload offset.
        let mut header = unsafe { Self::read_header(base, header_offset) };
        let align = element_align(element_size);
        let aligned = payload % align == 0;

        if aligned && bytes <= header.size {
            return Ok(block);
        }

        if self.top_header.get() != Some(header_offset) {
            if !aligned {
                return Err(AllocError::invalid_argument(format!(
                    "block {:#x} is not {align}-byte aligned and lies below the stack top",
                    block.as_ptr().addr()
                )));
            }
            return Err(AllocError::usage_order(
                "reallocate",
                self.expected_address(),
                block.as_ptr().addr(),
            ));
        }

        if !aligned {
            // SAFETY: block is the live top payload described by `header`.
            return unsafe { self.realign_top(base, block, header, bytes, align, zero_fill) };
        }

        let end = payload
            .checked_add(bytes)
            .filter(|&end| end <= self.capacity())
            .ok_or_else(|| {
                AllocError::out_of_memory(KIND, bytes - header.size, self.capacity() - self.top.get())
            })?;

        // SAFETY: the grown tail lies between the old and new end of the top block.
        let tail = unsafe { block.add(header.size) };
        let pattern = if zero_fill { Some(0) } else { self.config.alloc_pattern };
        self.fill(tail, bytes - header.size, pattern);

        header.size = bytes;
        // SAFETY: same header range as above.
        unsafe { Self::write_header(base, header_offset, header) };
        self.top.set(end);
        Ok(block)
    }

    unsafe fn free(&self, block: NonNull<u8>) -> AllocResult<()> {
        let base = self.buffer.base(KIND)?;
        let payload = self.payload_offset(block)?;
        let header_offset = payload - FRAME_HEADER_SIZE;
        if self.top_header.get() != Some(header_offset) {
            return Err(AllocError::usage_order(
                "free",
                self.expected_address(),
                block.as_ptr().addr(),
            ));
        }

        // SAFETY: the top header is live and inside the buffer.
        let header = unsafe { Self::read_header(base, header_offset) };
        self.fill(block, header.size, self.config.dealloc_pattern);

        self.top.set(header.base);
        self.top_header
            .set((header.previous != NO_FRAME).then_some(header.previous));
        self.frames.set(self.frames.get() - 1);

        #[cfg(feature = "logging")]
        trace!(bytes = header.size, frames = self.frames.get(), "stack pop");

        Ok(())
    }

    fn kind(&self) -> AllocatorKind {
        KIND
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn dispose(&self) -> AllocResult<()> {
        if self.buffer.release() {
            #[cfg(feature = "logging")]
            debug!(live_frames = self.frames.get(), "stack allocator disposed");

            self.top.set(0);
            self.top_header.set(None);
            self.frames.set(0);
        }
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.buffer.is_released()
    }
}

impl BlockSize for StackAllocator {
    unsafe fn block_size(&self, block: NonNull<u8>) -> Option<usize> {
        // SAFETY: forwarded contract.
        unsafe { self.size_of(block) }
    }
}

impl MemoryUsage for StackAllocator {
    fn used_memory(&self) -> usize {
        self.used()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(if self.is_disposed() {
            0
        } else {
            self.capacity() - self.used()
        })
    }
}

impl Resettable for StackAllocator {
    unsafe fn reset(&self) {
        self.top.set(0);
        self.top_header.set(None);
        self.frames.set(0);
    }
}

impl core::fmt::Debug for StackAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StackAllocator")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("frames", &self.frame_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
