//! Stack allocator for LIFO (Last In, First Out) memory management
//!
//! ## Modules
//! - `allocator` - Main `StackAllocator` implementation with per-block headers
//! - `config` - Configuration variants (production, debug)
//! - `marker` - Position markers and RAII scopes for batch release

mod allocator;
mod config;
mod marker;

pub use allocator::{FRAME_HEADER_SIZE, StackAllocator};
pub use config::StackConfig;
pub use marker::{StackMarker, StackScope};
