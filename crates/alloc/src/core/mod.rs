//! Building blocks shared by the allocation strategies

pub(crate) mod buffer;
pub(crate) mod free_list;
pub mod identity;
pub mod traits;

pub use identity::{AllocatorId, Identity};
pub use traits::{MemoryUsage, Resettable};
