//! Buffer pool management for OnyxDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable frame count
//! - LRU-K eviction policy with backward-distance semantics
//! - Pin counting for concurrent access
//! - Dirty page tracking with write-back on eviction
//! - Scoped page guards that release pins and latches deterministically

mod frame;
mod guard;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use guard::{BasicPageGuard, ReadPageGuard, WritePageGuard};
pub use pool::{BufferPoolConfig, BufferPoolManager};
pub use replacer::{LruKReplacer, Replacer};
