//! Disk-level storage for OnyxDB.
//!
//! This crate provides:
//! - Page-granular file I/O through the [`DiskManager`]
//! - The opaque [`LogManager`] seam for WAL integration

pub mod disk;
pub mod wal;

pub use disk::{DiskManager, DiskManagerConfig};
pub use wal::{LogManager, Lsn};
