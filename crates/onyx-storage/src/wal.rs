//! Write-ahead-log seam.
//!
//! Durability is handled outside the core storage primitives; the buffer
//! pool only carries an opaque [`LogManager`] handle so that WAL hooks can
//! be threaded through later without changing its signature.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Log sequence number.
pub type Lsn = u64;

/// Opaque handle to the write-ahead log.
///
/// The buffer pool stores this but never drives it; it only hands out
/// monotonic LSNs for components that stamp pages.
#[derive(Debug, Default)]
pub struct LogManager {
    next_lsn: AtomicU64,
    enabled: AtomicBool,
}

impl LogManager {
    /// Creates a new log manager with logging disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next LSN and advances the counter.
    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns true if logging is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enables or disables logging.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}
