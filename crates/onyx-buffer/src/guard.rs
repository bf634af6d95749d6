//! Scoped pin holders for buffer pool pages.
//!
//! Guards release their pin on every exit path. The read and write
//! variants additionally hold the frame's data latch for their whole
//! lifetime, so the buffer cannot change (or be observed mid-change)
//! while the guard is alive.

use crate::frame::BufferFrame;
use crate::pool::BufferPoolManager;
use onyx_common::page::{PageId, PAGE_SIZE};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

/// Holds a pin on a page; unpins on drop.
pub struct BasicPageGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame: &'a BufferFrame,
    page_id: PageId,
    is_dirty: bool,
}

impl<'a> BasicPageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, frame: &'a BufferFrame) -> Self {
        Self {
            bpm,
            frame,
            page_id,
            is_dirty: false,
        }
    }

    /// Returns the guarded page's ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Takes the frame's shared latch and returns the page data.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }

    /// Takes the frame's exclusive latch and returns the page data for
    /// mutation. The page is unpinned dirty.
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.is_dirty = true;
        self.frame.write_data()
    }
}

impl Drop for BasicPageGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page_id, self.is_dirty);
    }
}

/// Holds a pin plus the frame's shared latch; both released on drop.
///
/// Field order matters: the latch is released before the pin.
pub struct ReadPageGuard<'a> {
    data: RwLockReadGuard<'a, Box<[u8; PAGE_SIZE]>>,
    guard: BasicPageGuard<'a>,
}

impl<'a> ReadPageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, frame: &'a BufferFrame) -> Self {
        Self {
            data: frame.read_data(),
            guard: BasicPageGuard::new(bpm, page_id, frame),
        }
    }

    /// Returns the guarded page's ID.
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Returns the page data.
    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    /// Releases the latch but keeps the pin.
    pub fn into_basic(self) -> BasicPageGuard<'a> {
        let ReadPageGuard { data, guard } = self;
        drop(data);
        guard
    }
}

/// Holds a pin plus the frame's exclusive latch; both released on drop.
///
/// Mutating the data marks the page dirty, recorded at unpin.
pub struct WritePageGuard<'a> {
    data: RwLockWriteGuard<'a, Box<[u8; PAGE_SIZE]>>,
    guard: BasicPageGuard<'a>,
}

impl<'a> WritePageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, frame: &'a BufferFrame) -> Self {
        Self {
            data: frame.write_data(),
            guard: BasicPageGuard::new(bpm, page_id, frame),
        }
    }

    /// Returns the guarded page's ID.
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Returns the page data.
    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    /// Returns the page data for mutation and marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.guard.is_dirty = true;
        &mut self.data[..]
    }
}
