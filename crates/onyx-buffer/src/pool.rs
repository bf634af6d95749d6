//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::guard::{BasicPageGuard, ReadPageGuard, WritePageGuard};
use crate::replacer::{LruKReplacer, Replacer};
use onyx_common::page::PageId;
use onyx_common::{OnyxError, Result, StorageConfig};
use onyx_storage::{DiskManager, LogManager};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub pool_size: usize,
    /// Access-history depth for the LRU-K replacer.
    pub replacer_k: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 1024,
            replacer_k: 2,
        }
    }
}

impl From<&StorageConfig> for BufferPoolConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            pool_size: config.buffer_pool_frames,
            replacer_k: config.replacer_k,
        }
    }
}

/// Buffer pool manager.
///
/// The single point of residence for disk pages in memory. Serves pages
/// out of a fixed set of frames, pinning them on behalf of callers until
/// released, writing dirty pages back before their frame is reused, and
/// driving the LRU-K replacer to pick eviction victims.
///
/// One latch serializes every public operation, including disk I/O and
/// calls into the replacer. Frames handed out stay valid because callers
/// hold a pin; the per-frame data latch is taken separately by the
/// read/write guards.
pub struct BufferPoolManager {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Page replacement policy.
    replacer: LruKReplacer,
    /// Page table, free list, and id allocator.
    latch: Mutex<PoolInner>,
    /// Backing store for page I/O.
    disk: Arc<DiskManager>,
    /// Write-ahead-log seam; carried for later integration, never driven.
    log_manager: Option<Arc<LogManager>>,
}

struct PoolInner {
    /// Maps resident page IDs to their frame.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page.
    free_list: VecDeque<FrameId>,
    /// Next page ID to hand out. IDs are never recycled.
    next_page_id: u64,
}

impl BufferPoolManager {
    /// Creates a new buffer pool manager over the given disk manager.
    pub fn new(
        config: BufferPoolConfig,
        disk: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let pool_size = config.pool_size;

        let frames: Vec<_> = (0..pool_size).map(|i| BufferFrame::new(FrameId(i))).collect();
        let free_list: VecDeque<_> = (0..pool_size).map(FrameId).collect();

        Self {
            replacer: LruKReplacer::new(pool_size, config.replacer_k),
            config,
            frames,
            latch: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
                next_page_id: 0,
            }),
            disk,
            log_manager,
        }
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.latch.lock().free_list.len()
    }

    /// Returns the number of pages currently resident.
    pub fn page_count(&self) -> usize {
        self.latch.lock().page_table.len()
    }

    /// Returns the number of evictable frames.
    pub fn evictable_count(&self) -> usize {
        self.replacer.size()
    }

    /// Checks if a page is resident in the pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.latch.lock().page_table.contains_key(&page_id)
    }

    /// Returns the log manager handle, if one was attached.
    pub fn log_manager(&self) -> Option<&Arc<LogManager>> {
        self.log_manager.as_ref()
    }

    /// Allocates a fresh page and returns it pinned, with zeroed contents.
    ///
    /// Fails with `BufferPoolFull` when every frame is pinned.
    pub fn new_page(&self) -> Result<(PageId, &BufferFrame)> {
        let mut inner = self.latch.lock();

        let frame_id = self.acquire_frame(&mut inner)?;
        let page_id = PageId(inner.next_page_id);
        inner.next_page_id += 1;

        let frame = &self.frames[frame_id.0];
        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;

        Ok((page_id, frame))
    }

    /// Returns the pinned frame for `page_id`, loading it from disk if it
    /// is not resident.
    ///
    /// Fails with `BufferPoolFull` when the page is not resident and every
    /// frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<&BufferFrame> {
        let mut inner = self.latch.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.0];
            frame.pin();
            self.replacer.record_access(frame_id)?;
            self.replacer.set_evictable(frame_id, false)?;
            return Ok(frame);
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        let data = self.disk.read_page(page_id)?;

        let frame = &self.frames[frame_id.0];
        frame.reset();
        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;

        Ok(frame)
    }

    /// Releases one pin on `page_id`, folding `is_dirty` into the frame's
    /// dirty bit. The frame becomes evictable when its pin count reaches
    /// zero.
    ///
    /// Returns false if the page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.latch.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.0];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            if let Err(e) = self.replacer.set_evictable(frame_id, true) {
                log::warn!("unpin of page {page_id} could not release {frame_id}: {e}");
            }
        }
        true
    }

    /// Writes `page_id`'s frame to disk unconditionally and clears its
    /// dirty bit.
    ///
    /// Returns Ok(false) if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let inner = self.latch.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id.0];
        {
            let data = frame.read_data();
            self.disk.write_page(page_id, &data)?;
        }
        frame.set_dirty(false);
        Ok(true)
    }

    /// Writes every resident page to disk, clearing all dirty bits.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = self.latch.lock();

        for (&page_id, &frame_id) in inner.page_table.iter() {
            let frame = &self.frames[frame_id.0];
            {
                let data = frame.read_data();
                self.disk.write_page(page_id, &data)?;
            }
            frame.set_dirty(false);
        }
        Ok(())
    }

    /// Drops `page_id` from the pool, returning its frame to the free
    /// list. The page ID is not recycled.
    ///
    /// Returns Ok(true) if the page is gone (including when it was never
    /// resident), Ok(false) if it is pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.latch.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &self.frames[frame_id.0];
        if frame.is_pinned() {
            return Ok(false);
        }

        inner.page_table.remove(&page_id);
        self.replacer.remove(frame_id)?;
        frame.reset();
        inner.free_list.push_back(frame_id);

        Ok(true)
    }

    /// Allocates a fresh page wrapped in a guard that unpins on drop.
    pub fn new_page_guarded(&self) -> Result<BasicPageGuard<'_>> {
        let (page_id, frame) = self.new_page()?;
        Ok(BasicPageGuard::new(self, page_id, frame))
    }

    /// Fetches a page wrapped in a guard that unpins on drop.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<BasicPageGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(BasicPageGuard::new(self, page_id, frame))
    }

    /// Fetches a page and takes its shared latch for the guard's lifetime.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(ReadPageGuard::new(self, page_id, frame))
    }

    /// Fetches a page and takes its exclusive latch for the guard's
    /// lifetime.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(WritePageGuard::new(self, page_id, frame))
    }

    /// Obtains a usable frame: the free list first, then eviction.
    ///
    /// A dirty victim is written back before its page table entry is
    /// removed, so the old contents are never lost.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.replacer.evict() else {
            return Err(OnyxError::BufferPoolFull);
        };
        let frame = &self.frames[frame_id.0];
        if frame.is_pinned() {
            log::warn!("evicted {frame_id} still has pin count {}", frame.pin_count());
        }

        let old_page_id = frame.page_id();
        if frame.is_dirty() {
            let data = frame.read_data();
            self.disk.write_page(old_page_id, &data)?;
        }
        if old_page_id.is_valid() {
            inner.page_table.remove(&old_page_id);
        }

        Ok(frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onyx_common::page::PAGE_SIZE;
    use onyx_storage::DiskManagerConfig;
    use tempfile::TempDir;

    fn create_test_pool(pool_size: usize) -> (TempDir, Arc<DiskManager>, BufferPoolManager) {
        let dir = tempfile::tempdir().unwrap();
        let disk = Arc::new(
            DiskManager::new(DiskManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: false,
            })
            .unwrap(),
        );
        let pool = BufferPoolManager::new(
            BufferPoolConfig {
                pool_size,
                replacer_k: 2,
            },
            Arc::clone(&disk),
            None,
        );
        (dir, disk, pool)
    }

    #[test]
    fn test_buffer_pool_new() {
        let (_dir, _disk, pool) = create_test_pool(10);

        assert_eq!(pool.pool_size(), 10);
        assert_eq!(pool.free_count(), 10);
        assert_eq!(pool.page_count(), 0);
        assert_eq!(pool.evictable_count(), 0);
    }

    #[test]
    fn test_new_page_ids_are_monotonic() {
        let (_dir, _disk, pool) = create_test_pool(10);

        let (id0, frame0) = pool.new_page().unwrap();
        let (id1, _) = pool.new_page().unwrap();
        let (id2, _) = pool.new_page().unwrap();

        assert_eq!(id0, PageId(0));
        assert_eq!(id1, PageId(1));
        assert_eq!(id2, PageId(2));

        assert_eq!(frame0.page_id(), PageId(0));
        assert_eq!(frame0.pin_count(), 1);
        assert!(!frame0.is_dirty());
        assert!(frame0.read_data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_new_page_exhaustion_and_reuse() {
        let (_dir, _disk, pool) = create_test_pool(3);

        // Fill the pool.
        let mut frames = Vec::new();
        for i in 0..3u64 {
            let (id, frame) = pool.new_page().unwrap();
            assert_eq!(id, PageId(i));
            frames.push(frame.frame_id());
        }

        // Everything is pinned.
        assert!(matches!(pool.new_page(), Err(OnyxError::BufferPoolFull)));

        // Releasing page 1 frees exactly its frame for the next page.
        assert!(pool.unpin_page(PageId(1), false));
        let (id3, frame3) = pool.new_page().unwrap();
        assert_eq!(id3, PageId(3));
        assert_eq!(frame3.frame_id(), frames[1]);
        assert!(!pool.contains(PageId(1)));
    }

    #[test]
    fn test_fetch_resident_page_pins_again() {
        let (_dir, _disk, pool) = create_test_pool(10);

        let (page_id, _) = pool.new_page().unwrap();
        let frame = pool.fetch_page(page_id).unwrap();

        assert_eq!(frame.pin_count(), 2);
        assert!(pool.unpin_page(page_id, false));
        assert!(pool.unpin_page(page_id, false));
        assert_eq!(frame.pin_count(), 0);
        assert_eq!(pool.evictable_count(), 1);
    }

    #[test]
    fn test_dirty_eviction_writes_back_before_reload() {
        let (_dir, disk, pool) = create_test_pool(1);

        let (page_id, frame) = pool.new_page().unwrap();
        assert_eq!(page_id, PageId(0));
        {
            let mut data = frame.write_data();
            data[0] = b'X';
        }
        assert!(pool.unpin_page(page_id, true));
        assert_eq!(disk.write_count(), 0);

        // Fetching another page evicts page 0; its bytes must hit disk
        // before the new page is read in.
        let frame = pool.fetch_page(PageId(1)).unwrap();
        assert_eq!(frame.page_id(), PageId(1));
        assert_eq!(frame.pin_count(), 1);
        assert_eq!(disk.write_count(), 1);
        assert_eq!(disk.read_page(PageId(0)).unwrap()[0], b'X');
    }

    #[test]
    fn test_fetch_after_eviction_resets_pin_count() {
        let (_dir, _disk, pool) = create_test_pool(1);

        let (page_id, _) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false);

        // Evict page 0, then bring it back: exactly one pin.
        pool.fetch_page(PageId(1)).unwrap();
        pool.unpin_page(PageId(1), false);
        let frame = pool.fetch_page(page_id).unwrap();
        assert_eq!(frame.pin_count(), 1);
    }

    #[test]
    fn test_pinned_page_blocks_allocation() {
        let (_dir, _disk, pool) = create_test_pool(1);

        pool.new_page().unwrap();
        assert!(matches!(pool.new_page(), Err(OnyxError::BufferPoolFull)));
        assert!(matches!(
            pool.fetch_page(PageId(99)),
            Err(OnyxError::BufferPoolFull)
        ));
    }

    #[test]
    fn test_unpin_page_edge_cases() {
        let (_dir, _disk, pool) = create_test_pool(10);

        // Not resident.
        assert!(!pool.unpin_page(PageId(42), false));

        let (page_id, frame) = pool.new_page().unwrap();
        assert!(pool.unpin_page(page_id, false));

        // Already at zero.
        assert!(!pool.unpin_page(page_id, false));
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_unpin_dirty_bit_is_sticky() {
        let (_dir, _disk, pool) = create_test_pool(10);

        let (page_id, frame) = pool.new_page().unwrap();
        pool.fetch_page(page_id).unwrap();

        assert!(pool.unpin_page(page_id, true));
        // A later clean unpin must not clear the dirty bit.
        assert!(pool.unpin_page(page_id, false));
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_flush_page() {
        let (_dir, disk, pool) = create_test_pool(10);

        let (page_id, frame) = pool.new_page().unwrap();
        {
            let mut data = frame.write_data();
            data[10] = 0x77;
        }
        pool.unpin_page(page_id, true);

        assert!(pool.flush_page(page_id).unwrap());
        assert!(!frame.is_dirty());
        assert_eq!(disk.read_page(page_id).unwrap()[10], 0x77);

        // Not resident.
        assert!(!pool.flush_page(PageId(99)).unwrap());
    }

    #[test]
    fn test_flush_is_unconditional() {
        let (_dir, disk, pool) = create_test_pool(10);

        let (page_id, _) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false);

        // Clean pages are written too.
        assert!(pool.flush_page(page_id).unwrap());
        assert_eq!(disk.write_count(), 1);
    }

    #[test]
    fn test_flush_all_pages() {
        let (_dir, disk, pool) = create_test_pool(10);

        let mut ids = Vec::new();
        for _ in 0..5 {
            let (page_id, _) = pool.new_page().unwrap();
            pool.unpin_page(page_id, true);
            ids.push(page_id);
        }

        pool.flush_all_pages().unwrap();
        assert_eq!(disk.write_count(), 5);
        for page_id in ids {
            let frame = pool.fetch_page(page_id).unwrap();
            assert!(!frame.is_dirty());
            pool.unpin_page(page_id, false);
        }
    }

    #[test]
    fn test_delete_page() {
        let (_dir, _disk, pool) = create_test_pool(10);

        let (page_id, _) = pool.new_page().unwrap();

        // Pinned pages cannot be deleted.
        assert!(!pool.delete_page(page_id).unwrap());

        pool.unpin_page(page_id, false);
        assert!(pool.delete_page(page_id).unwrap());
        assert!(!pool.contains(page_id));
        assert_eq!(pool.free_count(), 10);
        assert_eq!(pool.evictable_count(), 0);

        // Deleting a non-resident page succeeds.
        assert!(pool.delete_page(PageId(42)).unwrap());
    }

    #[test]
    fn test_pool_invariant_frames_partitioned() {
        let (_dir, _disk, pool) = create_test_pool(4);

        // Every frame is in exactly one of free list or page table.
        assert_eq!(pool.free_count() + pool.page_count(), 4);

        let (a, _) = pool.new_page().unwrap();
        let (b, _) = pool.new_page().unwrap();
        assert_eq!(pool.free_count() + pool.page_count(), 4);

        pool.unpin_page(a, false);
        pool.delete_page(a).unwrap();
        assert_eq!(pool.free_count() + pool.page_count(), 4);

        pool.unpin_page(b, true);
        pool.new_page().unwrap();
        assert_eq!(pool.free_count() + pool.page_count(), 4);
    }

    #[test]
    fn test_eviction_prefers_young_frames() {
        let (_dir, _disk, pool) = create_test_pool(2);

        let (a, _) = pool.new_page().unwrap();
        let (b, _) = pool.new_page().unwrap();
        pool.unpin_page(a, false);
        pool.unpin_page(b, false);

        // Fetch page a twice more: its frame graduates, b's stays young.
        pool.fetch_page(a).unwrap();
        pool.unpin_page(a, false);
        pool.fetch_page(a).unwrap();
        pool.unpin_page(a, false);

        // The next allocation evicts b's frame even though a was touched
        // earlier.
        pool.new_page().unwrap();
        assert!(pool.contains(a));
        assert!(!pool.contains(b));
    }

    #[test]
    fn test_page_data_round_trips_through_eviction() {
        let (_dir, _disk, pool) = create_test_pool(1);

        let (page_id, frame) = pool.new_page().unwrap();
        {
            let mut data = frame.write_data();
            data[..5].copy_from_slice(b"hello");
        }
        pool.unpin_page(page_id, true);

        // Push the page out and bring it back.
        pool.fetch_page(PageId(7)).unwrap();
        pool.unpin_page(PageId(7), false);
        let frame = pool.fetch_page(page_id).unwrap();
        assert_eq!(&frame.read_data()[..5], b"hello");
    }

    #[test]
    fn test_log_manager_handle() {
        let dir = tempfile::tempdir().unwrap();
        let disk = Arc::new(
            DiskManager::new(DiskManagerConfig {
                data_dir: dir.path().to_path_buf(),
                fsync_enabled: false,
            })
            .unwrap(),
        );

        let log = Arc::new(LogManager::new());
        let pool = BufferPoolManager::new(
            BufferPoolConfig::default(),
            disk,
            Some(Arc::clone(&log)),
        );

        let handle = pool.log_manager().unwrap();
        assert!(!handle.is_enabled());
        assert_eq!(handle.next_lsn(), 0);
        assert_eq!(log.next_lsn(), 1);
    }

    #[test]
    fn test_config_from_storage_config() {
        let storage = StorageConfig {
            buffer_pool_frames: 64,
            replacer_k: 3,
            ..Default::default()
        };

        let config = BufferPoolConfig::from(&storage);
        assert_eq!(config.pool_size, 64);
        assert_eq!(config.replacer_k, 3);
    }

    #[test]
    fn test_page_size_constant_matches_frame() {
        let (_dir, _disk, pool) = create_test_pool(1);
        let (_, frame) = pool.new_page().unwrap();
        assert_eq!(frame.read_data().len(), PAGE_SIZE);
    }
}
