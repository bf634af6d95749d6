//! Disk manager for page-level file I/O.

use onyx_common::page::{PageId, PAGE_SIZE};
use onyx_common::{Result, StorageConfig};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Name of the single data file under the data directory.
const DATA_FILE: &str = "onyx.dat";

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Base directory for data files.
    pub data_dir: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
        }
    }
}

impl From<&StorageConfig> for DiskManagerConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            fsync_enabled: config.fsync_enabled,
        }
    }
}

/// Manages reading and writing pages to the data file.
///
/// Pages live at fixed offsets: page N occupies bytes
/// `[N * PAGE_SIZE, (N + 1) * PAGE_SIZE)`.
pub struct DiskManager {
    /// Configuration.
    config: DiskManagerConfig,
    /// Open handle to the data file, with its current page count.
    inner: Mutex<DiskFile>,
    /// Number of page writes performed since creation.
    write_count: AtomicU64,
    /// Number of page reads performed since creation.
    read_count: AtomicU64,
}

struct DiskFile {
    file: File,
    num_pages: u64,
}

impl DiskManager {
    /// Creates a new disk manager, opening or creating the data file.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let path = config.data_dir.join(DATA_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let num_pages = file_size / PAGE_SIZE as u64;

        Ok(Self {
            config,
            inner: Mutex::new(DiskFile { file, num_pages }),
            write_count: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
        })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Reads a page from disk.
    ///
    /// A read past the end of the file returns a zeroed buffer: pages are
    /// materialized on first write, so an unwritten page reads as zeroes.
    pub fn read_page(&self, page_id: PageId) -> Result<[u8; PAGE_SIZE]> {
        let mut inner = self.inner.lock();
        let mut buffer = [0u8; PAGE_SIZE];

        if page_id.0 >= inner.num_pages {
            log::debug!("read of unwritten page {page_id}, returning zeroed buffer");
            return Ok(buffer);
        }

        inner.file.seek(SeekFrom::Start(page_id.offset()))?;
        inner.file.read_exact(&mut buffer)?;
        self.read_count.fetch_add(1, Ordering::Relaxed);

        Ok(buffer)
    }

    /// Writes a page to disk, extending the file if needed.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut inner = self.inner.lock();

        inner.file.seek(SeekFrom::Start(page_id.offset()))?;
        inner.file.write_all(data)?;

        if self.config.fsync_enabled {
            inner.file.sync_all()?;
        }

        if page_id.0 >= inner.num_pages {
            inner.num_pages = page_id.0 + 1;
        }
        self.write_count.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// Returns the number of pages currently in the data file.
    pub fn num_pages(&self) -> u64 {
        self.inner.lock().num_pages
    }

    /// Returns the number of page writes performed so far.
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Returns the number of page reads performed so far.
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }
}
