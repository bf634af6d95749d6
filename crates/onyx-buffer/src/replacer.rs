//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use hashlink::LinkedHashMap;
use onyx_common::{OnyxError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Trait for page replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId) -> Result<()>;

    /// Marks a frame as evictable or pinned.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()>;

    /// Selects a victim frame for eviction and stops tracking it.
    ///
    /// Returns None if no frames are evictable.
    fn evict(&self) -> Option<FrameId>;

    /// Stops tracking an evictable frame. No-op if the frame is unknown.
    fn remove(&self, frame_id: FrameId) -> Result<()>;

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// LRU-K replacement algorithm implementation.
///
/// A frame's backward K-distance is the time between now and its K-th most
/// recent access; frames with fewer than K recorded accesses count as
/// infinitely distant. Eviction prefers the infinitely-distant frames
/// (earliest first access wins among them), then the graduated frame whose
/// most recent access is oldest.
///
/// Evictable frames are partitioned into two queues: `young` holds frames
/// with fewer than K accesses in first-enqueue order, `old` holds graduated
/// frames ordered by last access. Non-evictable frames are tracked only in
/// the node store.
pub struct LruKReplacer {
    /// Number of frames this replacer tracks, i.e. the valid id range.
    replacer_size: usize,
    /// Access-history depth.
    k: usize,
    /// Internal state protected by a single latch.
    inner: Mutex<LruKInner>,
}

/// Bookkeeping for one tracked frame.
struct LruKNode {
    /// Number of recorded accesses, saturated at K.
    history_count: usize,
    /// Timestamp of the most recent access.
    last_ts: u64,
    /// Whether the frame may be evicted.
    is_evictable: bool,
    /// Whether the frame has reached K accesses.
    is_old: bool,
}

struct LruKInner {
    /// All tracked frames.
    node_store: HashMap<FrameId, LruKNode>,
    /// Evictable frames with fewer than K accesses, FIFO by first enqueue.
    young: LinkedHashMap<FrameId, ()>,
    /// Evictable frames with at least K accesses, ascending by last access.
    old: LinkedHashMap<FrameId, ()>,
    /// Logical clock advanced on every recorded access.
    current_ts: u64,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer tracking `num_frames` frames with an
    /// access-history depth of `k`.
    pub fn new(num_frames: usize, k: usize) -> Self {
        Self {
            replacer_size: num_frames,
            k: k.max(1),
            inner: Mutex::new(LruKInner {
                node_store: HashMap::new(),
                young: LinkedHashMap::new(),
                old: LinkedHashMap::new(),
                current_ts: 0,
            }),
        }
    }

    /// Returns the number of frames this replacer can track.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.replacer_size
    }

    /// Returns the configured history depth K.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    fn check_frame(&self, frame_id: FrameId) -> Result<()> {
        if frame_id.0 >= self.replacer_size {
            return Err(OnyxError::InvalidFrame {
                frame_id: frame_id.0,
                limit: self.replacer_size,
            });
        }
        Ok(())
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;

        let mut inner = self.inner.lock();
        inner.current_ts += 1;
        let ts = inner.current_ts;

        match inner.node_store.get_mut(&frame_id) {
            None => {
                // Fresh frames start pinned; they enter a queue once
                // set_evictable(true) is called.
                let node = LruKNode {
                    history_count: 1,
                    last_ts: ts,
                    is_evictable: false,
                    is_old: 1 >= self.k,
                };
                inner.node_store.insert(frame_id, node);
            }
            Some(node) => {
                if node.history_count < self.k {
                    node.history_count += 1;
                }
                node.last_ts = ts;

                let graduated = !node.is_old && node.history_count >= self.k;
                if graduated {
                    node.is_old = true;
                }
                let is_evictable = node.is_evictable;
                let is_old = node.is_old;

                if is_evictable {
                    if graduated {
                        inner.young.remove(&frame_id);
                        inner.old.insert(frame_id, ());
                    } else if is_old {
                        // Refresh position so the old queue stays ordered
                        // by last access.
                        inner.old.remove(&frame_id);
                        inner.old.insert(frame_id, ());
                    }
                    // Young frames keep their first-enqueue position.
                }
            }
        }
        Ok(())
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()> {
        self.check_frame(frame_id)?;

        let mut inner = self.inner.lock();
        let node = inner
            .node_store
            .get_mut(&frame_id)
            .ok_or(OnyxError::UnknownFrame(frame_id.0))?;

        if node.is_evictable == evictable {
            return Ok(());
        }
        node.is_evictable = evictable;
        let is_old = node.is_old;

        if evictable {
            if is_old {
                inner.old.insert(frame_id, ());
            } else {
                inner.young.insert(frame_id, ());
            }
        } else if is_old {
            inner.old.remove(&frame_id);
        } else {
            inner.young.remove(&frame_id);
        }
        Ok(())
    }

    fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();

        let entry = inner.young.pop_front();
        let entry = entry.or_else(|| inner.old.pop_front());
        let (frame_id, ()) = entry?;

        if let Some(node) = inner.node_store.remove(&frame_id) {
            log::debug!(
                "evicting {frame_id}: {} accesses, last at ts {}",
                node.history_count,
                node.last_ts
            );
        }
        Some(frame_id)
    }

    fn remove(&self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;

        let mut inner = self.inner.lock();
        let Some(node) = inner.node_store.get(&frame_id) else {
            return Ok(());
        };
        if !node.is_evictable {
            return Err(OnyxError::Unevictable(frame_id.0));
        }
        let is_old = node.is_old;

        if is_old {
            inner.old.remove(&frame_id);
        } else {
            inner.young.remove(&frame_id);
        }
        inner.node_store.remove(&frame_id);
        Ok(())
    }

    fn size(&self) -> usize {
        let inner = self.inner.lock();
        inner.young.len() + inner.old.len()
    }
}
