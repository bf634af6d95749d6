//! Concurrent facade over the persistent trie.
//!
//! Readers copy the current root under a latch held only for the copy,
//! then walk their snapshot with no locks at all. Writers serialize among
//! themselves on a separate latch and republish a new root when done, so
//! readers and writers never block each other.

use crate::trie::Trie;
use parking_lot::Mutex;
use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;

/// Keeps a value reference alive together with the trie version it was
/// read from.
pub struct ValueGuard<T> {
    root: Trie,
    value: Arc<T>,
}

impl<T> ValueGuard<T> {
    /// Returns the guarded value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the trie version this value was read from.
    pub fn snapshot(&self) -> &Trie {
        &self.root
    }
}

impl<T> Deref for ValueGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Thread-safe store publishing the current trie version.
///
/// At most one writer runs at a time; readers always observe some
/// complete past or present version.
#[derive(Default)]
pub struct TrieStore {
    /// Guards the root pointer; held only to copy or swap it.
    root: Mutex<Trie>,
    /// Serializes writers end-to-end.
    write_lock: Mutex<()>,
}

impl TrieStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `key` in the current version.
    ///
    /// The returned guard pins the version it was read from, so the value
    /// stays valid however many writes land afterwards.
    pub fn get<T: Any + Send + Sync>(&self, key: &[u8]) -> Option<ValueGuard<T>> {
        let snapshot = self.root.lock().clone();
        let value = snapshot.get_arc::<T>(key)?;
        Some(ValueGuard {
            root: snapshot,
            value,
        })
    }

    /// Maps `key` to `value` in a new version and publishes it.
    pub fn put<T: Any + Send + Sync>(&self, key: &[u8], value: T) {
        let _writer = self.write_lock.lock();

        let snapshot = self.root.lock().clone();
        let new_root = snapshot.put(key, value);
        self.publish(new_root);
    }

    /// Unmaps `key` in a new version and publishes it.
    pub fn remove(&self, key: &[u8]) {
        let _writer = self.write_lock.lock();

        let snapshot = self.root.lock().clone();
        let new_root = snapshot.remove(key);
        self.publish(new_root);
    }

    /// Swaps in a new root. The root latch covers only the swap; the
    /// displaced version is dropped after it is released.
    fn publish(&self, new_root: Trie) {
        let displaced = std::mem::replace(&mut *self.root.lock(), new_root);
        drop(displaced);
    }

    /// Returns the current version.
    pub fn snapshot(&self) -> Trie {
        self.root.lock().clone()
    }
}
