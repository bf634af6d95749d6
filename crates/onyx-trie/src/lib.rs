//! Persistent trie index for OnyxDB.
//!
//! This crate provides:
//! - An immutable copy-on-write [`Trie`] keyed by byte strings, with
//!   structural sharing between versions
//! - A thread-safe [`TrieStore`] that atomically publishes trie versions,
//!   letting readers run lock-free against snapshots

mod store;
mod trie;

pub use store::{TrieStore, ValueGuard};
pub use trie::{Trie, TrieNode};
