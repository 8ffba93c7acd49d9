//! Disk-backed multi-part file cache with LRU eviction.
//!
//! Stores byte content under string keys, where one logical entry may span
//! several ordered part files. Writers stage content into temp files and
//! publish them with an all-or-nothing commit; readers open parts and
//! refresh their recency as they go. Total on-disk size is bounded by a
//! byte budget with least-recently-used eviction, and an existing cache
//! directory is re-indexed on startup without losing eviction ordering.

pub mod config;
pub mod entry_store;
pub mod error;
pub mod key_codec;
pub mod lru_index;

pub use error::{CacheError, Result};
