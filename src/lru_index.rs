//! LRU Index Module
//!
//! In-memory mapping from part file name to its size in bytes, bounded by a
//! total-byte budget with least-recently-used eviction. Every drop of a
//! record (eviction or explicit removal) is reported to a removal observer
//! supplied at construction, which the entry store uses to delete the
//! corresponding backing file in the same logical step.
//!
//! The index performs no locking itself; the entry store wraps it in a
//! single mutex, which is the one mutual-exclusion domain for all index
//! operations.

use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Why a record left the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// Dropped to satisfy the byte budget (or an explicit evict-all sweep).
    Evicted,
    /// Explicitly removed by name.
    Removed,
}

/// Called with the cause, part file name, and recorded size whenever a
/// record is dropped. Not called when a `put` replaces an existing record
/// for the same name, since the backing file is being superseded rather
/// than dropped and must not be deleted.
///
/// The observer runs while the index is borrowed; it must not call back
/// into the index.
pub type RemovalObserver = Box<dyn Fn(RemovalCause, &str, u64) + Send + Sync>;

/// Point-in-time counters for the index
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub entry_count: usize,
    pub total_size: u64,
    pub max_size: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
}

/// Byte-budgeted LRU index over part file names
pub struct LruIndex {
    max_size: u64,
    total_size: u64,
    entries: HashMap<String, u64>,
    /// Recency queue, least recently used at the front
    lru_order: VecDeque<String>,
    observer: RemovalObserver,
    hit_count: u64,
    miss_count: u64,
    eviction_count: u64,
}

impl LruIndex {
    /// Create a new index with the given byte budget and removal observer
    pub fn new(max_size: u64, observer: RemovalObserver) -> Self {
        Self {
            max_size,
            total_size: 0,
            entries: HashMap::new(),
            lru_order: VecDeque::new(),
            observer,
            hit_count: 0,
            miss_count: 0,
            eviction_count: 0,
        }
    }

    /// Insert or replace a record and promote it to most recently used.
    ///
    /// If the total size now exceeds the budget, least-recently-used records
    /// are evicted until the index is within budget or only the record just
    /// inserted remains. A single record larger than the whole budget is
    /// therefore admitted, at the cost of evicting everything else.
    pub fn put(&mut self, name: &str, size_bytes: u64) {
        if let Some(old_size) = self.entries.insert(name.to_string(), size_bytes) {
            // Superseded record: drop its accounting silently, the backing
            // file is being replaced rather than dropped
            self.total_size = self.total_size.saturating_sub(old_size);
            self.remove_from_order(name);
        }

        self.total_size += size_bytes;
        self.lru_order.push_back(name.to_string());
        debug!(
            "Indexed entry: {} ({} bytes, total {} / {})",
            name, size_bytes, self.total_size, self.max_size
        );

        self.trim_to_size(self.max_size, Some(name));
    }

    /// Return the recorded size for a name, promoting it to most recently
    /// used. Absent names are counted as misses and have no side effects.
    pub fn get(&mut self, name: &str) -> Option<u64> {
        match self.entries.get(name).copied() {
            Some(size) => {
                self.remove_from_order(name);
                self.lru_order.push_back(name.to_string());
                self.hit_count += 1;
                Some(size)
            }
            None => {
                self.miss_count += 1;
                None
            }
        }
    }

    /// Check presence without touching recency or statistics
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Remove a record by name, notifying the observer with
    /// [`RemovalCause::Removed`]. Returns the recorded size, or `None`
    /// (observer not invoked) if the name was absent.
    pub fn remove(&mut self, name: &str) -> Option<u64> {
        let size = self.entries.remove(name)?;
        self.total_size = self.total_size.saturating_sub(size);
        self.remove_from_order(name);
        debug!("Removed index entry: {} ({} bytes)", name, size);
        (self.observer)(RemovalCause::Removed, name, size);
        Some(size)
    }

    /// Drop every record in least-recently-used order, notifying the
    /// observer with [`RemovalCause::Evicted`] for each.
    pub fn evict_all(&mut self) {
        while let Some(name) = self.lru_order.pop_front() {
            if let Some(size) = self.entries.remove(&name) {
                self.total_size = self.total_size.saturating_sub(size);
                self.eviction_count += 1;
                (self.observer)(RemovalCause::Evicted, &name, size);
            }
        }
        debug!("Evicted all index entries");
    }

    /// Update the byte budget, evicting least-recently-used records until
    /// the index complies with the new budget.
    pub fn set_max_size(&mut self, new_max: u64) {
        debug!(
            "Index budget changed: {} -> {} bytes (current total {})",
            self.max_size, new_max, self.total_size
        );
        self.max_size = new_max;
        self.trim_to_size(new_max, None);
    }

    /// Current sum of recorded sizes in bytes
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Current byte budget
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Number of records currently tracked
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time statistics snapshot
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            entry_count: self.entries.len(),
            total_size: self.total_size,
            max_size: self.max_size,
            hit_count: self.hit_count,
            miss_count: self.miss_count,
            eviction_count: self.eviction_count,
        }
    }

    /// Evict least-recently-used records until total size is within
    /// `target`. `protect` shields the record just inserted by `put`: once
    /// it is the only record left, trimming stops even if it alone exceeds
    /// the budget.
    fn trim_to_size(&mut self, target: u64, protect: Option<&str>) {
        while self.total_size > target {
            let victim = match self.lru_order.front() {
                Some(name) => name.clone(),
                None => break,
            };
            if protect == Some(victim.as_str()) {
                // Only the just-inserted record remains
                break;
            }
            self.lru_order.pop_front();
            if let Some(size) = self.entries.remove(&victim) {
                self.total_size = self.total_size.saturating_sub(size);
                self.eviction_count += 1;
                debug!(
                    "Evicted LRU entry: {} ({} bytes, total now {} / {})",
                    victim, size, self.total_size, target
                );
                (self.observer)(RemovalCause::Evicted, &victim, size);
            }
        }
    }

    fn remove_from_order(&mut self, name: &str) {
        if let Some(pos) = self.lru_order.iter().position(|n| n == name) {
            self.lru_order.remove(pos);
        }
    }
}

impl std::fmt::Debug for LruIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruIndex")
            .field("max_size", &self.max_size)
            .field("total_size", &self.total_size)
            .field("entry_count", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Observer that records every notification it receives
    fn recording_observer() -> (RemovalObserver, Arc<Mutex<Vec<(RemovalCause, String, u64)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let observer: RemovalObserver = Box::new(move |cause, name, size| {
            log_clone.lock().unwrap().push((cause, name.to_string(), size));
        });
        (observer, log)
    }

    fn noop_observer() -> RemovalObserver {
        Box::new(|_, _, _| {})
    }

    #[test]
    fn test_put_and_get() {
        let mut index = LruIndex::new(100, noop_observer());
        index.put("a.0", 10);
        assert_eq!(index.get("a.0"), Some(10));
        assert_eq!(index.get("missing"), None);
        assert_eq!(index.total_size(), 10);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_eviction_order_least_recent_first() {
        let (observer, log) = recording_observer();
        let mut index = LruIndex::new(30, observer);

        // Inserted in order a, b, c with no other touches
        index.put("a", 10);
        index.put("b", 10);
        index.put("c", 10);

        // One more insertion forces exactly one eviction: a goes first
        index.put("d", 10);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0], (RemovalCause::Evicted, "a".to_string(), 10));
        assert_eq!(index.total_size(), 30);
    }

    #[test]
    fn test_get_promotes_recency() {
        let (observer, log) = recording_observer();
        let mut index = LruIndex::new(30, observer);

        index.put("a", 10);
        index.put("b", 10);
        index.put("c", 10);

        // Touch a so that b becomes the eviction victim
        assert!(index.get("a").is_some());
        index.put("d", 10);

        let log = log.lock().unwrap();
        assert_eq!(log[0].1, "b");
        assert!(index.contains("a"));
        assert!(!index.contains("b"));
    }

    #[test]
    fn test_budget_never_exceeded_after_put() {
        let mut index = LruIndex::new(25, noop_observer());
        for i in 0..20 {
            index.put(&format!("entry-{}", i), 7);
            assert!(index.total_size() <= 25);
        }
    }

    #[test]
    fn test_oversized_entry_admitted_alone() {
        let (observer, log) = recording_observer();
        let mut index = LruIndex::new(20, observer);

        index.put("small-1", 5);
        index.put("small-2", 5);
        // Larger than the whole budget: everything else is evicted, the
        // oversized record itself survives
        index.put("huge", 100);

        assert_eq!(index.len(), 1);
        assert!(index.contains("huge"));
        assert_eq!(index.total_size(), 100);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_replacement_does_not_notify_observer() {
        let (observer, log) = recording_observer();
        let mut index = LruIndex::new(100, observer);

        index.put("a.0", 10);
        index.put("a.0", 20);

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(index.get("a.0"), Some(20));
        assert_eq!(index.total_size(), 20);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_notifies_with_removed_cause() {
        let (observer, log) = recording_observer();
        let mut index = LruIndex::new(100, observer);

        index.put("a.0", 10);
        assert_eq!(index.remove("a.0"), Some(10));
        assert_eq!(index.remove("a.0"), None);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0], (RemovalCause::Removed, "a.0".to_string(), 10));
    }

    #[test]
    fn test_evict_all() {
        let (observer, log) = recording_observer();
        let mut index = LruIndex::new(100, observer);

        index.put("a", 10);
        index.put("b", 20);
        index.evict_all();

        assert!(index.is_empty());
        assert_eq!(index.total_size(), 0);
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|(cause, _, _)| *cause == RemovalCause::Evicted));
        // Least recently used reported first
        assert_eq!(log[0].1, "a");
    }

    #[test]
    fn test_set_max_size_shrink_evicts() {
        let (observer, log) = recording_observer();
        let mut index = LruIndex::new(100, observer);

        index.put("a", 30);
        index.put("b", 30);
        index.put("c", 30);

        index.set_max_size(60);
        assert_eq!(index.total_size(), 60);
        assert_eq!(log.lock().unwrap()[0].1, "a");

        // Shrinking below every record empties the index entirely
        index.set_max_size(10);
        assert!(index.is_empty());
    }

    #[test]
    fn test_stats_counters() {
        let mut index = LruIndex::new(25, noop_observer());
        index.put("a", 10);
        index.put("b", 10);
        index.get("a");
        index.get("nope");
        index.put("c", 10); // evicts b (a was touched)

        let stats = index.stats();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_size, 20);
        assert_eq!(stats.max_size, 25);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.eviction_count, 1);
    }
}

// Property-Based Tests for Budget Compliance
