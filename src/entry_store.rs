//! Entry Store Module
//!
//! Orchestrates multi-part cache entries on disk: temp-file staging, atomic
//! commit by rename, reads that refresh recency, removal, warm-loading an
//! existing directory, and byte-budgeted eviction through the LRU index.
//!
//! The cache directory is flat and exclusively owned by one store instance.
//! Each file in it is either a committed part (`<key>.<index>`) or a staged
//! temp file (32 random hex characters). All metadata is derived from the
//! file name, length, and modification time; there are no sidecar files.

use crate::config::CacheConfig;
use crate::key_codec::part_name;
use crate::lru_index::{IndexStats, LruIndex, RemovalCause};
use crate::{CacheError, Result};
use filetime::FileTime;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::fs::File;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Maximum attempts to find an unused random temp file name before the
/// allocation is reported as a fatal failure
const TEMP_NAME_ATTEMPTS: u32 = 32;

/// An opened multi-part entry: one read stream per part in part order, with
/// the length of each part captured at open time.
pub struct Snapshot {
    streams: Vec<File>,
    lengths: Vec<u64>,
}

impl Snapshot {
    /// Length in bytes of the given part.
    ///
    /// Panics if `part` is out of range for this snapshot.
    pub fn length(&self, part: usize) -> u64 {
        self.lengths[part]
    }

    /// Number of parts in this snapshot
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Consume the snapshot, yielding the part streams in order
    pub fn into_streams(self) -> Vec<File> {
        self.streams
    }
}

/// Disk-backed store for multi-part cache entries
pub struct EntryStore {
    directory: PathBuf,
    /// Single mutual-exclusion domain for all index operations
    index: Mutex<LruIndex>,
    /// Serializes commit/remove/clear. Commits have directory-wide eviction
    /// side effects, so one global lock is the simplest correct discipline.
    /// Critical sections contain only fast local filesystem calls.
    mutation_lock: Mutex<()>,
}

impl EntryStore {
    /// Open a cache over `directory` with the given byte budget, creating
    /// the directory if absent.
    ///
    /// With `load_synchronously` set, existing files are indexed before this
    /// returns. Otherwise the warm load runs on a detached task and
    /// operations issued before it completes observe a partially-populated
    /// index; reads and commits remain safe during that window.
    pub async fn open(
        directory: PathBuf,
        max_size_bytes: u64,
        load_synchronously: bool,
    ) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&directory).map_err(|e| {
            CacheError::ConfigError(format!(
                "Failed to create cache directory {:?}: {}",
                directory, e
            ))
        })?;

        // Dropping an index record deletes its backing file in the same
        // logical step; a file already gone is not an error
        let observer_dir = directory.clone();
        let index = LruIndex::new(
            max_size_bytes,
            Box::new(move |cause: RemovalCause, name, size| {
                let path = observer_dir.join(name);
                match std::fs::remove_file(&path) {
                    Ok(()) => debug!(
                        "Deleted backing file for {:?} entry: {} ({} bytes)",
                        cause, name, size
                    ),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        debug!("Backing file already absent for {}", name)
                    }
                    Err(e) => warn!("Failed to delete backing file {:?}: {}", path, e),
                }
            }),
        );

        let store = Arc::new(Self {
            directory,
            index: Mutex::new(index),
            mutation_lock: Mutex::new(()),
        });

        if load_synchronously {
            let loaded = store.load_existing().await?;
            info!(
                "Opened cache at {:?} ({} existing files indexed, budget {} bytes)",
                store.directory, loaded, max_size_bytes
            );
        } else {
            info!(
                "Opened cache at {:?} (budget {} bytes), indexing existing files in background",
                store.directory, max_size_bytes
            );
            let task_store = Arc::clone(&store);
            tokio::spawn(async move {
                match task_store.load_existing().await {
                    Ok(loaded) => debug!(
                        "Background indexing complete: {} files from {:?}",
                        loaded, task_store.directory
                    ),
                    Err(e) => warn!(
                        "Background indexing failed for {:?}: {}",
                        task_store.directory, e
                    ),
                }
            });
        }

        Ok(store)
    }

    /// Open a cache from a validated [`CacheConfig`]
    pub async fn open_with_config(config: &CacheConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Self::open(
            config.directory.clone(),
            config.max_size_bytes,
            config.load_synchronously,
        )
        .await
    }

    /// The cache directory this store owns
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Allocate a path for staging content before commit.
    ///
    /// The name is 128 random bits rendered in hex, checked against the
    /// directory and retried on collision. The file itself is not created;
    /// the caller writes to the returned path and hands it to [`commit`].
    ///
    /// [`commit`]: EntryStore::commit
    pub fn allocate_temp_file(&self) -> Result<PathBuf> {
        for _ in 0..TEMP_NAME_ATTEMPTS {
            let name = Uuid::new_v4().simple().to_string();
            let path = self.directory.join(name);
            if !path.exists() {
                return Ok(path);
            }
        }
        Err(CacheError::IoError(format!(
            "Failed to allocate an unused temp file name in {:?} after {} attempts",
            self.directory, TEMP_NAME_ATTEMPTS
        )))
    }

    /// Allocate `count` staging paths at once
    pub fn allocate_temp_files(&self, count: usize) -> Result<Vec<PathBuf>> {
        (0..count).map(|_| self.allocate_temp_file()).collect()
    }

    /// Atomically publish staged files as the parts of `key`.
    ///
    /// Any existing parts of `key` are removed first, so a re-commit fully
    /// replaces prior content. Each staged file is then renamed into its
    /// final part location in order and registered in the index, which may
    /// evict unrelated entries to stay within budget.
    ///
    /// If any rename fails, every staged temp file is deleted and all parts
    /// of `key` renamed so far are removed again: the key ends the call
    /// fully absent, never partially present. The prior content removed at
    /// the start is not restored.
    pub async fn commit(&self, key: &str, temp_files: &[PathBuf]) -> Result<()> {
        let _guard = self.mutation_lock.lock().unwrap();

        self.remove_locked(key);

        for (i, temp_file) in temp_files.iter().enumerate() {
            let part = i as u32;
            let name = part_name(key, part);
            let final_path = self.directory.join(&name);

            let size = match std::fs::rename(temp_file, &final_path)
                .and_then(|_| std::fs::metadata(&final_path))
            {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    warn!(
                        "Commit failed for key {} at part {}: {}; rolling back",
                        key, part, e
                    );
                    self.discard_files(temp_files);
                    self.remove_locked(key);
                    return Err(CacheError::CommitFailed(format!(
                        "Failed to publish part {} of key {}: {}",
                        part, key, e
                    )));
                }
            };

            let mut index = self.index.lock().unwrap();
            // A warm load that ran while this file was staged may have
            // indexed it under its temp name; that record is now stale
            if let Some(temp_name) = temp_file.file_name().and_then(|n| n.to_str()) {
                index.remove(temp_name);
            }
            index.put(&name, size);
            drop(index);

            debug!("Committed part {} of key {} ({} bytes)", part, key, size);
        }

        info!("Committed {} part(s) for key {}", temp_files.len(), key);
        Ok(())
    }

    /// Check whether the backing file for a part is present on disk.
    ///
    /// Consults the filesystem only, tolerating divergence from the index.
    pub fn exists(&self, key: &str, part: u32) -> bool {
        self.directory.join(part_name(key, part)).exists()
    }

    /// Open one part of an entry for reading, refreshing its recency in the
    /// index and its file modification time.
    pub async fn open_part(&self, key: &str, part: u32) -> Result<File> {
        let name = part_name(key, part);
        self.touch(&name);

        match File::open(self.directory.join(&name)).await {
            Ok(file) => {
                debug!("Opened part {} of key {}", part, key);
                Ok(file)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CacheError::NotFound(
                format!("Part {} of key {} is not cached", part, key),
            )),
            Err(e) => Err(CacheError::IoError(format!(
                "Failed to open part {} of key {}: {}",
                part, key, e
            ))),
        }
    }

    /// Open parts `0..count` of an entry for reading.
    ///
    /// A multi-part entry with any part unavailable is treated as corrupt:
    /// streams opened so far are closed, the whole entry is removed, and
    /// [`CacheError::IncompleteEntry`] is returned.
    pub async fn open_parts(&self, key: &str, count: u32) -> Result<Snapshot> {
        let mut streams = Vec::with_capacity(count as usize);
        let mut lengths = Vec::with_capacity(count as usize);

        for part in 0..count {
            let name = part_name(key, part);
            self.touch(&name);

            let opened = match File::open(self.directory.join(&name)).await {
                Ok(file) => file,
                Err(e) => {
                    drop(streams);
                    self.remove(key).await;
                    warn!(
                        "Removed incomplete entry {}: part {} of {} unavailable",
                        key, part, count
                    );
                    return Err(CacheError::IncompleteEntry(format!(
                        "Key {} is missing part {} of {}: {}",
                        key, part, count, e
                    )));
                }
            };

            let length = match opened.metadata().await {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    drop(opened);
                    drop(streams);
                    self.remove(key).await;
                    return Err(CacheError::IncompleteEntry(format!(
                        "Key {} part {} of {} is unreadable: {}",
                        key, part, count, e
                    )));
                }
            };

            streams.push(opened);
            lengths.push(length);
        }

        debug!("Opened {} part(s) of key {}", count, key);
        Ok(Snapshot { streams, lengths })
    }

    /// Remove an entry: its index records and backing files for parts
    /// 0, 1, 2, ... up to the first missing index.
    ///
    /// Parts are assumed contiguous from zero; a gap terminates the scan, so
    /// parts beyond a gap created by external interference are not found.
    pub async fn remove(&self, key: &str) {
        let _guard = self.mutation_lock.lock().unwrap();
        self.remove_locked(key);
        debug!("Removed entry for key {}", key);
    }

    /// Index every file already present in the cache directory.
    ///
    /// Files are inserted oldest-modified first and touched as they go, so
    /// the recency order afterwards mirrors on-disk modification time and
    /// the next eviction removes the least recently modified file. Returns
    /// the number of files indexed.
    pub async fn load_existing(&self) -> Result<usize> {
        let dir_entries = std::fs::read_dir(&self.directory).map_err(|e| {
            CacheError::IoError(format!(
                "Failed to list cache directory {:?}: {}",
                self.directory, e
            ))
        })?;

        let mut files: Vec<(String, u64, SystemTime)> = Vec::new();
        for dir_entry in dir_entries {
            let dir_entry = match dir_entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            let metadata = match dir_entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping {:?}: failed to stat: {}", dir_entry.path(), e);
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            let name = match dir_entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!("Skipping non-UTF-8 cache file name: {:?}", raw);
                    continue;
                }
            };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((name, metadata.len(), modified));
        }

        // Oldest first, so recency order after the load mirrors on-disk age
        files.sort_by_key(|(_, _, modified)| *modified);

        let loaded = files.len();
        let mut index = self.index.lock().unwrap();
        for (name, size, _) in files {
            index.put(&name, size);
            index.get(&name);
        }
        drop(index);

        debug!(
            "Indexed {} existing file(s) from {:?}",
            loaded, self.directory
        );
        Ok(loaded)
    }

    /// Delete every file in the cache directory and empty the index.
    ///
    /// Not atomic with respect to concurrent readers; a read racing the
    /// clear may observe the entry vanishing mid-operation.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.mutation_lock.lock().unwrap();

        let dir_entries = std::fs::read_dir(&self.directory).map_err(|e| {
            CacheError::IoError(format!(
                "Failed to list cache directory {:?}: {}",
                self.directory, e
            ))
        })?;
        for dir_entry in dir_entries.flatten() {
            let path = dir_entry.path();
            if !path.is_file() {
                continue;
            }
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to delete cache file {:?}: {}", path, e);
            }
        }

        self.index.lock().unwrap().evict_all();
        info!("Cleared cache at {:?}", self.directory);
        Ok(())
    }

    /// Update the eviction budget, evicting immediately if the cache is now
    /// over it
    pub fn set_max_size(&self, max_size_bytes: u64) {
        self.index.lock().unwrap().set_max_size(max_size_bytes);
    }

    /// Number of part files currently tracked by the index (not bytes)
    pub fn size(&self) -> usize {
        self.index.lock().unwrap().len()
    }

    /// Sum of tracked part sizes in bytes
    pub fn total_size(&self) -> u64 {
        self.index.lock().unwrap().total_size()
    }

    /// Point-in-time index statistics
    pub fn stats(&self) -> IndexStats {
        self.index.lock().unwrap().stats()
    }

    /// Promote a part name in the index and bump its file modification time
    /// so recency survives a restart. Both steps are best-effort: an
    /// unindexed or missing file is not an error here.
    fn touch(&self, name: &str) {
        self.index.lock().unwrap().get(name);

        let path = self.directory.join(name);
        let now = FileTime::from_system_time(SystemTime::now());
        if let Err(e) = filetime::set_file_mtime(&path, now) {
            debug!("Could not refresh mtime of {}: {}", name, e);
        }
    }

    /// Remove index records and part files for `key`. Caller must hold the
    /// mutation lock.
    fn remove_locked(&self, key: &str) {
        // Drain index records first; each deletion also drops the backing
        // file through the removal observer
        {
            let mut index = self.index.lock().unwrap();
            let mut part = 0u32;
            while index.remove(&part_name(key, part)).is_some() {
                part += 1;
            }
        }

        // Then sweep part files the index did not know about (divergence
        // after a crash or a load still in progress)
        let mut part = 0u32;
        loop {
            let path = self.directory.join(part_name(key, part));
            if !path.exists() {
                break;
            }
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to delete part file {:?}: {}", path, e);
            }
            part += 1;
        }
    }

    /// Best-effort deletion of staged files during commit rollback
    fn discard_files(&self, paths: &[PathBuf]) {
        for path in paths {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Discarded staged file {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to discard staged file {:?}: {}", path, e),
            }
        }
    }
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("directory", &self.directory)
            .finish()
    }
}
