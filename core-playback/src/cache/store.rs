//! # Cache Store
//!
//! Content-addressed cache of downloaded audio files.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── tracks/
//! │   ├── index.json            key → entry, rewritten atomically
//! │   ├── dQw4w9WgXcQ_Never_Gonna_Give_You_Up.m4a
//! │   └── 3f2a9c01d4b7e6a8_audio.mp3
//! └── partial/                  in-flight downloads, same filesystem
//! ```
//!
//! ## Validity
//!
//! An entry is live only while its file exists and is at least
//! `min_valid_bytes` long. [`CacheStore::lookup`] checks this on every call
//! and silently drops entries that fail it, emitting
//! [`CacheEvent::EntryInvalidated`] so hosts can still observe it.
//!
//! ## Persistence
//!
//! Structural changes rewrite the index immediately. Access times refreshed
//! by a hit stay in memory until the next rewrite or an explicit
//! [`CacheStore::flush`].

use crate::cache::config::{CacheConfig, EvictionPolicy};
use crate::cache::naming::{cache_file_name, file_stem};
use crate::cache::stats::CacheStats;
use crate::error::CacheError;
use bridge_traits::{Clock, FileSystemAccess};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_async::sync::Mutex;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

type Result<T> = std::result::Result<T, CacheError>;

const INDEX_FILE: &str = "index.json";
const INDEX_TMP_FILE: &str = "index.json.tmp";
const INDEX_VERSION: u32 = 1;

/// One cached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

enum FileCheck {
    Valid,
    Missing,
    TooSmall(u64),
}

/// The media cache.
///
/// The index is guarded by an async mutex; file moves for a `put` happen
/// before the lock is taken, so puts for different keys do not serialize on
/// disk I/O.
pub struct CacheStore {
    config: CacheConfig,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    tracks_dir: PathBuf,
    partial_dir: PathBuf,
    index: Mutex<HashMap<String, CacheEntry>>,
    /// Set when in-memory access times are newer than `index.json`.
    access_dirty: AtomicBool,
    partial_seq: AtomicU64,
}

impl CacheStore {
    /// Opens (or creates) a cache rooted at `root`.
    ///
    /// Loads the persisted index and deletes leftovers in the partial
    /// directory from a previous run. A corrupt index is logged and the
    /// cache starts empty.
    #[instrument(skip(config, fs, clock), fields(root = %root.display()))]
    pub async fn open(
        root: &Path,
        config: CacheConfig,
        fs: Arc<dyn FileSystemAccess>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let tracks_dir = root.join(&config.tracks_dir);
        let partial_dir = root.join(&config.partial_dir);

        fs.create_dir_all(&tracks_dir).await?;
        fs.create_dir_all(&partial_dir).await?;

        let store = Self {
            config,
            fs,
            clock,
            event_bus: None,
            tracks_dir,
            partial_dir,
            index: Mutex::new(HashMap::new()),
            access_dirty: AtomicBool::new(false),
            partial_seq: AtomicU64::new(0),
        };

        let entries = store.load_index().await?;
        let count = entries.len();
        *store.index.lock().await = entries;

        store.clean_partials().await;

        info!(entries = count, "Cache opened");
        Ok(store)
    }

    /// Publish cache events on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn tracks_dir(&self) -> &Path {
        &self.tracks_dir
    }

    pub fn partial_dir(&self) -> &Path {
        &self.partial_dir
    }

    /// A fresh temp path for downloading `key`.
    ///
    /// The extension is carried through to the cached file name by
    /// [`put`](Self::put).
    pub fn partial_path(&self, key: &str, extension: &str) -> PathBuf {
        let seq = self.partial_seq.fetch_add(1, Ordering::Relaxed);
        let name = if extension.is_empty() {
            format!("{}.{}", file_stem(key), seq)
        } else {
            format!("{}.{}.{}", file_stem(key), seq, extension)
        };
        self.partial_dir.join(name)
    }

    /// Returns the entry for `key` if its file is still valid.
    ///
    /// A hit refreshes `last_accessed_at` in memory only. A stale entry is removed (and an
    /// undersized file deleted) and reported as a miss.
    #[instrument(skip(self))]
    pub async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>> {
        let mut index = self.index.lock().await;
        let Some(entry) = index.get(key).cloned() else {
            return Ok(None);
        };

        let reason = match self.check_file(&entry.local_path).await? {
            FileCheck::Valid => {
                let now = self.clock.now();
                let refreshed = index.get_mut(key).map(|e| {
                    e.last_accessed_at = now;
                    e.clone()
                });
                self.access_dirty.store(true, Ordering::Release);
                debug!("Cache hit");
                return Ok(refreshed);
            }
            FileCheck::Missing => "file missing".to_string(),
            FileCheck::TooSmall(size) => {
                self.delete_quietly(&entry.local_path).await;
                format!("file too small ({} bytes)", size)
            }
        };

        index.remove(key);
        self.persist_locked(&index).await?;
        drop(index);

        warn!(key, %reason, "Dropping invalid cache entry");
        self.emit(CacheEvent::EntryInvalidated {
            key: key.to_string(),
            reason,
        });
        Ok(None)
    }

    /// Moves a verified temp file into the cache and records it.
    ///
    /// Replaces any prior entry for `key`, deleting the prior file when its
    /// path differs. Evicts other entries by policy until the cache fits its
    /// budget; the new entry is never evicted.
    #[instrument(skip(self, temp_path), fields(temp = %temp_path.display()))]
    pub async fn put(
        &self,
        key: &str,
        temp_path: &Path,
        size_bytes: u64,
        title: Option<&str>,
    ) -> Result<CacheEntry> {
        if key.trim().is_empty() || key.chars().any(char::is_control) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }

        let extension = temp_path.extension().and_then(|ext| ext.to_str());
        let destination = self
            .tracks_dir
            .join(cache_file_name(key, title, extension));

        self.fs.rename(temp_path, &destination).await?;

        let now = self.clock.now();
        let entry = CacheEntry {
            key: key.to_string(),
            local_path: destination,
            size_bytes,
            title: title.map(str::to_string),
            created_at: now,
            last_accessed_at: now,
        };

        let mut index = self.index.lock().await;
        if let Some(prior) = index.insert(key.to_string(), entry.clone()) {
            if prior.local_path != entry.local_path {
                debug!(old = %prior.local_path.display(), "Replacing cached file");
                self.delete_quietly(&prior.local_path).await;
            }
        }

        let evicted = self.evict_locked(&mut index, key).await;
        self.persist_locked(&index).await?;
        drop(index);

        info!(size_bytes, evicted = evicted.len(), "Cached");
        self.emit(CacheEvent::EntryAdded {
            key: key.to_string(),
            size_bytes,
        });
        for victim in evicted {
            self.emit(CacheEvent::Evicted {
                key: victim.key,
                size_bytes: victim.size_bytes,
            });
        }

        Ok(entry)
    }

    /// Removes `key` and its file. Returns whether an entry existed.
    #[instrument(skip(self))]
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let mut index = self.index.lock().await;
        let Some(entry) = index.remove(key) else {
            return Ok(false);
        };

        self.delete_quietly(&entry.local_path).await;
        self.persist_locked(&index).await?;
        drop(index);

        self.emit(CacheEvent::EntryRemoved {
            key: key.to_string(),
        });
        Ok(true)
    }

    /// Removes every entry and every file under the tracks directory.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<usize> {
        let mut index = self.index.lock().await;
        let removed = index.len();
        index.clear();

        for path in self.fs.list_directory(&self.tracks_dir).await? {
            if is_index_file(&path) {
                continue;
            }
            self.delete_quietly(&path).await;
        }

        self.persist_locked(&index).await?;
        drop(index);

        info!(entries_removed = removed, "Cache cleared");
        self.emit(CacheEvent::Cleared {
            entries_removed: removed,
        });
        Ok(removed)
    }

    /// Bytes on disk under the tracks directory, index excluded.
    ///
    /// Walks the directory on every call, so files deleted out of band are
    /// never counted.
    pub async fn total_size_bytes(&self) -> Result<u64> {
        let mut total = 0u64;
        for path in self.fs.list_directory(&self.tracks_dir).await? {
            if is_index_file(&path) {
                continue;
            }
            let metadata = self.fs.metadata(&path).await?;
            if metadata.is_directory {
                total += self.fs.directory_size(&path).await?;
            } else {
                total += metadata.size;
            }
        }
        Ok(total)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let entry_count = self.index.lock().await.len();
        let total_bytes = self.total_size_bytes().await?;

        Ok(CacheStats {
            entry_count,
            total_bytes,
            max_bytes: self.config.max_size_bytes,
            calculated_at: self.clock.now().timestamp(),
        })
    }

    /// Validates every entry and drops the stale ones. Returns how many were
    /// dropped.
    #[instrument(skip(self))]
    pub async fn prune(&self) -> Result<usize> {
        let mut index = self.index.lock().await;
        let mut stale = Vec::new();

        for entry in index.values() {
            match self.check_file(&entry.local_path).await? {
                FileCheck::Valid => {}
                FileCheck::Missing => stale.push((entry.clone(), "file missing".to_string())),
                FileCheck::TooSmall(size) => {
                    self.delete_quietly(&entry.local_path).await;
                    stale.push((entry.clone(), format!("file too small ({} bytes)", size)));
                }
            }
        }

        for (entry, _) in &stale {
            index.remove(&entry.key);
        }
        if !stale.is_empty() || self.access_dirty.load(Ordering::Acquire) {
            self.persist_locked(&index).await?;
        }
        drop(index);

        for (entry, reason) in &stale {
            warn!(key = %entry.key, %reason, "Pruned invalid cache entry");
            self.emit(CacheEvent::EntryInvalidated {
                key: entry.key.clone(),
                reason: reason.clone(),
            });
        }
        Ok(stale.len())
    }

    /// Writes access times refreshed since the last index rewrite. Returns
    /// whether anything was written.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<bool> {
        let index = self.index.lock().await;
        if !self.access_dirty.load(Ordering::Acquire) {
            return Ok(false);
        }
        self.persist_locked(&index).await?;
        debug!(entries = index.len(), "Access times flushed");
        Ok(true)
    }

    /// Index snapshot, oldest first. Entries are not validated.
    pub async fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.index.lock().await.values().cloned().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));
        entries
    }

    /// Whether the index holds `key`. Does not touch the file system.
    pub async fn contains(&self, key: &str) -> bool {
        self.index.lock().await.contains_key(key)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn check_file(&self, path: &Path) -> Result<FileCheck> {
        if !self.fs.exists(path).await? {
            return Ok(FileCheck::Missing);
        }
        let size = self.fs.metadata(path).await?.size;
        if size < self.config.min_valid_bytes {
            return Ok(FileCheck::TooSmall(size));
        }
        Ok(FileCheck::Valid)
    }

    async fn evict_locked(
        &self,
        index: &mut HashMap<String, CacheEntry>,
        keep: &str,
    ) -> Vec<CacheEntry> {
        let mut total: u64 = index.values().map(|e| e.size_bytes).sum();
        let mut evicted = Vec::new();

        while total > self.config.max_size_bytes {
            let Some(victim_key) = pick_victim(index, keep, self.config.eviction_policy) else {
                warn!(total, "Cache over budget with nothing left to evict");
                break;
            };
            let Some(victim) = index.remove(&victim_key) else {
                break;
            };

            self.delete_quietly(&victim.local_path).await;
            total = total.saturating_sub(victim.size_bytes);
            debug!(key = %victim.key, size_bytes = victim.size_bytes, "Evicted");
            evicted.push(victim);
        }

        evicted
    }

    async fn load_index(&self) -> Result<HashMap<String, CacheEntry>> {
        let path = self.tracks_dir.join(INDEX_FILE);
        if !self.fs.exists(&path).await? {
            return Ok(HashMap::new());
        }

        let bytes = self.fs.read_file(&path).await?;
        match serde_json::from_slice::<IndexFile>(&bytes) {
            Ok(file) => Ok(file
                .entries
                .into_iter()
                .map(|entry| (entry.key.clone(), entry))
                .collect()),
            Err(e) => {
                warn!(error = %e, "Cache index is corrupt; starting empty");
                Ok(HashMap::new())
            }
        }
    }

    async fn persist_locked(&self, index: &HashMap<String, CacheEntry>) -> Result<()> {
        let mut entries: Vec<CacheEntry> = index.values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let body = serde_json::to_vec_pretty(&IndexFile {
            version: INDEX_VERSION,
            entries,
        })?;

        let tmp = self.tracks_dir.join(INDEX_TMP_FILE);
        self.fs.write_file(&tmp, Bytes::from(body)).await?;
        self.fs
            .rename(&tmp, &self.tracks_dir.join(INDEX_FILE))
            .await?;
        self.access_dirty.store(false, Ordering::Release);
        Ok(())
    }

    async fn clean_partials(&self) {
        let leftovers = match self.fs.list_directory(&self.partial_dir).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!(error = %e, "Could not list partial downloads");
                return;
            }
        };

        if !leftovers.is_empty() {
            debug!(count = leftovers.len(), "Removing leftover partial downloads");
        }
        for path in leftovers {
            self.delete_quietly(&path).await;
        }
    }

    async fn delete_quietly(&self, path: &Path) {
        match self.fs.exists(path).await {
            Ok(true) => {
                if let Err(e) = self.fs.delete_file(path).await {
                    warn!(path = %path.display(), error = %e, "Failed to delete cache file");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to stat cache file"),
        }
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Cache(event)).ok();
        }
    }
}

fn is_index_file(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|name| name.to_str()),
        Some(INDEX_FILE) | Some(INDEX_TMP_FILE)
    )
}

fn pick_victim(
    index: &HashMap<String, CacheEntry>,
    keep: &str,
    policy: EvictionPolicy,
) -> Option<String> {
    let candidates = index.values().filter(|entry| entry.key != keep);

    let victim = match policy {
        EvictionPolicy::LeastRecentlyUsed => {
            candidates.min_by(|a, b| a.last_accessed_at.cmp(&b.last_accessed_at).then(a.key.cmp(&b.key)))
        }
        EvictionPolicy::FirstInFirstOut => {
            candidates.min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)))
        }
        EvictionPolicy::LargestFirst => {
            candidates.max_by(|a, b| a.size_bytes.cmp(&b.size_bytes).then(b.key.cmp(&a.key)))
        }
    };

    victim.map(|entry| entry.key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::SystemClock;
    use chrono::TimeZone;
    use parking_lot::Mutex as SyncMutex;
    use tempfile::TempDir;

    /// Clock that only moves when told to.
    struct ManualClock(SyncMutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(SyncMutex::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            )))
        }

        fn advance(&self, secs: i64) {
            *self.0.lock() += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock()
        }
    }

    async fn open_store(dir: &TempDir, config: CacheConfig, clock: Arc<dyn Clock>) -> CacheStore {
        CacheStore::open(dir.path(), config, Arc::new(TokioFileSystem::new()), clock)
            .await
            .unwrap()
    }

    async fn write_partial(store: &CacheStore, key: &str, ext: &str, size: usize) -> PathBuf {
        let path = store.partial_path(key, ext);
        tokio::fs::write(&path, vec![7u8; size]).await.unwrap();
        path
    }

    async fn accessed_on_disk(index_path: &Path) -> DateTime<Utc> {
        let bytes = tokio::fs::read(index_path).await.unwrap();
        let file: IndexFile = serde_json::from_slice(&bytes).unwrap();
        file.entries[0].last_accessed_at
    }

    fn small_config() -> CacheConfig {
        CacheConfig::default().with_min_valid_bytes(16)
    }

    #[tokio::test]
    async fn test_put_then_lookup_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, small_config(), Arc::new(SystemClock)).await;

        let temp = write_partial(&store, "dQw4w9WgXcQ", "m4a", 4096).await;
        let entry = store
            .put("dQw4w9WgXcQ", &temp, 4096, Some("Never Gonna Give You Up"))
            .await
            .unwrap();

        assert_eq!(
            entry.local_path.file_name().unwrap().to_str().unwrap(),
            "dQw4w9WgXcQ_Never_Gonna_Give_You_Up.m4a"
        );
        assert!(!temp.exists());

        let found = store.lookup("dQw4w9WgXcQ").await.unwrap().unwrap();
        assert_eq!(found.local_path, entry.local_path);
        assert_eq!(
            tokio::fs::metadata(&found.local_path).await.unwrap().len(),
            4096
        );
    }

    #[tokio::test]
    async fn test_lookup_self_heals_after_out_of_band_delete() {
        let dir = TempDir::new().unwrap();
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let store = open_store(&dir, small_config(), Arc::new(SystemClock))
            .await
            .with_event_bus(bus);

        let temp = write_partial(&store, "abc", "mp3", 1024).await;
        let entry = store.put("abc", &temp, 1024, None).await.unwrap();
        assert_eq!(store.total_size_bytes().await.unwrap(), 1024);

        tokio::fs::remove_file(&entry.local_path).await.unwrap();

        assert!(store.lookup("abc").await.unwrap().is_none());
        assert!(!store.contains("abc").await);
        assert_eq!(store.total_size_bytes().await.unwrap(), 0);

        let mut saw_invalidated = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, CoreEvent::Cache(CacheEvent::EntryInvalidated { .. })) {
                saw_invalidated = true;
            }
        }
        assert!(saw_invalidated);
    }

    #[tokio::test]
    async fn test_undersized_file_is_deleted_on_lookup() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, small_config(), Arc::new(SystemClock)).await;

        let temp = write_partial(&store, "abc", "mp3", 1024).await;
        let entry = store.put("abc", &temp, 1024, None).await.unwrap();
        tokio::fs::write(&entry.local_path, b"tiny").await.unwrap();

        assert!(store.lookup("abc").await.unwrap().is_none());
        assert!(!entry.local_path.exists());
    }

    #[tokio::test]
    async fn test_put_replaces_prior_file() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, small_config(), Arc::new(SystemClock)).await;

        let first = write_partial(&store, "abc", "mp3", 512).await;
        let old = store.put("abc", &first, 512, Some("Old")).await.unwrap();

        let second = write_partial(&store, "abc", "mp3", 768).await;
        let new = store.put("abc", &second, 768, Some("New")).await.unwrap();

        assert!(!old.local_path.exists());
        assert!(new.local_path.exists());
        assert_eq!(store.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unsafe_keys_are_hashed() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, small_config(), Arc::new(SystemClock)).await;

        let key = "https://cdn.example.com/a.mp3?sig=xyz";
        let temp = write_partial(&store, key, "mp3", 256).await;
        let entry = store.put(key, &temp, 256, Some("A")).await.unwrap();

        let name = entry.local_path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_A.mp3"));
        assert!(!name.contains("https"));
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, small_config(), Arc::new(SystemClock)).await;
        let temp = write_partial(&store, "x", "mp3", 64).await;

        assert!(matches!(
            store.put("  ", &temp, 64, None).await,
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_lru_eviction_keeps_new_entry() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new();
        let config = small_config().with_max_size(2048);
        let store = open_store(&dir, config, clock.clone()).await;

        for key in ["a", "b"] {
            let temp = write_partial(&store, key, "mp3", 1000).await;
            store.put(key, &temp, 1000, None).await.unwrap();
            clock.advance(10);
        }

        // touch "a" so "b" becomes least recently used
        store.lookup("a").await.unwrap().unwrap();
        clock.advance(10);

        let temp = write_partial(&store, "c", "mp3", 1000).await;
        store.put("c", &temp, 1000, None).await.unwrap();

        assert!(store.contains("a").await);
        assert!(!store.contains("b").await);
        assert!(store.contains("c").await);
    }

    #[tokio::test]
    async fn test_largest_first_eviction() {
        let dir = TempDir::new().unwrap();
        let config = small_config()
            .with_max_size(3000)
            .with_eviction_policy(EvictionPolicy::LargestFirst);
        let store = open_store(&dir, config, Arc::new(SystemClock)).await;

        for (key, size) in [("big", 2000usize), ("small", 500)] {
            let temp = write_partial(&store, key, "mp3", size).await;
            store.put(key, &temp, size as u64, None).await.unwrap();
        }

        let temp = write_partial(&store, "new", "mp3", 1000).await;
        store.put("new", &temp, 1000, None).await.unwrap();

        assert!(!store.contains("big").await);
        assert!(store.contains("small").await);
        assert!(store.contains("new").await);
    }

    #[tokio::test]
    async fn test_oversized_single_entry_is_kept() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, small_config().with_max_size(100), Arc::new(SystemClock)).await;

        let temp = write_partial(&store, "huge", "mp3", 500).await;
        store.put("huge", &temp, 500, None).await.unwrap();
        assert!(store.contains("huge").await);

        let stats = store.stats().await.unwrap();
        assert!(stats.is_full());
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_index_survives_reopen_and_partials_are_cleaned() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir, small_config(), Arc::new(SystemClock)).await;
            let temp = write_partial(&store, "abc", "m4a", 2048).await;
            store.put("abc", &temp, 2048, Some("Song")).await.unwrap();
            write_partial(&store, "leftover", "m4a", 99).await;
        }

        let store = open_store(&dir, small_config(), Arc::new(SystemClock)).await;
        let entry = store.lookup("abc").await.unwrap().unwrap();
        assert_eq!(entry.title.as_deref(), Some("Song"));

        let mut partials = tokio::fs::read_dir(store.partial_dir()).await.unwrap();
        assert!(partials.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_index_starts_empty() {
        let dir = TempDir::new().unwrap();
        let tracks = dir.path().join("tracks");
        tokio::fs::create_dir_all(&tracks).await.unwrap();
        tokio::fs::write(tracks.join(INDEX_FILE), b"{not json")
            .await
            .unwrap();

        let store = open_store(&dir, small_config(), Arc::new(SystemClock)).await;
        assert!(store.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_prune_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, small_config(), Arc::new(SystemClock)).await;

        let mut paths = Vec::new();
        for key in ["a", "b", "c"] {
            let temp = write_partial(&store, key, "mp3", 128).await;
            paths.push(store.put(key, &temp, 128, None).await.unwrap().local_path);
        }

        tokio::fs::remove_file(&paths[0]).await.unwrap();
        assert_eq!(store.prune().await.unwrap(), 1);
        assert_eq!(store.entries().await.len(), 2);

        assert!(store.remove("b").await.unwrap());
        assert!(!store.remove("b").await.unwrap());

        assert_eq!(store.clear().await.unwrap(), 1);
        assert_eq!(store.total_size_bytes().await.unwrap(), 0);
        assert!(store.tracks_dir().join(INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn test_hits_persist_access_time_lazily() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new();
        let store = open_store(&dir, small_config(), clock.clone()).await;
        let index_path = store.tracks_dir().join(INDEX_FILE);

        let temp = write_partial(&store, "abc", "mp3", 256).await;
        let created = store.put("abc", &temp, 256, None).await.unwrap().created_at;
        clock.advance(60);

        let hit = store.lookup("abc").await.unwrap().unwrap();
        assert_eq!(hit.last_accessed_at, created + chrono::Duration::seconds(60));

        assert_eq!(accessed_on_disk(&index_path).await, created);

        assert!(store.flush().await.unwrap());
        assert_eq!(accessed_on_disk(&index_path).await, hit.last_accessed_at);
        assert!(!store.flush().await.unwrap());
    }
}
