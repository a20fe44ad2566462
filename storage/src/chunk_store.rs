//! On-disk chunk persistence for a datanode.
//!
//! Chunks live under a root directory with 256 two-hex-digit subdirectories;
//! a chunk with id `X` is stored at `<root>/<prefix>/<X>.chunk` next to a
//! `<X>.meta` file carrying the hex SHA-256 checksum and the byte length.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::error::{Result, StorageError};
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub size: i64,
    // None when the companion .meta file was lost; verification is skipped
    // until the chunk is re-stored
    pub checksum: Option<String>,
    pub created_at: SystemTime,
    pub last_accessed: SystemTime,
}

#[derive(Default)]
struct ChunkIndex {
    chunks: HashMap<String, ChunkMetadata>,
    used_space: i64,
}

struct StoreInner {
    root: PathBuf,
    capacity: i64,
    index: Mutex<ChunkIndex>,
    load: AtomicI32,
}

#[derive(Clone)]
pub struct ChunkStore {
    inner: Arc<StoreInner>,
}

impl ChunkStore {
    /// Opens the store rooted at `root`, creating the directory layout and
    /// rescanning any chunks a previous process left behind. Runs before the
    /// RPC server starts accepting requests.
    pub async fn open(root: impl Into<PathBuf>, capacity: i64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        for i in 0..256 {
            fs::create_dir_all(root.join(format!("{i:02x}"))).await?;
        }
        let store = Self {
            inner: Arc::new(StoreInner {
                root,
                capacity,
                index: Mutex::new(ChunkIndex::default()),
                load: AtomicI32::new(0),
            }),
        };
        store.load_existing_chunks().await?;
        {
            let index = store.inner.index.lock().unwrap();
            info!(
                root = %store.inner.root.display(),
                capacity = store.inner.capacity,
                chunks = index.chunks.len(),
                used_space = index.used_space,
                "Chunk store initialized"
            );
        }
        Ok(store)
    }

    async fn load_existing_chunks(&self) -> Result<()> {
        let mut index = ChunkIndex::default();
        let mut subdirs = fs::read_dir(&self.inner.root).await?;
        while let Some(subdir) = subdirs.next_entry().await? {
            if !subdir.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(subdir.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("chunk") {
                    continue;
                }
                let Some(chunk_id) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let size = entry.metadata().await?.len() as i64;
                let checksum = match fs::read_to_string(path.with_extension("meta")).await {
                    Ok(contents) => contents
                        .lines()
                        .next()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(str::to_owned),
                    Err(_) => None,
                };
                let now = SystemTime::now();
                index.chunks.insert(
                    chunk_id.to_owned(),
                    ChunkMetadata {
                        chunk_id: chunk_id.to_owned(),
                        size,
                        checksum,
                        created_at: now,
                        last_accessed: now,
                    },
                );
                index.used_space += size;
            }
        }
        *self.inner.index.lock().unwrap() = index;
        Ok(())
    }

    // First two characters of the id pick the subdirectory; short ids fall
    // back to "00".
    fn prefix_of(chunk_id: &str) -> &str {
        chunk_id.get(..2).unwrap_or("00")
    }

    fn chunk_path(&self, chunk_id: &str) -> PathBuf {
        self.inner
            .root
            .join(Self::prefix_of(chunk_id))
            .join(format!("{chunk_id}.chunk"))
    }

    fn meta_path(&self, chunk_id: &str) -> PathBuf {
        self.inner
            .root
            .join(Self::prefix_of(chunk_id))
            .join(format!("{chunk_id}.meta"))
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn capacity(&self) -> i64 {
        self.inner.capacity
    }

    pub fn used_space(&self) -> i64 {
        self.inner.index.lock().unwrap().used_space
    }

    pub fn free_space(&self) -> i64 {
        self.inner.capacity - self.used_space()
    }

    pub fn load(&self) -> i32 {
        self.inner.load.load(Ordering::SeqCst)
    }

    pub fn increment_load(&self) {
        self.inner.load.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_load(&self) {
        // clamps at zero
        let _ = self
            .inner
            .load
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                if v > 0 { Some(v - 1) } else { None }
            });
    }

    pub fn chunk_metadata(&self, chunk_id: &str) -> Option<ChunkMetadata> {
        self.inner.index.lock().unwrap().chunks.get(chunk_id).cloned()
    }

    /// Verifies that every indexed chunk still has its `.chunk` file on disk.
    /// Does not read payloads; missing files are logged and left in the index
    /// for a later `cleanup_orphans`.
    #[instrument(name = "chunk_store_health_check", skip(self))]
    pub async fn health_check(&self) -> bool {
        let chunk_ids: Vec<String> = {
            let index = self.inner.index.lock().unwrap();
            index.chunks.keys().cloned().collect()
        };
        let mut missing = 0;
        for chunk_id in chunk_ids {
            if !matches!(fs::try_exists(self.chunk_path(&chunk_id)).await, Ok(true)) {
                warn!(%chunk_id, "Missing chunk file");
                missing += 1;
            }
        }
        if missing > 0 {
            warn!(missing, "Health check found missing chunk files");
            return false;
        }
        true
    }

    /// Deletes every chunk whose id is not in `valid_ids`.
    #[instrument(name = "chunk_store_cleanup_orphans", skip(self, valid_ids))]
    pub async fn cleanup_orphans(&self, valid_ids: &[String]) {
        let valid: HashSet<&str> = valid_ids.iter().map(String::as_str).collect();
        let orphans: Vec<String> = {
            let index = self.inner.index.lock().unwrap();
            index
                .chunks
                .keys()
                .filter(|id| !valid.contains(id.as_str()))
                .cloned()
                .collect()
        };
        for chunk_id in orphans {
            match self.delete_chunk(&chunk_id).await {
                Ok(_) => info!(%chunk_id, "Cleaned up orphaned chunk"),
                Err(e) => warn!(%chunk_id, error = %e, "Failed to clean up orphaned chunk"),
            }
        }
    }
}

impl Storage for ChunkStore {
    #[instrument(name = "chunk_store_store", skip(self, data), fields(size = data.len()))]
    async fn store_chunk(&self, chunk_id: &str, data: &[u8]) -> Result<()> {
        {
            let index = self.inner.index.lock().unwrap();
            if index.used_space + data.len() as i64 > self.inner.capacity {
                return Err(StorageError::CapacityExceeded {
                    requested: data.len() as i64,
                    available: self.inner.capacity - index.used_space,
                });
            }
        }
        // payload goes to a temp path first so a reader of the same id sees
        // either the previous chunk or the new one, never a torn write
        let chunk_path = self.chunk_path(chunk_id);
        let tmp_path = chunk_path.with_extension("chunk.tmp");
        if let Err(e) = fs::write(&tmp_path, data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        fs::rename(&tmp_path, &chunk_path).await?;

        let checksum = hex::encode(Sha256::digest(data));
        let meta_contents = format!("{}\n{}\n", checksum, data.len());
        if let Err(e) = fs::write(self.meta_path(chunk_id), meta_contents).await {
            let _ = fs::remove_file(&chunk_path).await;
            return Err(e.into());
        }

        let mut index = self.inner.index.lock().unwrap();
        let previous_size = index.chunks.get(chunk_id).map(|previous| previous.size);
        if let Some(previous_size) = previous_size {
            index.used_space -= previous_size;
        }
        let now = SystemTime::now();
        index.chunks.insert(
            chunk_id.to_owned(),
            ChunkMetadata {
                chunk_id: chunk_id.to_owned(),
                size: data.len() as i64,
                checksum: Some(checksum.clone()),
                created_at: now,
                last_accessed: now,
            },
        );
        index.used_space += data.len() as i64;
        drop(index);
        info!(%chunk_id, size = data.len(), checksum = %&checksum[..8], "Stored chunk");
        Ok(())
    }

    #[instrument(name = "chunk_store_read", skip(self))]
    async fn read_chunk(&self, chunk_id: &str) -> Result<Vec<u8>> {
        let data = match fs::read(self.chunk_path(chunk_id)).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(chunk_id.to_owned()));
            }
            Err(e) => return Err(e.into()),
        };
        let computed = hex::encode(Sha256::digest(&data));
        let verified = {
            let mut index = self.inner.index.lock().unwrap();
            match index.chunks.get_mut(chunk_id) {
                Some(meta)
                    if meta
                        .checksum
                        .as_deref()
                        .is_some_and(|recorded| recorded != computed) =>
                {
                    // keep the index entry; a later cleanup may remove it
                    false
                }
                Some(meta) => {
                    meta.last_accessed = SystemTime::now();
                    true
                }
                None => true,
            }
        };
        if !verified {
            warn!(%chunk_id, "Checksum verification failed for chunk");
            return Err(StorageError::ChecksumMismatch {
                chunk_id: chunk_id.to_owned(),
            });
        }
        Ok(data)
    }

    #[instrument(name = "chunk_store_delete", skip(self))]
    async fn delete_chunk(&self, chunk_id: &str) -> Result<bool> {
        match fs::remove_file(self.chunk_path(chunk_id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        let _ = fs::remove_file(self.meta_path(chunk_id)).await;
        let mut index = self.inner.index.lock().unwrap();
        if let Some(previous) = index.chunks.remove(chunk_id) {
            index.used_space -= previous.size;
        }
        drop(index);
        info!(%chunk_id, "Deleted chunk");
        Ok(true)
    }

    async fn has_chunk(&self, chunk_id: &str) -> bool {
        self.inner.index.lock().unwrap().chunks.contains_key(chunk_id)
    }

    async fn stored_chunk_ids(&self) -> Vec<String> {
        self.inner.index.lock().unwrap().chunks.keys().cloned().collect()
    }
}
