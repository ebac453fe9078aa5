// Segment slot storage. Workers put finished segments under their manifest
// position; the assembler reads them back in order.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::hls::config::{HlsStorageConfig, StorageMode};

#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Store the bytes of slot `index`, replacing anything already there.
    async fn put(&self, index: usize, data: Bytes) -> io::Result<()>;

    /// Bytes of slot `index`, `None` when the slot was never filled.
    async fn get(&self, index: usize) -> io::Result<Option<Bytes>>;

    /// Number of filled slots.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the store selected by `config`.
pub fn create_store(config: &HlsStorageConfig) -> io::Result<Box<dyn SegmentStore>> {
    Ok(match config.mode {
        StorageMode::Memory => Box::new(MemoryStore::new()),
        StorageMode::Disk => Box::new(DiskStore::new(config.temp_dir.as_deref())?),
    })
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<BTreeMap<usize, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn put(&self, index: usize, data: Bytes) -> io::Result<()> {
        self.slots.lock().insert(index, data);
        Ok(())
    }

    async fn get(&self, index: usize) -> io::Result<Option<Bytes>> {
        Ok(self.slots.lock().get(&index).cloned())
    }

    fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// One `{index}.ts` file per slot inside a temporary directory that is
/// removed when the store is dropped.
#[derive(Debug)]
pub struct DiskStore {
    dir: TempDir,
    filled: Mutex<usize>,
}

impl DiskStore {
    pub fn new(parent: Option<&Path>) -> io::Result<Self> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("vodrip-");
            builder
        };
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "Created segment directory");
        Ok(Self {
            dir,
            filled: Mutex::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn slot_path(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("{index}.ts"))
    }
}

#[async_trait]
impl SegmentStore for DiskStore {
    async fn put(&self, index: usize, data: Bytes) -> io::Result<()> {
        let path = self.slot_path(index);
        let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
        // A slot only ever holds a complete segment; partial writes stay in
        // the `.part` file and are discarded.
        let part = path.with_extension("ts.part");
        if let Err(e) = write_then_rename(&part, &path, &data).await {
            if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(
                        path = %part.display(),
                        error = %cleanup,
                        "Failed to remove partial segment"
                    );
                }
            }
            return Err(e);
        }
        if !existed {
            *self.filled.lock() += 1;
        }
        Ok(())
    }

    async fn get(&self, index: usize) -> io::Result<Option<Bytes>> {
        match tokio::fs::read(self.slot_path(index)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn len(&self) -> usize {
        *self.filled.lock()
    }
}

async fn write_then_rename(part: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    tokio::fs::write(part, data).await?;
    tokio::fs::rename(part, path).await
}
