//! Audit persistence backends.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, RwLock};

use crate::audit::event::SecurityEvent;
use crate::audit::query::{apply_filter, AuditFilter, PagedResult};

#[derive(Debug, Error)]
pub enum AuditStoreError {
    #[error("audit store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit record encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only event storage with a query capability.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, event: SecurityEvent) -> Result<(), AuditStoreError>;

    async fn query(&self, filter: &AuditFilter) -> Result<PagedResult<SecurityEvent>, AuditStoreError>;
}

/// Events kept by [`MemoryAuditStore::new`].
pub const DEFAULT_MEMORY_CAPACITY: usize = 100_000;

/// Events held in process memory, oldest evicted once `capacity` is reached.
#[derive(Debug)]
pub struct MemoryAuditStore {
    capacity: usize,
    events: RwLock<VecDeque<SecurityEvent>>,
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, event: SecurityEvent) -> Result<(), AuditStoreError> {
        let mut events = self.events.write().await;
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<PagedResult<SecurityEvent>, AuditStoreError> {
        Ok(apply_filter(self.events.read().await.iter(), filter))
    }
}

/// JSON-lines file, one event per line.
///
/// Queries read the file on demand and keep only matching records.
#[derive(Debug)]
pub struct FileAuditStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAuditStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditStoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        tracing::info!(path = ?path, "Opened audit trail");

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_matching(&self, filter: &AuditFilter) -> Result<Vec<SecurityEvent>, AuditStoreError> {
        let reader = BufReader::new(File::open(&self.path).await?);
        let mut lines = reader.lines();
        let mut matched = Vec::new();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SecurityEvent>(&line) {
                Ok(event) if filter.matches(&event) => matched.push(event),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = ?self.path, line = line_no, error = %e, "Skipping malformed audit record");
                }
            }
        }
        Ok(matched)
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn append(&self, event: SecurityEvent) -> Result<(), AuditStoreError> {
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<PagedResult<SecurityEvent>, AuditStoreError> {
        // Appends wait so a query never sees a half-written line.
        let _guard = self.file.lock().await;
        let matched = self.read_matching(filter).await?;
        Ok(apply_filter(matched.iter(), filter))
    }
}
