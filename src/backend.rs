// =============================================================================
// ALERT LOG BACKENDS
// =============================================================================
// The alert log is persisted as ONE named blob: a JSON array of log entries.
// A backend only knows how to read, replace and delete that blob. All log
// semantics (retention, ordering, ids) live in the store (store.rs), so every
// backend gets identical behaviour.
//
// AVAILABLE BACKENDS:
// - MemoryBackend: process memory, used by tests and ALERT_LOG_BACKEND=memory
// - FileBackend:   a JSON file on local disk (default)
// - RedisBackend:  a single Redis key
//
// LEARNING NOTES:
// - The trait returns `impl Future + Send` so the store can be used from
//   axum handlers, which must be Send
// - Implementations are free to write the methods as plain `async fn`
// - AnyBackend is an enum over the concrete backends; the application picks
//   one at startup without needing trait objects
// =============================================================================

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use crate::config::LogBackendConfig;
use crate::error::StorageError;

// =============================================================================
// BACKEND TRAIT
// =============================================================================
pub trait LogBackend: Send + Sync {
    /// Read the raw blob. `Ok(None)` means nothing has been stored yet.
    fn read(&self) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    /// Replace the blob
    fn write(&self, payload: String) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Delete the blob. Deleting a missing blob is not an error.
    fn remove(&self) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Whether the backing medium is reachable
    fn health_check(&self) -> impl Future<Output = bool> + Send;

    /// Short name used in logs
    fn kind(&self) -> &'static str;
}

// =============================================================================
// MEMORY BACKEND
// =============================================================================
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blob: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing payload (e.g. one written by another client)
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(payload.into())),
        }
    }
}

impl LogBackend for MemoryBackend {
    async fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.blob.lock().await.clone())
    }

    async fn write(&self, payload: String) -> Result<(), StorageError> {
        *self.blob.lock().await = Some(payload);
        Ok(())
    }

    async fn remove(&self) -> Result<(), StorageError> {
        *self.blob.lock().await = None;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// FILE BACKEND
// =============================================================================
// Writes go to a sibling temp file that is then renamed over the log, so a
// crash mid-write leaves either the old or the new blob, never half of one.
// -----------------------------------------------------------------------------
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    async fn ensure_parent(&self) -> std::io::Result<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                tokio::fs::create_dir_all(parent).await
            }
            _ => Ok(()),
        }
    }
}

impl LogBackend for FileBackend {
    async fn read(&self) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read(format!("{}: {e}", self.path.display()))),
        }
    }

    async fn write(&self, payload: String) -> Result<(), StorageError> {
        let describe = |e: std::io::Error| StorageError::Write(format!("{}: {e}", self.path.display()));

        self.ensure_parent().await.map_err(describe)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, payload).await.map_err(describe)?;
        tokio::fs::rename(&temp, &self.path).await.map_err(describe)?;
        Ok(())
    }

    async fn remove(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Write(format!("{}: {e}", self.path.display()))),
        }
    }

    async fn health_check(&self) -> bool {
        self.ensure_parent().await.is_ok()
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

// =============================================================================
// REDIS BACKEND
// =============================================================================
// The whole log is one string value under a fixed key.
//
// LEARNING NOTE:
// ConnectionManager reconnects automatically and is cheap to clone; each
// command works on a clone because query_async needs `&mut`.
// -----------------------------------------------------------------------------
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    key: String,
}

impl RedisBackend {
    pub async fn connect(redis_url: &str, key: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid REDIS_URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            conn,
            key: key.into(),
        })
    }
}

impl LogBackend for RedisBackend {
    async fn read(&self) -> Result<Option<String>, StorageError> {
        redis::cmd("GET")
            .arg(&self.key)
            .query_async::<_, Option<String>>(&mut self.conn.clone())
            .await
            .map_err(|e| StorageError::Read(e.to_string()))
    }

    async fn write(&self, payload: String) -> Result<(), StorageError> {
        redis::cmd("SET")
            .arg(&self.key)
            .arg(payload)
            .query_async::<_, ()>(&mut self.conn.clone())
            .await
            .map_err(|e| StorageError::Write(e.to_string()))
    }

    async fn remove(&self) -> Result<(), StorageError> {
        redis::cmd("DEL")
            .arg(&self.key)
            .query_async::<_, ()>(&mut self.conn.clone())
            .await
            .map_err(|e| StorageError::Write(e.to_string()))
    }

    async fn health_check(&self) -> bool {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.conn.clone())
            .await
            .is_ok()
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}

// =============================================================================
// BACKEND SELECTION
// =============================================================================
pub enum AnyBackend {
    Memory(MemoryBackend),
    File(FileBackend),
    Redis(RedisBackend),
}

impl AnyBackend {
    /// Build the backend selected by configuration
    pub async fn connect(config: &LogBackendConfig) -> Result<Self> {
        let backend = match config {
            LogBackendConfig::Memory => AnyBackend::Memory(MemoryBackend::new()),
            LogBackendConfig::File { path } => AnyBackend::File(FileBackend::new(path)),
            LogBackendConfig::Redis { url, key } => {
                AnyBackend::Redis(RedisBackend::connect(url, key.as_str()).await?)
            }
        };
        Ok(backend)
    }
}

impl LogBackend for AnyBackend {
    async fn read(&self) -> Result<Option<String>, StorageError> {
        match self {
            AnyBackend::Memory(b) => b.read().await,
            AnyBackend::File(b) => b.read().await,
            AnyBackend::Redis(b) => b.read().await,
        }
    }

    async fn write(&self, payload: String) -> Result<(), StorageError> {
        match self {
            AnyBackend::Memory(b) => b.write(payload).await,
            AnyBackend::File(b) => b.write(payload).await,
            AnyBackend::Redis(b) => b.write(payload).await,
        }
    }

    async fn remove(&self) -> Result<(), StorageError> {
        match self {
            AnyBackend::Memory(b) => b.remove().await,
            AnyBackend::File(b) => b.remove().await,
            AnyBackend::Redis(b) => b.remove().await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AnyBackend::Memory(b) => b.health_check().await,
            AnyBackend::File(b) => b.health_check().await,
            AnyBackend::Redis(b) => b.health_check().await,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AnyBackend::Memory(b) => b.kind(),
            AnyBackend::File(b) => b.kind(),
            AnyBackend::Redis(b) => b.kind(),
        }
    }
}
