//! In-memory chunk store, usable as a development backend and as the test
//! double for the engine's integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use crate::connection::ConnectOptions;
use crate::error::{ConnectionError, StoreError};
use crate::store::{
    ChunkStore, CompletedUpload, Connect, FileId, StoreClient, UploadOptions, UploadSink,
};

const FAULT_CHANNEL_CAPACITY: usize = 16;

/// One file held by the in-memory store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Identifier assigned on completion.
    pub id: FileId,
    /// Stored filename.
    pub filename: String,
    /// Chunk size the file was declared with.
    pub chunk_size: u32,
    /// Declared content type, if any.
    pub content_type: Option<String>,
    /// Metadata document attached at upload time.
    pub metadata: Option<serde_json::Value>,
    /// Raw stored bytes.
    pub data: Vec<u8>,
    /// Hex-encoded SHA-256 of the stored bytes.
    pub sha256: String,
    /// Completion timestamp.
    pub upload_date: DateTime<Utc>,
}

#[derive(Debug)]
struct Inner {
    buckets: Mutex<HashMap<String, Vec<StoredObject>>>,
    faults: broadcast::Sender<StoreError>,
}

/// In-memory chunked file store keyed by bucket name.
///
/// Cloning is shallow; clones share the same object map.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (faults, _) = broadcast::channel(FAULT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                buckets: Mutex::new(HashMap::new()),
                faults,
            }),
        }
    }

    /// Looks up a stored file by bucket and identifier.
    pub fn find(&self, bucket: &str, id: &FileId) -> Option<StoredObject> {
        let wanted = id.canonical();
        let buckets = lock(&self.inner.buckets);
        buckets
            .get(bucket)?
            .iter()
            .find(|object| object.id.canonical() == wanted)
            .cloned()
    }

    /// Returns the number of files stored in a bucket.
    pub fn count(&self, bucket: &str) -> usize {
        lock(&self.inner.buckets)
            .get(bucket)
            .map_or(0, Vec::len)
    }

    /// Feeds a fault into the store's native error stream.
    pub fn inject_fault(&self, error: StoreError) {
        let _ = self.inner.faults.send(error);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl ChunkStore for MemoryStore {
    async fn open_upload_stream(
        &self,
        bucket: &str,
        filename: &str,
        options: UploadOptions,
    ) -> Result<Box<dyn UploadSink>, StoreError> {
        Ok(Box::new(MemorySink {
            inner: Arc::clone(&self.inner),
            bucket: bucket.to_owned(),
            filename: filename.to_owned(),
            options,
            hasher: Sha256::new(),
            data: Vec::new(),
        }))
    }

    async fn delete(&self, bucket: &str, id: &FileId) -> Result<(), StoreError> {
        let wanted = id.canonical();
        let mut buckets = lock(&self.inner.buckets);
        let objects = buckets.get_mut(bucket).ok_or_else(|| StoreError::NotFound {
            bucket: bucket.to_owned(),
            id: id.to_string(),
        })?;

        let position = objects
            .iter()
            .position(|object| object.id.canonical() == wanted)
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_owned(),
                id: id.to_string(),
            })?;
        objects.remove(position);
        Ok(())
    }

    fn error_stream(&self) -> Option<broadcast::Receiver<StoreError>> {
        Some(self.inner.faults.subscribe())
    }
}

#[derive(Debug)]
struct MemorySink {
    inner: Arc<Inner>,
    bucket: String,
    filename: String,
    options: UploadOptions,
    hasher: Sha256,
    data: Vec<u8>,
}

#[async_trait::async_trait]
impl UploadSink for MemorySink {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StoreError> {
        self.hasher.update(&chunk);
        self.data.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<CompletedUpload, StoreError> {
        let sha256 = hex::encode(self.hasher.finalize());
        let length = self.data.len() as u64;
        let upload_date = Utc::now();
        let id = self.options.id.clone().unwrap_or_else(FileId::generate);

        let object = StoredObject {
            id: id.clone(),
            filename: self.filename,
            chunk_size: self.options.chunk_size,
            content_type: self.options.content_type,
            metadata: self.options.metadata,
            data: self.data,
            sha256: sha256.clone(),
            upload_date,
        };
        lock(&self.inner.buckets)
            .entry(self.bucket)
            .or_default()
            .push(object);

        Ok(CompletedUpload {
            id,
            length,
            sha256,
            upload_date,
        })
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        // Nothing was inserted yet; dropping the buffer is the teardown.
        Ok(())
    }
}

/// Connection-scope handle over a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    store: MemoryStore,
}

impl MemoryClient {
    /// Wraps an existing store.
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait::async_trait]
impl StoreClient for MemoryClient {
    fn database(&self, _name: Option<&str>) -> Arc<dyn ChunkStore> {
        // The in-memory engine holds a single database scope.
        Arc::new(self.store.clone())
    }

    fn error_stream(&self) -> Option<broadcast::Receiver<StoreError>> {
        self.store.error_stream()
    }
}

/// Driver that connects `memory://` connection strings to a shared
/// [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    /// Creates a connector backed by the given store.
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    /// Returns the store every successful connection resolves to.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait::async_trait]
impl Connect for MemoryConnector {
    async fn connect(
        &self,
        uri: &str,
        _options: &ConnectOptions,
    ) -> Result<Arc<dyn StoreClient>, ConnectionError> {
        if !uri.starts_with("memory://") {
            return Err(ConnectionError::new(format!(
                "invalid connection string: {uri}"
            )));
        }
        Ok(Arc::new(MemoryClient::new(self.store.clone())))
    }
}
