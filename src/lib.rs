#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! GridFS-style chunked storage engine for multipart upload pipelines.
//!
//! `gridstore` sits between an upload-handling host and a chunked-file
//! store: it resolves a heterogeneous connection description into a ready
//! store handle exactly once, evaluates a per-upload file policy, and pipes
//! each source byte stream into a store write stream with backpressure,
//! reconciling every outcome into a single `Result` plus a best-effort
//! lifecycle event.
//!
//! ```no_run
//! use gridstore::{FileConfig, GridStorage, MemoryConnector, UploadContext};
//!
//! # async fn demo() -> Result<(), gridstore::StorageError> {
//! let storage = GridStorage::builder()
//!     .url("memory://uploads")
//!     .connector(MemoryConnector::default())
//!     .file_config(FileConfig::constant(serde_json::json!({
//!         "bucketName": "avatars",
//!     })))
//!     .build()?;
//!
//! let source = futures::stream::iter([Ok(bytes::Bytes::from_static(b"png bytes"))]);
//! let record = storage
//!     .handle_upload(UploadContext::new(), Box::pin(source))
//!     .await?;
//! storage.remove_file(&record).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast;

/// Fluent builder API.
pub mod builder;
/// Connection sources and normalization.
pub mod connection;
/// Error types exposed by this crate.
pub mod error;
/// Lifecycle event types.
pub mod events;
/// Readiness gate internals.
mod ready;
/// File settings policies and upload context.
pub mod settings;
/// Chunk store traits, data model, and the bundled memory backend.
pub mod store;
/// Upload orchestration and removal.
mod upload;

pub use builder::GridStorageBuilder;
pub use connection::{ConnectOptions, Connection, DbLike};
pub use error::{
    BoxError, ConfigurationError, ConnectionError, StorageError, StoreError, StreamError,
};
pub use events::StorageEvent;
pub use settings::{FileConfig, FileSettings, UploadContext};
pub use store::{
    ByteStream, ChunkStore, CompletedUpload, Connect, FileId, FileRecord, MemoryClient,
    MemoryConnector, MemoryStore, StoreClient, UploadOptions, UploadSink, DEFAULT_BUCKET_NAME,
    DEFAULT_CHUNK_SIZE_BYTES,
};

use crate::events::EventBus;
use crate::ready::ReadinessGate;

/// Chunked-file storage engine.
///
/// One instance owns one readiness gate, one file policy, and one event
/// publish point; any number of uploads may be in flight against it
/// concurrently.
#[derive(Debug)]
pub struct GridStorage {
    gate: ReadinessGate,
    file_config: FileConfig,
    events: EventBus,
}

impl GridStorage {
    /// Creates an engine over an already-open store handle with default
    /// file settings. No ownership of the handle is taken.
    pub fn new(db: Arc<dyn ChunkStore>) -> Self {
        use crate::connection::{ConnectionSource, DbSource};
        Self {
            gate: ReadinessGate::new(ConnectionSource::Handle {
                db: DbSource::Ready(DbLike::Store(db)),
                client: None,
            }),
            file_config: FileConfig::default(),
            events: EventBus::new(),
        }
    }

    /// Creates a fluent builder.
    pub fn builder() -> GridStorageBuilder {
        GridStorageBuilder::new()
    }

    /// Resolves the store connection, triggering it on first call and
    /// replaying the cached outcome on every later one.
    ///
    /// Concurrent callers during the pending window share a single
    /// underlying connection attempt, and every caller observes the same
    /// terminal value or the same shared error object.
    pub async fn ready(&self) -> Result<Connection, Arc<ConnectionError>> {
        self.gate.ready(&self.events).await
    }

    /// The resolved store handle; `None` until ready or if the connection
    /// failed.
    pub fn db(&self) -> Option<Arc<dyn ChunkStore>> {
        self.gate.current().map(|conn| conn.db)
    }

    /// The resolved client handle; `None` until ready, on failure, or when
    /// the engine was built from a bare store handle.
    pub fn client(&self) -> Option<Arc<dyn StoreClient>> {
        self.gate.current().and_then(|conn| conn.client)
    }

    /// Subscribes to lifecycle events published by this instance.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    /// Releases the client connection, but only when the engine opened it
    /// itself from a connection string. Externally-supplied handles are
    /// left untouched.
    pub async fn close(&self) {
        if let Some(conn) = self.gate.current() {
            if conn.owned {
                if let Some(client) = &conn.client {
                    client.close().await;
                }
            }
        }
    }
}
