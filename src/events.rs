use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{ConnectionError, StorageError, StoreError};
use crate::store::{ChunkStore, FileRecord, StoreClient};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Lifecycle notification published by a storage engine instance.
///
/// Events are purely observational; delivery is best-effort and never gates
/// the upload flow.
#[derive(Debug, Clone)]
pub enum StorageEvent {
    /// The store connection resolved.
    Connection {
        /// Database-scope handle the engine will write through.
        db: Arc<dyn ChunkStore>,
        /// Connection-scope handle, when one is known.
        client: Option<Arc<dyn StoreClient>>,
    },
    /// The store connection failed. Carries the same shared error object
    /// every `ready()` caller observes.
    ConnectionFailed(Arc<ConnectionError>),
    /// The store reported a fault, either natively or while serving an
    /// engine operation.
    DbError(StoreError),
    /// An in-flight upload failed.
    StreamError {
        /// The failure, as surfaced to the upload's caller.
        error: StorageError,
        /// Correlation token of the affected upload.
        correlation_id: Uuid,
    },
    /// An upload completed; carries the durable file record.
    File(FileRecord),
}

/// Per-instance publish point for [`StorageEvent`]s.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<StorageEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub(crate) fn emit(&self, event: StorageEvent) {
        let _ = self.tx.send(event);
    }
}
