//! External chunk-store seam: traits the backing store implements and the
//! data model shared across it.

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::sync::broadcast;

use crate::error::{BoxError, ConnectionError, StoreError};

/// Bundled in-memory chunk store implementation.
pub mod memory;
pub use memory::{MemoryClient, MemoryConnector, MemoryStore};

/// Default bucket name used when the file policy leaves it unset.
pub const DEFAULT_BUCKET_NAME: &str = "fs";

/// Standard chunk size of the backing store, 255 KiB.
pub const DEFAULT_CHUNK_SIZE_BYTES: u32 = 255 * 1024;

/// Boxed source byte stream piped into the store.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Identifier of a stored file, in either representation the external
/// store's identifier type accepts.
///
/// The engine passes identifiers through without pre-validation; rejecting
/// an unusable one is the store's responsibility.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum FileId {
    /// The store's native 12-byte binary identifier.
    ObjectId([u8; 12]),
    /// An equivalent string encoding.
    Text(String),
}

impl FileId {
    /// Generates a fresh identifier in the store's native layout:
    /// 4 timestamp bytes, 5 random bytes, a 3-byte monotonic counter.
    pub fn generate() -> Self {
        static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
        let counter = COUNTER.get_or_init(|| AtomicU32::new(rand::random()));
        let count = counter.fetch_add(1, Ordering::Relaxed);

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        let random: [u8; 5] = rand::random();

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&random);
        bytes[9..12].copy_from_slice(&count.to_be_bytes()[1..4]);
        Self::ObjectId(bytes)
    }

    /// Folds a hex-encoded text identifier into its binary form, when the
    /// encoding permits it. Stores use this to match identifiers across
    /// representations.
    pub fn canonical(&self) -> Self {
        match self {
            Self::ObjectId(_) => self.clone(),
            Self::Text(text) => match parse_object_id(text) {
                Some(bytes) => Self::ObjectId(bytes),
                None => self.clone(),
            },
        }
    }
}

fn parse_object_id(text: &str) -> Option<[u8; 12]> {
    if text.len() != 24 {
        return None;
    }
    let decoded = hex::decode(text).ok()?;
    let mut bytes = [0u8; 12];
    bytes.copy_from_slice(&decoded);
    Some(bytes)
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectId(bytes) => f.write_str(&hex::encode(bytes)),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({self})")
    }
}

impl FromStr for FileId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match parse_object_id(s) {
            Some(bytes) => Self::ObjectId(bytes),
            None => Self::Text(s.to_owned()),
        })
    }
}

/// The durable result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Identifier assigned by the store.
    pub id: FileId,
    /// Stored filename.
    pub filename: String,
    /// Bucket the file was written into.
    pub bucket_name: String,
    /// Chunk size the file was written with, in bytes.
    pub chunk_size: u32,
    /// Total stored size in bytes.
    pub size: u64,
    /// Declared content type, when one was known.
    pub content_type: Option<String>,
    /// Time the upload completed.
    pub upload_date: DateTime<Utc>,
    /// Hex-encoded SHA-256 of the stored bytes.
    pub sha256: String,
}

/// Per-file options passed to [`ChunkStore::open_upload_stream`].
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Chunk size to write with, in bytes.
    pub chunk_size: u32,
    /// Declared content type, stored alongside the file.
    pub content_type: Option<String>,
    /// Arbitrary metadata document attached to the file.
    pub metadata: Option<serde_json::Value>,
    /// Identifier override; the store generates one when absent.
    pub id: Option<FileId>,
}

/// Final state reported by a write stream on completion.
#[derive(Debug, Clone)]
pub struct CompletedUpload {
    /// Identifier assigned to the stored file.
    pub id: FileId,
    /// Total number of bytes written.
    pub length: u64,
    /// Hex-encoded SHA-256 of the written bytes.
    pub sha256: String,
    /// Completion timestamp.
    pub upload_date: DateTime<Utc>,
}

/// Chunked write stream opened against the store for one file.
#[async_trait::async_trait]
pub trait UploadSink: Send {
    /// Writes one chunk of source bytes. Resolves only once the store has
    /// accepted the chunk, which is what gives the pipe its backpressure.
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StoreError>;

    /// Finalizes the stream and returns the stored file's terminal state.
    async fn finish(self: Box<Self>) -> Result<CompletedUpload, StoreError>;

    /// Tears the stream down without persisting a record. Used when the
    /// source errors mid-transfer; a truncated upload must never finish.
    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}

/// Database-scope handle of the external chunk store.
#[async_trait::async_trait]
pub trait ChunkStore: Send + Sync + fmt::Debug {
    /// Opens a write stream for one file in the named bucket.
    async fn open_upload_stream(
        &self,
        bucket: &str,
        filename: &str,
        options: UploadOptions,
    ) -> Result<Box<dyn UploadSink>, StoreError>;

    /// Deletes a stored file by identifier, scoped to the named bucket.
    async fn delete(&self, bucket: &str, id: &FileId) -> Result<(), StoreError>;

    /// Native fault notifications, when the store exposes them.
    fn error_stream(&self) -> Option<broadcast::Receiver<StoreError>> {
        None
    }
}

/// Connection-scope handle of the external store.
#[async_trait::async_trait]
pub trait StoreClient: Send + Sync + fmt::Debug {
    /// Returns the database-scope handle, by name or the client's default.
    fn database(&self, name: Option<&str>) -> Arc<dyn ChunkStore>;

    /// Native fault notifications, when the client exposes them.
    fn error_stream(&self) -> Option<broadcast::Receiver<StoreError>> {
        None
    }

    /// Releases the connection. Only called by the engine for clients it
    /// opened itself from a connection string.
    async fn close(&self) {}
}

/// Driver seam turning a connection string into an open client.
#[async_trait::async_trait]
pub trait Connect: Send + Sync + fmt::Debug {
    /// Opens a new client for the given connection string.
    async fn connect(
        &self,
        uri: &str,
        options: &crate::connection::ConnectOptions,
    ) -> Result<Arc<dyn StoreClient>, ConnectionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct_and_hex_round_trip() {
        let first = FileId::generate();
        let second = FileId::generate();
        assert_ne!(first, second);

        let encoded = first.to_string();
        assert_eq!(encoded.len(), 24);
        let reparsed: FileId = encoded.parse().expect("infallible");
        assert_eq!(reparsed, first);
    }

    #[test]
    fn canonical_folds_hex_text_into_binary() {
        let id = FileId::generate();
        let text = FileId::Text(id.to_string());
        assert_eq!(text.canonical(), id);

        let opaque = FileId::Text("no-hex-here".to_owned());
        assert_eq!(opaque.canonical(), opaque);
    }
}
