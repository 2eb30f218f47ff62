//! Per-upload file settings and the policy forms that produce them.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{BoxError, ConfigurationError};
use crate::store::{FileId, DEFAULT_BUCKET_NAME, DEFAULT_CHUNK_SIZE_BYTES};

/// Metadata describing one incoming upload, supplied by the host pipeline.
#[derive(Debug, Clone)]
pub struct UploadContext {
    /// Original filename declared by the uploader, if any.
    pub original_name: Option<String>,
    /// Declared content type of the incoming part.
    pub content_type: Option<mime::Mime>,
    /// Size hint from the request, when the host knows one.
    pub size_hint: Option<u64>,
    /// Correlation token tying events back to this upload.
    pub correlation_id: Uuid,
}

impl UploadContext {
    /// Creates a context with a fresh correlation token.
    pub fn new() -> Self {
        Self {
            original_name: None,
            content_type: None,
            size_hint: None,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Sets the uploader-declared filename.
    pub fn original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = Some(name.into());
        self
    }

    /// Sets the declared content type.
    pub fn content_type(mut self, mime: mime::Mime) -> Self {
        self.content_type = Some(mime);
        self
    }

    /// Sets the request's size hint.
    pub fn size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }
}

impl Default for UploadContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical per-upload configuration, immutable once resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSettings {
    /// Bucket the file is written into.
    pub bucket_name: String,
    /// Target filename inside the bucket.
    pub filename: String,
    /// Chunk size in bytes.
    pub chunk_size: u32,
    /// Content type stored with the file.
    pub content_type: Option<String>,
    /// Arbitrary metadata document stored with the file.
    pub metadata: Option<Value>,
    /// Identifier override; the store assigns one when unset.
    pub id: Option<FileId>,
    /// When true, the upload is rejected by policy instead of stored.
    pub disabled: bool,
}

/// Sync policy function type.
pub type SyncPolicy = dyn Fn(&UploadContext) -> Result<Value, BoxError> + Send + Sync;
/// Async policy function type.
pub type AsyncPolicy =
    dyn Fn(&UploadContext) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync;
/// Suspend/resume policy function type; the last yielded value wins.
pub type StreamPolicy =
    dyn Fn(&UploadContext) -> BoxStream<'static, Result<Value, BoxError>> + Send + Sync;

/// The ways a caller can express per-upload file settings.
///
/// Every form funnels through [`FileConfig::resolve`], so a policy error is
/// surfaced identically whether the policy is a constant, a plain function,
/// an async function, or a suspend/resume stream.
#[derive(Clone, Default)]
pub enum FileConfig {
    /// Use defaults for every upload.
    #[default]
    Defaults,
    /// A constant settings value, validated per upload.
    Constant(Value),
    /// A plain function evaluated per upload.
    SyncFn(Arc<SyncPolicy>),
    /// A function returning a deferred settings value.
    AsyncFn(Arc<AsyncPolicy>),
    /// A function returning a stream driven to completion; its final item
    /// is the settings value.
    StreamFn(Arc<StreamPolicy>),
}

impl fmt::Debug for FileConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defaults => f.write_str("Defaults"),
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::SyncFn(_) => f.write_str("SyncFn(..)"),
            Self::AsyncFn(_) => f.write_str("AsyncFn(..)"),
            Self::StreamFn(_) => f.write_str("StreamFn(..)"),
        }
    }
}

impl FileConfig {
    /// Constant settings applied to every upload.
    pub fn constant(value: Value) -> Self {
        Self::Constant(value)
    }

    /// Plain function evaluated once per upload.
    pub fn sync_fn<F>(f: F) -> Self
    where
        F: Fn(&UploadContext) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::SyncFn(Arc::new(f))
    }

    /// Function producing a deferred settings value per upload.
    pub fn async_fn<F>(f: F) -> Self
    where
        F: Fn(&UploadContext) -> BoxFuture<'static, Result<Value, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        Self::AsyncFn(Arc::new(f))
    }

    /// Suspend/resume function producing a stream of settings values per
    /// upload; the resolver drives it to completion.
    pub fn stream_fn<F>(f: F) -> Self
    where
        F: Fn(&UploadContext) -> BoxStream<'static, Result<Value, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        Self::StreamFn(Arc::new(f))
    }

    /// Evaluates the policy against one upload and canonicalizes the
    /// result, applying defaults for unset fields.
    pub async fn resolve(&self, ctx: &UploadContext) -> Result<FileSettings, ConfigurationError> {
        let raw = match self {
            Self::Defaults => Value::Null,
            Self::Constant(value) => value.clone(),
            Self::SyncFn(policy) => policy(ctx).map_err(policy_error)?,
            Self::AsyncFn(policy) => policy(ctx).await.map_err(policy_error)?,
            Self::StreamFn(policy) => {
                let mut stream = policy(ctx);
                let mut last = Value::Null;
                while let Some(item) = stream.next().await {
                    last = item.map_err(policy_error)?;
                }
                last
            }
        };
        FileSettings::from_value(raw, ctx)
    }
}

fn policy_error(reason: BoxError) -> ConfigurationError {
    ConfigurationError::Policy(reason.to_string())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    bucket_name: Option<String>,
    filename: Option<String>,
    chunk_size: Option<u32>,
    content_type: Option<String>,
    metadata: Option<Value>,
    id: Option<String>,
    #[serde(default)]
    disabled: bool,
}

impl FileSettings {
    /// Validates a raw policy value and fills unset fields with defaults.
    fn from_value(raw: Value, ctx: &UploadContext) -> Result<Self, ConfigurationError> {
        let raw = match raw {
            Value::Null => RawSettings::default(),
            Value::Object(_) => serde_json::from_value(raw)
                .map_err(|err| ConfigurationError::InvalidSettings(err.to_string()))?,
            other => {
                return Err(ConfigurationError::InvalidSettingsType {
                    kind: json_type_name(&other),
                })
            }
        };

        Ok(Self {
            bucket_name: raw.bucket_name.unwrap_or_else(|| DEFAULT_BUCKET_NAME.to_owned()),
            filename: raw.filename.unwrap_or_else(default_filename),
            chunk_size: raw.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE_BYTES),
            content_type: raw
                .content_type
                .or_else(|| ctx.content_type.as_ref().map(ToString::to_string)),
            metadata: raw.metadata,
            // Identifier overrides are passed through unvalidated; the
            // store decides whether the representation is acceptable.
            id: raw.id.and_then(|id| id.parse().ok()),
            disabled: raw.disabled,
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Collision-resistant default filename: 16 random bytes hex-encoded, plus
/// a monotonic suffix guarding against random collisions within a process.
fn default_filename() -> String {
    static SUFFIX: OnceLock<AtomicU32> = OnceLock::new();
    let suffix = SUFFIX.get_or_init(|| AtomicU32::new(rand::random()));
    let count = suffix.fetch_add(1, Ordering::Relaxed);

    let random: [u8; 16] = rand::random();
    format!("{}{:06x}", hex::encode(random), count & 0xff_ffff)
}
