//! Per-upload orchestration: readiness, configuration, streaming, and the
//! reconciliation of each upload into exactly one terminal outcome.

use futures::StreamExt;

use crate::error::{StorageError, StreamError};
use crate::events::StorageEvent;
use crate::settings::UploadContext;
use crate::store::{ByteStream, FileId, FileRecord, UploadOptions};
use crate::GridStorage;

impl GridStorage {
    /// Persists one upload into the chunk store.
    ///
    /// Waits for the readiness gate, resolves the file policy, then pipes
    /// the source into a store write stream one chunk at a time, so the
    /// source is only read as fast as the store accepts it. The returned
    /// future resolves exactly once per call; on success the `file` event
    /// is published strictly before resolution.
    pub async fn handle_upload(
        &self,
        ctx: UploadContext,
        stream: ByteStream,
    ) -> Result<FileRecord, StorageError> {
        let correlation_id = ctx.correlation_id;
        match self.process_upload(&ctx, stream).await {
            Ok(record) => {
                tracing::debug!(
                    %correlation_id,
                    filename = %record.filename,
                    size = record.size,
                    "upload stored"
                );
                self.events.emit(StorageEvent::File(record.clone()));
                Ok(record)
            }
            Err(error) => {
                self.publish_upload_failure(&error, correlation_id);
                Err(error)
            }
        }
    }

    async fn process_upload(
        &self,
        ctx: &UploadContext,
        mut stream: ByteStream,
    ) -> Result<FileRecord, StorageError> {
        // A failed gate short-circuits before configuration or streaming;
        // every upload sees the same shared connection error.
        let conn = self
            .gate
            .ready(&self.events)
            .await
            .map_err(StorageError::Connection)?;

        let settings = self.file_config.resolve(ctx).await?;
        if settings.disabled {
            return Err(StorageError::Skipped);
        }

        tracing::debug!(
            correlation_id = %ctx.correlation_id,
            bucket = %settings.bucket_name,
            filename = %settings.filename,
            "opening upload stream"
        );
        let mut sink = conn
            .db
            .open_upload_stream(
                &settings.bucket_name,
                &settings.filename,
                UploadOptions {
                    chunk_size: settings.chunk_size,
                    content_type: settings.content_type.clone(),
                    metadata: settings.metadata.clone(),
                    id: settings.id.clone(),
                },
            )
            .await
            .map_err(StorageError::Store)?;

        // Pull-based pipe: the first error from either side wins and tears
        // the write stream down so a truncated upload never finishes.
        while let Some(next) = stream.next().await {
            match next {
                Ok(chunk) => {
                    if let Err(err) = sink.write_chunk(chunk).await {
                        let _ = sink.abort().await;
                        return Err(StreamError::Write(err.to_string()).into());
                    }
                }
                Err(err) => {
                    let _ = sink.abort().await;
                    return Err(StreamError::Source(err.to_string()).into());
                }
            }
        }

        let done = sink
            .finish()
            .await
            .map_err(|err| StorageError::Stream(StreamError::Write(err.to_string())))?;

        Ok(FileRecord {
            id: done.id,
            filename: settings.filename,
            bucket_name: settings.bucket_name,
            chunk_size: settings.chunk_size,
            size: done.length,
            content_type: settings.content_type,
            upload_date: done.upload_date,
            sha256: done.sha256,
        })
    }

    /// Deletes the stored file a previously returned record points at.
    pub async fn remove_file(&self, record: &FileRecord) -> Result<(), StorageError> {
        self.delete(&record.bucket_name, &record.id).await
    }

    /// Deletes a stored file by bucket and identifier. The store's error
    /// is propagated verbatim; nothing is swallowed or retried.
    pub async fn delete(&self, bucket: &str, id: &FileId) -> Result<(), StorageError> {
        let conn = self
            .gate
            .ready(&self.events)
            .await
            .map_err(StorageError::Connection)?;

        match conn.db.delete(bucket, id).await {
            Ok(()) => {
                tracing::debug!(%bucket, %id, "stored file removed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%bucket, %id, error = %err, "removal failed");
                self.events.emit(StorageEvent::DbError(err.clone()));
                Err(StorageError::Store(err))
            }
        }
    }

    fn publish_upload_failure(&self, error: &StorageError, correlation_id: uuid::Uuid) {
        match error {
            // The gate already published `connectionFailed` once; a policy
            // skip is a policy decision, not a fault.
            StorageError::Connection(_) | StorageError::Skipped => {}
            StorageError::Store(err) => {
                tracing::warn!(%correlation_id, error = %err, "upload rejected by store");
                self.events.emit(StorageEvent::DbError(err.clone()));
            }
            other => {
                tracing::warn!(%correlation_id, error = %other, "upload failed");
                self.events.emit(StorageEvent::StreamError {
                    error: other.clone(),
                    correlation_id,
                });
            }
        }
    }
}
