#![allow(missing_docs)]

use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use gridstore::{
    ByteStream, FileId, GridStorage, MemoryStore, StorageError, StorageEvent, StoreError,
    UploadContext,
};

fn single_chunk_source(data: &'static [u8]) -> ByteStream {
    Box::pin(stream::iter([Ok::<_, gridstore::BoxError>(
        Bytes::from_static(data),
    )]))
}

#[tokio::test]
async fn removing_an_uploaded_file_leaves_no_matching_records() {
    let store = MemoryStore::new();
    let storage = GridStorage::new(Arc::new(store.clone()));

    let record = storage
        .handle_upload(UploadContext::new(), single_chunk_source(b"ephemeral"))
        .await
        .expect("upload should succeed");
    assert_eq!(store.count(&record.bucket_name), 1);

    storage
        .remove_file(&record)
        .await
        .expect("removal should succeed");
    assert_eq!(store.count(&record.bucket_name), 0);
    assert!(store.find(&record.bucket_name, &record.id).is_none());
}

#[tokio::test]
async fn string_encoded_identifiers_are_accepted_without_prevalidation() {
    let store = MemoryStore::new();
    let storage = GridStorage::new(Arc::new(store.clone()));

    let record = storage
        .handle_upload(UploadContext::new(), single_chunk_source(b"by text id"))
        .await
        .expect("upload should succeed");

    // The engine passes the hex rendition through untouched; matching the
    // representations is the store's job.
    let text_id = FileId::Text(record.id.to_string());
    storage
        .delete(&record.bucket_name, &text_id)
        .await
        .expect("text-encoded id should delete the same file");
    assert_eq!(store.count(&record.bucket_name), 0);
}

#[tokio::test]
async fn deleting_an_absent_identifier_propagates_not_found_verbatim() {
    let storage = GridStorage::new(Arc::new(MemoryStore::new()));
    let mut events = storage.subscribe();

    let missing = FileId::generate();
    let err = storage
        .delete("fs", &missing)
        .await
        .expect_err("an absent id should fail");

    match &err {
        StorageError::Store(StoreError::NotFound { .. }) => {}
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("not found"));

    let mut saw_db_error = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, StorageEvent::DbError(_)) {
            saw_db_error = true;
        }
    }
    assert!(saw_db_error);
}
