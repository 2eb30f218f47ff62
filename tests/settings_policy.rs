#![allow(missing_docs)]

use std::sync::Arc;

use futures::stream;
use gridstore::{
    ConfigurationError, FileConfig, GridStorage, MemoryStore, StorageError, UploadContext,
    DEFAULT_CHUNK_SIZE_BYTES,
};
use serde_json::json;

#[tokio::test]
async fn non_object_settings_name_the_offending_type() {
    let ctx = UploadContext::new();

    let err = FileConfig::constant(json!(true))
        .resolve(&ctx)
        .await
        .expect_err("boolean settings should be rejected");
    assert!(matches!(
        err,
        ConfigurationError::InvalidSettingsType { kind: "boolean" }
    ));
    assert!(err.to_string().contains("boolean"));

    let err = FileConfig::constant(json!(42))
        .resolve(&ctx)
        .await
        .expect_err("numeric settings should be rejected");
    assert!(err.to_string().contains("number"));
}

#[tokio::test]
async fn policy_failures_surface_identically_across_function_forms() {
    let ctx = UploadContext::new();
    let policies = [
        FileConfig::sync_fn(|_ctx| Err("X".into())),
        FileConfig::async_fn(|_ctx| Box::pin(async { Err("X".into()) })),
        FileConfig::stream_fn(|_ctx| Box::pin(stream::iter([Err("X".into())]))),
    ];

    for policy in policies {
        let err = policy
            .resolve(&ctx)
            .await
            .expect_err("a failing policy should be rejected");
        assert!(matches!(err, ConfigurationError::Policy(_)));
        assert_eq!(err.to_string(), "X");
    }
}

#[tokio::test]
async fn stream_policy_is_driven_to_completion_and_the_last_value_wins() {
    let ctx = UploadContext::new();
    let policy = FileConfig::stream_fn(|_ctx| {
        Box::pin(stream::iter([
            Ok(json!({"filename": "draft"})),
            Ok(json!({"filename": "final"})),
        ]))
    });

    let settings = policy.resolve(&ctx).await.expect("policy should resolve");
    assert_eq!(settings.filename, "final");
}

#[tokio::test]
async fn defaults_fill_every_unset_field() {
    let ctx = UploadContext::new().content_type(mime::IMAGE_PNG);
    let settings = FileConfig::default()
        .resolve(&ctx)
        .await
        .expect("defaults should resolve");

    assert_eq!(settings.bucket_name, "fs");
    assert_eq!(settings.chunk_size, DEFAULT_CHUNK_SIZE_BYTES);
    assert_eq!(settings.content_type.as_deref(), Some("image/png"));
    assert_eq!(settings.filename.len(), 38);
    assert!(settings.filename.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(!settings.disabled);
}

#[tokio::test]
async fn explicit_fields_override_defaults() {
    let ctx = UploadContext::new().content_type(mime::TEXT_PLAIN);
    let settings = FileConfig::constant(json!({
        "bucketName": "avatars",
        "filename": "portrait.png",
        "chunkSize": 1024,
        "contentType": "image/png",
        "metadata": {"owner": "tests"},
    }))
    .resolve(&ctx)
    .await
    .expect("settings should resolve");

    assert_eq!(settings.bucket_name, "avatars");
    assert_eq!(settings.filename, "portrait.png");
    assert_eq!(settings.chunk_size, 1024);
    assert_eq!(settings.content_type.as_deref(), Some("image/png"));
    assert_eq!(settings.metadata, Some(json!({"owner": "tests"})));
}

#[tokio::test]
async fn disabled_settings_skip_the_upload_distinguishably() {
    let store = MemoryStore::new();
    let storage = GridStorage::builder()
        .db(Arc::new(store.clone()))
        .file_config(FileConfig::constant(json!({"disabled": true})))
        .build()
        .expect("builder should succeed");

    let err = storage
        .handle_upload(
            UploadContext::new(),
            Box::pin(stream::iter([Ok(bytes::Bytes::from_static(b"ignored"))])),
        )
        .await
        .expect_err("disabled settings should skip the upload");

    assert!(err.is_skipped());
    assert!(matches!(err, StorageError::Skipped));
    assert_eq!(store.count("fs"), 0);
}
