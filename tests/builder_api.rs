#![allow(missing_docs)]

use std::sync::Arc;

use gridstore::{ConfigurationError, GridStorage, MemoryConnector, MemoryStore};

#[test]
fn missing_connection_source_fails_synchronously_with_fixed_message() {
    let err = GridStorage::builder()
        .build()
        .expect_err("no connection source should be rejected");
    assert!(matches!(err, ConfigurationError::MissingConnectionSource));
    assert_eq!(
        err.to_string(),
        "Error creating storage engine. At least one of url or db option must be provided."
    );
}

#[test]
fn url_and_db_together_are_rejected() {
    let store = MemoryStore::new();
    let err = GridStorage::builder()
        .url("memory://uploads")
        .connector(MemoryConnector::new(store.clone()))
        .db(Arc::new(store))
        .build()
        .expect_err("conflicting connection sources should be rejected");
    assert!(matches!(
        err,
        ConfigurationError::ConflictingConnectionSource
    ));
}

#[test]
fn url_without_connector_is_rejected() {
    let err = GridStorage::builder()
        .url("memory://uploads")
        .build()
        .expect_err("a url without a connector should be rejected");
    assert!(matches!(err, ConfigurationError::MissingConnector));
}

#[test]
fn handles_are_unset_before_readiness() {
    let storage = GridStorage::new(Arc::new(MemoryStore::new()));
    assert!(storage.db().is_none());
    assert!(storage.client().is_none());
}

#[test]
fn builder_accepts_each_connection_form() {
    let store = MemoryStore::new();

    GridStorage::builder()
        .url("memory://uploads")
        .connector(MemoryConnector::new(store.clone()))
        .build()
        .expect("url form should validate");

    GridStorage::builder()
        .db(Arc::new(store.clone()))
        .build()
        .expect("handle form should validate");

    let deferred = MemoryStore::new();
    GridStorage::builder()
        .db_future(async move { Ok(gridstore::DbLike::Store(Arc::new(deferred))) })
        .build()
        .expect("deferred handle form should validate");
}
