use std::fmt;
use std::sync::Arc;

use crate::connection::{ClientSource, ConnectOptions, ConnectionSource, DbLike, DbSource};
use crate::error::{BoxError, ConfigurationError};
use crate::events::EventBus;
use crate::ready::ReadinessGate;
use crate::settings::FileConfig;
use crate::store::{ChunkStore, Connect, StoreClient};
use crate::GridStorage;

/// Builder for configuring a [`GridStorage`] engine.
///
/// Exactly one of [`url`](Self::url) and the `db` family must be supplied;
/// [`build`](Self::build) validates this synchronously.
#[derive(Default)]
pub struct GridStorageBuilder {
    url: Option<String>,
    options: ConnectOptions,
    connector: Option<Arc<dyn Connect>>,
    db: Option<DbSource>,
    client: Option<ClientSource>,
    file_config: FileConfig,
}

impl fmt::Debug for GridStorageBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridStorageBuilder")
            .field("url", &self.url)
            .field("options", &self.options)
            .field("connector", &self.connector)
            .field("db", &self.db)
            .field("client", &self.client)
            .field("file_config", &self.file_config)
            .finish()
    }
}

impl GridStorageBuilder {
    /// Creates a builder with no connection source configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects with a connection string; the opened client is owned by
    /// the engine and released by [`GridStorage::close`].
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Driver options used when connecting with a connection string.
    pub fn connect_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Driver used to open a client from the connection string.
    pub fn connector(mut self, connector: impl Connect + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Uses an already-open store handle; no ownership is taken.
    pub fn db(mut self, db: Arc<dyn ChunkStore>) -> Self {
        self.db = Some(DbSource::Ready(DbLike::Store(db)));
        self
    }

    /// Uses a deferred store handle. If the future settles to a client,
    /// the store handle is derived from it; a rejection becomes the
    /// connection error.
    pub fn db_future<F>(mut self, fut: F) -> Self
    where
        F: std::future::Future<Output = Result<DbLike, BoxError>> + Send + 'static,
    {
        self.db = Some(DbSource::Deferred(Box::pin(fut)));
        self
    }

    /// Supplies the low-level client alongside an externally-owned store
    /// handle.
    pub fn client(mut self, client: Arc<dyn StoreClient>) -> Self {
        self.client = Some(ClientSource::Ready(client));
        self
    }

    /// Supplies the low-level client as a deferred value.
    pub fn client_future<F>(mut self, fut: F) -> Self
    where
        F: std::future::Future<Output = Result<Arc<dyn StoreClient>, BoxError>> + Send + 'static,
    {
        self.client = Some(ClientSource::Deferred(Box::pin(fut)));
        self
    }

    /// Per-upload file settings policy.
    pub fn file_config(mut self, config: FileConfig) -> Self {
        self.file_config = config;
        self
    }

    /// Validates the connection input and builds the engine.
    pub fn build(self) -> Result<GridStorage, ConfigurationError> {
        let source = match (self.url, self.db) {
            (None, None) => return Err(ConfigurationError::MissingConnectionSource),
            (Some(_), Some(_)) => return Err(ConfigurationError::ConflictingConnectionSource),
            (Some(url), None) => {
                let connector = self
                    .connector
                    .ok_or(ConfigurationError::MissingConnector)?;
                ConnectionSource::Uri {
                    uri: url,
                    options: self.options,
                    connector,
                }
            }
            (None, Some(db)) => ConnectionSource::Handle {
                db,
                client: self.client,
            },
        };

        Ok(GridStorage {
            gate: ReadinessGate::new(source),
            file_config: self.file_config,
            events: EventBus::new(),
        })
    }
}
