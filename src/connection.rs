//! Connection sources and their normalization into a resolved store handle.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{BoxError, ConnectionError};
use crate::store::{ChunkStore, Connect, StoreClient};

/// Driver options forwarded to the [`Connect`] implementation when the
/// engine opens its own client from a connection string.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Database to select once connected; the client's default when unset.
    pub default_database: Option<String>,
    /// Application name reported to the store, when the driver supports it.
    pub app_name: Option<String>,
}

/// A store handle or a client a deferred connection source settled to.
pub enum DbLike {
    /// A database-scope handle, used as-is.
    Store(Arc<dyn ChunkStore>),
    /// A connection-scope client; the store handle is derived from it.
    Client(Arc<dyn StoreClient>),
}

impl fmt::Debug for DbLike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(db) => f.debug_tuple("Store").field(db).finish(),
            Self::Client(client) => f.debug_tuple("Client").field(client).finish(),
        }
    }
}

/// The `db` slot of a storage engine under construction.
pub(crate) enum DbSource {
    Ready(DbLike),
    Deferred(BoxFuture<'static, Result<DbLike, BoxError>>),
}

impl fmt::Debug for DbSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(db) => f.debug_tuple("Ready").field(db).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// The optional `client` slot of a storage engine under construction.
pub(crate) enum ClientSource {
    Ready(Arc<dyn StoreClient>),
    Deferred(BoxFuture<'static, Result<Arc<dyn StoreClient>, BoxError>>),
}

impl fmt::Debug for ClientSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(client) => f.debug_tuple("Ready").field(client).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Validated connection input, consumed once by the readiness gate.
#[derive(Debug)]
pub(crate) enum ConnectionSource {
    Uri {
        uri: String,
        options: ConnectOptions,
        connector: Arc<dyn Connect>,
    },
    Handle {
        db: DbSource,
        client: Option<ClientSource>,
    },
}

/// A resolved store connection.
#[derive(Clone)]
pub struct Connection {
    /// Database-scope handle uploads are written through.
    pub db: Arc<dyn ChunkStore>,
    /// Connection-scope handle, when one is known.
    pub client: Option<Arc<dyn StoreClient>>,
    /// True when the engine opened the client itself and must release it.
    pub(crate) owned: bool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("db", &self.db)
            .field("client", &self.client)
            .field("owned", &self.owned)
            .finish()
    }
}

/// Resolves a connection source into a `(store handle, client handle)`
/// pair, opening a client when given a connection string and deriving the
/// store handle when a deferred source settles to a client.
pub(crate) async fn normalize(source: ConnectionSource) -> Result<Connection, ConnectionError> {
    match source {
        ConnectionSource::Uri {
            uri,
            options,
            connector,
        } => {
            tracing::debug!(%uri, "opening store client from connection string");
            let client = connector.connect(&uri, &options).await?;
            let db = client.database(options.default_database.as_deref());
            Ok(Connection {
                db,
                client: Some(client),
                owned: true,
            })
        }
        ConnectionSource::Handle { db, client } => {
            let client = match client {
                None => None,
                Some(ClientSource::Ready(client)) => Some(client),
                Some(ClientSource::Deferred(fut)) => {
                    Some(fut.await.map_err(ConnectionError::from_reject)?)
                }
            };

            let db = match db {
                DbSource::Ready(db) => db,
                DbSource::Deferred(fut) => fut.await.map_err(ConnectionError::from_reject)?,
            };
            let (db, derived) = match db {
                DbLike::Store(db) => (db, None),
                DbLike::Client(client) => (client.database(None), Some(client)),
            };

            Ok(Connection {
                db,
                client: client.or(derived),
                owned: false,
            })
        }
    }
}
