//! Database module
//!
//! Owns the single MongoDB connection and exposes read access to the
//! portfolio content collections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use serde_json::Value;

use crate::config::DatabaseSettings;

/// Used when neither the settings nor the URI name a database
const DEFAULT_DATABASE: &str = "portfolio";

const APP_NAME: &str = "portfolio-api";

/// Database gateway errors
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection already in progress")]
    ConnectionInProgress,

    #[error("MONGO_URL environment variable is not set")]
    MissingUri,

    #[error("Failed to connect to MongoDB: {0}")]
    Connection(String),

    #[error("Database not connected. Call connect() first.")]
    NotConnected,

    #[error("Database query failed: {0}")]
    Query(#[from] mongodb::error::Error),
}

/// Read access to portfolio content, as JSON documents
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// First document of `collection`, if any
    async fn find_one(&self, collection: &str) -> Result<Option<Value>, DatabaseError>;

    /// Every document of `collection` in natural order
    async fn find_all(&self, collection: &str) -> Result<Vec<Value>, DatabaseError>;
}

#[derive(Debug, Clone)]
struct Connection {
    client: Client,
    database: mongodb::Database,
}

/// Gateway owning one lazily established, reused MongoDB connection.
///
/// Constructed once by the entry point and shared with every handler.
#[derive(Debug)]
pub struct Database {
    settings: DatabaseSettings,
    connection: RwLock<Option<Connection>>,
    connecting: AtomicBool,
}

/// Clears the connecting flag however the attempt ends
struct ConnectingGuard<'a>(&'a AtomicBool);

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Database {
    pub fn new(settings: DatabaseSettings) -> Self {
        Self {
            settings,
            connection: RwLock::new(None),
            connecting: AtomicBool::new(false),
        }
    }

    /// Establish the connection pool and verify it with a `ping`.
    ///
    /// A no-op when already connected. Fails without touching the
    /// in-flight attempt if another caller is connecting. Nothing is
    /// retained when the attempt fails.
    pub async fn connect(&self) -> Result<(), DatabaseError> {
        if self
            .connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DatabaseError::ConnectionInProgress);
        }
        let _guard = ConnectingGuard(&self.connecting);

        if self.is_connected() {
            tracing::info!("Database already connected");
            return Ok(());
        }

        if self.settings.uri.is_empty() {
            return Err(DatabaseError::MissingUri);
        }

        tracing::info!("Connecting to MongoDB...");

        let connection = self.establish().await.map_err(|e| {
            tracing::error!(error = %e, "MongoDB connection error");
            DatabaseError::Connection(e.to_string())
        })?;

        tracing::info!(
            database = %connection.database.name(),
            "Successfully connected to MongoDB"
        );

        *self.connection.write().unwrap_or_else(PoisonError::into_inner) = Some(connection);
        Ok(())
    }

    async fn establish(&self) -> mongodb::error::Result<Connection> {
        let mut options = ClientOptions::parse(&self.settings.uri).await?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_string());
        options.max_pool_size = Some(self.settings.max_pool_size);
        options.min_pool_size = Some(self.settings.min_pool_size);
        options.max_idle_time = Some(self.settings.max_idle_time);
        options.server_selection_timeout = Some(self.settings.server_selection_timeout);
        options.connect_timeout = Some(self.settings.connect_timeout);
        options.retry_reads = Some(true);
        options.retry_writes = Some(true);

        let name = self
            .settings
            .name
            .clone()
            .or_else(|| options.default_database.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let client = Client::with_options(options)?;
        let database = client.database(&name);

        if let Err(e) = database.run_command(doc! { "ping": 1 }).await {
            drop(database);
            client.shutdown().await;
            return Err(e);
        }

        Ok(Connection { client, database })
    }

    /// Handle to `name` in the resolved database
    pub fn collection(&self, name: &str) -> Result<Collection<Document>, DatabaseError> {
        let connection = self.connection.read().unwrap_or_else(PoisonError::into_inner);
        connection
            .as_ref()
            .map(|c| c.database.collection(name))
            .ok_or(DatabaseError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// True while a `connect()` call is in flight
    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::Acquire)
    }

    /// Release the connection. Calling it again is a no-op.
    pub async fn close(&self) {
        let connection = self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(Connection { client, database }) = connection {
            tracing::info!("Closing MongoDB connection...");
            drop(database);
            client.shutdown().await;
            tracing::info!("MongoDB connection closed");
        }
    }
}

#[async_trait]
impl ContentStore for Database {
    async fn find_one(&self, collection: &str) -> Result<Option<Value>, DatabaseError> {
        let collection = self.collection(collection)?;
        let document = collection.find_one(doc! {}).await?;
        Ok(document.map(to_json))
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Value>, DatabaseError> {
        let collection = self.collection(collection)?;
        let documents: Vec<Document> = collection.find(doc! {}).await?.try_collect().await?;
        Ok(documents.into_iter().map(to_json).collect())
    }
}

/// Relaxed extended JSON keeps ids and dates readable (`{"$oid": ...}`)
fn to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn unreachable_settings() -> DatabaseSettings {
        DatabaseSettings {
            uri: "mongodb://127.0.0.1:1/portfolio".to_string(),
            server_selection_timeout: Duration::from_millis(1500),
            connect_timeout: Duration::from_millis(200),
            min_pool_size: 0,
            ..DatabaseSettings::default()
        }
    }

    #[test]
    fn test_collection_before_connect() {
        let db = Database::new(DatabaseSettings::default());
        assert!(!db.is_connected());
        assert!(matches!(db.collection("information"), Err(DatabaseError::NotConnected)));
    }

    #[tokio::test]
    async fn test_reads_before_connect_fail() {
        let db = Database::new(DatabaseSettings::default());
        assert!(matches!(db.find_one("information").await, Err(DatabaseError::NotConnected)));
        assert!(matches!(db.find_all("skills").await, Err(DatabaseError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_without_uri() {
        let db = Database::new(DatabaseSettings::default());

        assert!(matches!(db.connect().await, Err(DatabaseError::MissingUri)));
        assert!(!db.is_connected());
        assert!(!db.is_connecting());
    }

    #[tokio::test]
    async fn test_unreachable_server_leaves_no_state() {
        let db = Database::new(unreachable_settings());

        assert!(matches!(db.connect().await, Err(DatabaseError::Connection(_))));
        assert!(!db.is_connected());
        assert!(!db.is_connecting());
        assert!(matches!(db.collection("reviews"), Err(DatabaseError::NotConnected)));
    }

    #[tokio::test]
    async fn test_concurrent_connect_rejects_second_caller() {
        let db = Arc::new(Database::new(unreachable_settings()));

        let first = tokio::spawn({
            let db = db.clone();
            async move { db.connect().await }
        });

        while !db.is_connecting() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(db.connect().await, Err(DatabaseError::ConnectionInProgress)));
        // The first attempt is still running
        assert!(db.is_connecting());

        let first = first.await.unwrap();
        assert!(matches!(first, Err(DatabaseError::Connection(_))));
        assert!(!db.is_connecting());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let db = Database::new(DatabaseSettings::default());
        db.close().await;
        db.close().await;
        assert!(!db.is_connected());
    }
}
