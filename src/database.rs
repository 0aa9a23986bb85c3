use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::{Client, Database};
use tokio::sync::OnceCell;

use crate::errors::{ConnectionError, Error};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Runs one connection-setup sequence. The manager calls this at most once.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        connection_string: &str,
        database_name: &str,
    ) -> Result<Database, ConnectionError>;
}

/// Connects with the MongoDB driver and pings the server before handing out
/// the database.
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoConnector;

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(
        &self,
        connection_string: &str,
        database_name: &str,
    ) -> Result<Database, ConnectionError> {
        let client = Client::with_uri_str(connection_string)
            .await
            .map_err(ConnectionError::Connect)?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(ConnectionError::Ping)?;

        Ok(client.database(database_name))
    }
}

/// Lazily connects on first use and latches the outcome.
///
/// Concurrent first callers wait for the single setup sequence and then all
/// observe the same handle or the same error. A setup that fails or outlives
/// its deadline is never retried; build a new manager to reconnect.
pub struct ConnectionManager {
    connection_string: String,
    database_name: String,
    connector: Box<dyn Connector>,
    connect_timeout: Duration,
    database: OnceCell<Result<Database, ConnectionError>>,
}

impl ConnectionManager {
    pub fn new(connection_string: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self::with_connector(connection_string, database_name, MongoConnector)
    }

    pub fn with_connector<C>(
        connection_string: impl Into<String>,
        database_name: impl Into<String>,
        connector: C,
    ) -> Self
    where
        C: Connector + 'static,
    {
        Self {
            connection_string: connection_string.into(),
            database_name: database_name.into(),
            connector: Box::new(connector),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            database: OnceCell::new(),
        }
    }

    /// Deadline for the setup sequence when started through `acquire`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// True once setup has finished, whether it succeeded or not.
    pub fn is_initialized(&self) -> bool {
        self.database.initialized()
    }

    pub async fn acquire(&self) -> Result<Database, Error> {
        self.acquire_within(self.connect_timeout).await
    }

    /// Like `acquire`, bounding the setup by `timeout` if this call is the one
    /// that runs it. An already latched outcome is returned as is.
    pub async fn acquire_within(&self, timeout: Duration) -> Result<Database, Error> {
        match self.database.get_or_init(|| self.connect(timeout)).await {
            Ok(database) => Ok(database.clone()),
            Err(e) => Err(Error::Connection(e.clone())),
        }
    }

    async fn connect(&self, timeout: Duration) -> Result<Database, ConnectionError> {
        // The connection string may carry credentials, keep it out of the logs.
        tracing::info!("Initializing MongoDB connection to database {}", self.database_name);

        let setup = self
            .connector
            .connect(&self.connection_string, &self.database_name);
        let outcome = match tokio::time::timeout(timeout, setup).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ConnectionError::Timeout(timeout)),
        };

        match &outcome {
            Ok(_) => tracing::info!("MongoDB connection ready: database={}", self.database_name),
            Err(e) => tracing::error!(
                "MongoDB connection failed, no further attempts will be made: database={}, error={e}",
                self.database_name
            ),
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use mongodb::error::Error as MongoError;

    use super::*;

    struct Healthy;

    #[async_trait]
    impl Connector for Healthy {
        async fn connect(&self, uri: &str, name: &str) -> Result<Database, ConnectionError> {
            // Widen the window in which concurrent callers pile up on the latch.
            tokio::time::sleep(Duration::from_millis(50)).await;
            let client = Client::with_uri_str(uri)
                .await
                .map_err(ConnectionError::Connect)?;
            Ok(client.database(name))
        }
    }

    struct Refusing;

    #[async_trait]
    impl Connector for Refusing {
        async fn connect(&self, _: &str, _: &str) -> Result<Database, ConnectionError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(ConnectionError::Ping(MongoError::custom("connection refused")))
        }
    }

    struct Stalled;

    #[async_trait]
    impl Connector for Stalled {
        async fn connect(&self, _: &str, _: &str) -> Result<Database, ConnectionError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(ConnectionError::Ping(MongoError::custom("never reached")))
        }
    }

    struct Counting<C> {
        inner: C,
        calls: Arc<AtomicUsize>,
    }

    impl<C> Counting<C> {
        fn new(inner: C) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    inner,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl<C: Connector> Connector for Counting<C> {
        async fn connect(&self, uri: &str, name: &str) -> Result<Database, ConnectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.connect(uri, name).await
        }
    }

    #[tokio::test]
    async fn concurrent_acquire_runs_setup_once() {
        let (connector, calls) = Counting::new(Healthy);
        let manager = Arc::new(ConnectionManager::with_connector(
            "mongodb://127.0.0.1:27017",
            "hooklog_test",
            connector,
        ));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .acquire()
                        .await
                        .map(|database| database.name().to_string())
                })
            })
            .collect();

        for handle in handles {
            let name = handle.await.unwrap().unwrap();
            assert_eq!(name, "hooklog_test");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(manager.is_initialized());
    }

    #[tokio::test]
    async fn failed_setup_is_latched() {
        let (connector, calls) = Counting::new(Refusing);
        let manager = ConnectionManager::with_connector("mongodb://nowhere", "db", connector);
        assert!(!manager.is_initialized());

        let first = manager.acquire().await.unwrap_err();
        let second = manager.acquire().await.unwrap_err();

        assert!(matches!(first, Error::Connection(ConnectionError::Ping(_))));
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(manager.is_initialized());
    }

    #[tokio::test]
    async fn unreachable_server_fails_once_and_stays_failed() {
        let (connector, calls) = Counting::new(MongoConnector);
        let manager = ConnectionManager::with_connector(
            "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200&connectTimeoutMS=200",
            "db",
            connector,
        );

        let first = manager.acquire().await.unwrap_err();
        assert!(matches!(first, Error::Connection(ConnectionError::Ping(_))));

        let second = manager.acquire().await.unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_uri_fails_at_connect() {
        let manager = ConnectionManager::new("not-a-mongodb-uri", "db");
        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, Error::Connection(ConnectionError::Connect(_))));
    }

    #[tokio::test]
    async fn concurrent_acquire_shares_one_failure() {
        let (connector, calls) = Counting::new(Refusing);
        let manager = Arc::new(ConnectionManager::with_connector(
            "mongodb://nowhere",
            "db",
            connector,
        ));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.acquire().await.map(|_| ()) })
            })
            .collect();

        let mut messages = Vec::new();
        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, Error::Connection(ConnectionError::Ping(_))));
            messages.push(err.to_string());
        }
        messages.dedup();
        assert_eq!(messages.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stalled_setup_is_cut_off_and_latched() {
        let (connector, calls) = Counting::new(Stalled);
        let manager = ConnectionManager::with_connector("mongodb://nowhere", "db", connector)
            .with_connect_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let first = manager.acquire().await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            first,
            Error::Connection(ConnectionError::Timeout(after)) if after == Duration::from_millis(50)
        ));

        let second = manager.acquire_within(Duration::from_secs(30)).await.unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
