use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc, from_document};
use mongodb::results::{DeleteResult, UpdateResult};
use mongodb::{Collection, Cursor};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::database::ConnectionManager;
use crate::enums::Operation;
use crate::errors::Error;
use crate::utils::filters::{id_filter, name_prefix_filter};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Generic CRUD over named collections of the shared database.
///
/// Each call acquires the shared handle (connecting on first use), resolves the
/// collection by name and runs a single request bounded by the request timeout.
/// The same timeout bounds the connection setup when a call triggers it.
/// A latched connection failure is returned as `Error::Connection` before any
/// request is issued.
#[derive(Clone)]
pub struct CollectionOps {
    manager: Arc<ConnectionManager>,
    timeout: Duration,
}

impl CollectionOps {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self::with_timeout(manager, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(manager: Arc<ConnectionManager>, timeout: Duration) -> Self {
        Self { manager, timeout }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    async fn collection(&self, name: &str) -> Result<Collection<Document>, Error> {
        let database = self.manager.acquire_within(self.timeout).await?;
        Ok(database.collection::<Document>(name))
    }

    async fn bounded<T, F>(&self, operation: Operation, request: F) -> Result<T, Error>
    where
        F: Future<Output = mongodb::error::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => {
                tracing::warn!("{operation} exceeded {:?}", self.timeout);
                Err(Error::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
        }
    }

    pub async fn ping(&self) -> Result<(), Error> {
        let database = self.manager.acquire_within(self.timeout).await?;
        self.bounded(Operation::Ping, async {
            database.run_command(doc! { "ping": 1 }).await.map(|_| ())
        })
        .await
    }

    pub async fn list_all(&self, collection: &str) -> Result<Vec<Document>, Error> {
        let documents = self.find(Operation::ListAll, collection, doc! {}).await?;
        tracing::debug!("list_all {collection}: {} documents", documents.len());
        Ok(documents)
    }

    pub async fn list_filtered(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Vec<Document>, Error> {
        self.find(Operation::ListFiltered, collection, filter).await
    }

    pub async fn count(&self, collection: &str, filter: Document) -> Result<u64, Error> {
        let coll = self.collection(collection).await?;
        self.bounded(Operation::Count, coll.count_documents(filter).into_future())
            .await
    }

    /// Documents whose `name` starts with `search`, ignoring case.
    pub async fn search_by_name_prefix(
        &self,
        collection: &str,
        search: &str,
    ) -> Result<Vec<Document>, Error> {
        let filter = name_prefix_filter(search);
        self.find(Operation::SearchByNamePrefix, collection, filter)
            .await
    }

    /// Inserts one document and returns the identifier it was stored under.
    pub async fn insert<T>(&self, collection: &str, document: &T) -> Result<Bson, Error>
    where
        T: Serialize,
    {
        let document = bson::to_document(document)?;
        let coll = self.collection(collection).await?;
        let result = self
            .bounded(Operation::Insert, coll.insert_one(document).into_future())
            .await
            .inspect_err(|e| tracing::error!("insert into {collection} failed: {e}"))?;

        tracing::debug!("inserted into {collection}: _id={}", result.inserted_id);
        Ok(result.inserted_id)
    }

    /// Deletes the document with the given ObjectId. A well-formed id that
    /// matches nothing yields `deleted_count == 0`.
    pub async fn delete_one(&self, collection: &str, id: &str) -> Result<DeleteResult, Error> {
        let filter = id_filter(id)?;
        let coll = self.collection(collection).await?;
        self.bounded(Operation::DeleteOne, coll.delete_one(filter).into_future())
            .await
            .inspect_err(|e| tracing::error!("delete_one {id} from {collection} failed: {e}"))
    }

    pub async fn delete_all(&self, collection: &str) -> Result<DeleteResult, Error> {
        self.delete_matching(Operation::DeleteAll, collection, doc! {})
            .await
    }

    pub async fn delete_many(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<DeleteResult, Error> {
        self.delete_matching(Operation::DeleteMany, collection, filter)
            .await
    }

    /// Applies `update` (an update document such as `{"$set": {..}}`) to the
    /// document with the given ObjectId.
    pub async fn update_one(
        &self,
        collection: &str,
        id: &str,
        update: Document,
    ) -> Result<UpdateResult, Error> {
        let filter = id_filter(id)?;
        let coll = self.collection(collection).await?;
        self.bounded(
            Operation::UpdateOne,
            coll.update_one(filter, update).into_future(),
        )
        .await
        .inspect_err(|e| tracing::error!("update_one {id} in {collection} failed: {e}"))
    }

    /// Like `list_filtered`, deserializing each document into `A`.
    pub async fn find_filtered_as<A>(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Vec<A>, Error>
    where
        A: DeserializeOwned,
    {
        let documents = self
            .find(Operation::ListFiltered, collection, filter)
            .await?;

        documents
            .into_iter()
            .enumerate()
            .map(|(index, document)| {
                from_document::<A>(document).map_err(|e| {
                    tracing::error!(
                        "Failed to deserialize document at index {}: error={:?}, collection={}, type={}",
                        index,
                        e,
                        collection,
                        std::any::type_name::<A>()
                    );
                    Error::SerializeMongoResponse(e)
                })
            })
            .collect()
    }

    /// Lazy alternative to `list_filtered` for collections of unbounded size.
    /// Only opening the cursor is bounded by the request timeout; iterate it
    /// with `TryStreamExt` and call again to restart.
    pub async fn cursor(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Cursor<Document>, Error> {
        let coll = self.collection(collection).await?;
        self.bounded(Operation::ListFiltered, coll.find(filter).into_future())
            .await
    }

    async fn find(
        &self,
        operation: Operation,
        collection: &str,
        filter: Document,
    ) -> Result<Vec<Document>, Error> {
        let coll = self.collection(collection).await?;
        self.bounded(operation, async {
            let cursor = coll.find(filter).await?;
            cursor.try_collect::<Vec<Document>>().await
        })
        .await
    }

    async fn delete_matching(
        &self,
        operation: Operation,
        collection: &str,
        filter: Document,
    ) -> Result<DeleteResult, Error> {
        let coll = self.collection(collection).await?;
        let result = self
            .bounded(operation, coll.delete_many(filter).into_future())
            .await
            .inspect_err(|e| tracing::error!("{operation} on {collection} failed: {e}"))?;

        tracing::debug!(
            "{operation} on {collection}: deleted {}",
            result.deleted_count
        );
        Ok(result)
    }
}
