use async_trait::async_trait;
use bson::{Document, doc, oid::ObjectId};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, Cursor, Database,
    options::{ClientOptions, FindOptions, Hint},
};

use odmlayer_core::{
    backend::{BackendCursor, CursorConfig, StoreBackend, StoreBackendBuilder},
    error::{OdmError, OdmResult},
};

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    async fn shutdown(self) -> OdmResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find_many(
        &self,
        filter: Document,
        collection: &str,
    ) -> OdmResult<Box<dyn BackendCursor>> {
        Ok(Box::new(MongoDbCursor::new(
            self.client.database(&self.database),
            self.get_collection(collection),
            filter,
        )))
    }

    async fn insert_one(&self, document: Document, collection: &str) -> OdmResult<Document> {
        let mut document = document;
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }

        self.get_collection(collection)
            .insert_one(&document)
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))?;

        Ok(document)
    }

    async fn update_many(
        &self,
        filter: Document,
        patch: Document,
        collection: &str,
    ) -> OdmResult<u64> {
        let result = self
            .get_collection(collection)
            .update_many(filter, patch)
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))?;

        Ok(result.matched_count)
    }

    async fn delete_one(&self, filter: Document, collection: &str) -> OdmResult<()> {
        self.get_collection(collection)
            .delete_one(filter)
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn shutdown(self) -> OdmResult<()> {
        self.shutdown().await
    }
}

/// Lazily-executing cursor over a driver find.
///
/// The underlying find runs on first advance, so every configuration applied
/// before then lands in the driver options. Once traversal has started,
/// further configuration is rejected; rewinding drops the driver cursor and
/// re-executes the find on the next advance.
struct MongoDbCursor {
    database: Database,
    collection: MongoCollection<Document>,
    filter: Document,
    options: FindOptions,
    cursor: Option<Cursor<Document>>,
}

impl MongoDbCursor {
    fn new(database: Database, collection: MongoCollection<Document>, filter: Document) -> Self {
        Self {
            database,
            collection,
            filter,
            options: FindOptions::default(),
            cursor: None,
        }
    }
}

#[async_trait]
impl BackendCursor for MongoDbCursor {
    fn configure(&mut self, config: CursorConfig) -> bool {
        if self.cursor.is_some() {
            return false;
        }

        match config {
            CursorConfig::Limit(limit) => self.options.limit = Some(limit as i64),
            CursorConfig::Skip(skip) => self.options.skip = Some(skip),
            CursorConfig::Sort(spec) => self.options.sort = Some(spec),
            CursorConfig::BatchSize(size) => self.options.batch_size = Some(size),
            CursorConfig::Hint(hint) => self.options.hint = Some(Hint::Keys(hint)),
        }

        true
    }

    async fn advance(&mut self) -> OdmResult<Option<Document>> {
        let cursor = match self.cursor.as_mut() {
            Some(cursor) => cursor,
            None => {
                let executed = self
                    .collection
                    .find(self.filter.clone())
                    .with_options(self.options.clone())
                    .await
                    .map_err(|e| OdmError::Backend(e.to_string()))?;
                self.cursor.insert(executed)
            }
        };

        cursor
            .try_next()
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))
    }

    async fn count(&mut self) -> OdmResult<Option<u64>> {
        let count = self
            .collection
            .count_documents(self.filter.clone())
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))?;

        Ok(Some(count))
    }

    async fn explain(&mut self) -> OdmResult<Option<Document>> {
        let plan = self
            .database
            .run_command(doc! {
                "explain": {
                    "find": self.collection.name(),
                    "filter": self.filter.clone(),
                },
                "verbosity": "queryPlanner",
            })
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))?;

        Ok(Some(plan))
    }

    fn rewind(&mut self) {
        self.cursor = None;
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> OdmResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| OdmError::Backend(e.to_string()))?,
            )
            .map_err(|e| OdmError::Backend(e.to_string()))?,
            self.database,
        ))
    }
}
