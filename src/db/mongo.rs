//! MongoDB client and collection wrapper

use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::{
    options::{FindOptions, IndexOptions},
    Client, ClientSession, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::types::{CampaignError, Result};

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

const FAST_FAIL_OPTIONS: &str = "serverSelectionTimeoutMS=3000&connectTimeoutMS=3000";

/// Fail fast on an unreachable server instead of hanging startup
fn with_fast_fail(uri: &str) -> String {
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{}{}{}", uri, separator, FAST_FAIL_OPTIONS)
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and verify the connection with a ping
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        let client = Client::with_uri_str(with_fast_fail(uri))
            .await
            .map_err(|e| CampaignError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        let mongo = Self {
            client,
            db_name: db_name.to_string(),
        };
        mongo.ping().await?;

        info!("Connected to MongoDB database '{}'", db_name);
        Ok(mongo)
    }

    pub async fn ping(&self) -> Result<()> {
        self.client
            .database(&self.db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| CampaignError::Database(format!("MongoDB ping failed: {}", e)))?;
        Ok(())
    }

    /// Get a typed collection with its indexes applied
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Open a session for a multi-document transaction
    pub async fn start_session(&self) -> Result<ClientSession> {
        Ok(self.client.start_session().await?)
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
{
    pub async fn new(client: &Client, db_name: &str, collection_name: &str) -> Result<Self> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<()> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| CampaignError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        Ok(self.inner.find_one(filter).await?)
    }

    pub async fn find_many(&self, filter: Document, options: Option<FindOptions>) -> Result<Vec<T>> {
        let cursor = self.inner.find(filter).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn count(&self, filter: Document) -> Result<u64> {
        Ok(self.inner.count_documents(filter).await?)
    }

    pub async fn find_one_in(
        &self,
        session: &mut ClientSession,
        filter: Document,
    ) -> Result<Option<T>> {
        Ok(self.inner.find_one(filter).session(&mut *session).await?)
    }

    pub async fn find_many_in(
        &self,
        session: &mut ClientSession,
        filter: Document,
    ) -> Result<Vec<T>> {
        let mut cursor = self.inner.find(filter).session(&mut *session).await?;
        let mut docs = Vec::new();
        while let Some(doc) = cursor.next(&mut *session).await {
            docs.push(doc?);
        }
        Ok(docs)
    }

    pub async fn count_in(&self, session: &mut ClientSession, filter: Document) -> Result<u64> {
        Ok(self
            .inner
            .count_documents(filter)
            .session(&mut *session)
            .await?)
    }

    pub async fn insert_in(&self, session: &mut ClientSession, item: &T) -> Result<()> {
        self.inner.insert_one(item).session(&mut *session).await?;
        Ok(())
    }

    /// Replace the document with `_id == id`, inserting it when absent
    pub async fn upsert_in(&self, session: &mut ClientSession, id: &str, item: &T) -> Result<()> {
        self.inner
            .replace_one(doc! { "_id": id }, item)
            .upsert(true)
            .session(&mut *session)
            .await?;
        Ok(())
    }

    /// Replace the document with `_id == id`; false when nothing matched
    pub async fn replace_in(&self, session: &mut ClientSession, id: &str, item: &T) -> Result<bool> {
        let result = self
            .inner
            .replace_one(doc! { "_id": id }, item)
            .session(&mut *session)
            .await?;
        Ok(result.matched_count > 0)
    }

    pub async fn delete_many_in(&self, session: &mut ClientSession, filter: Document) -> Result<u64> {
        let result = self
            .inner
            .delete_many(filter)
            .session(&mut *session)
            .await?;
        Ok(result.deleted_count)
    }

    /// Get the underlying collection for advanced operations
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_fail_options_appended() {
        assert_eq!(
            with_fast_fail("mongodb://localhost:27017"),
            "mongodb://localhost:27017?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000"
        );
        assert_eq!(
            with_fast_fail("mongodb://db/?replicaSet=rs0"),
            "mongodb://db/?replicaSet=rs0&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000"
        );
    }
}
