// ConfigStore Service
// Persists each group's RTMP destination (MongoDB in production)

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::{IndexOptions, UpdateOptions};
use mongodb::{Collection, Database, IndexModel};

use crate::models::StreamConfig;
use crate::services::StoreError;

/// Key/value storage of stream configuration keyed by group id
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Point lookup by group id
    async fn get(&self, group_id: i64) -> Result<Option<StreamConfig>, StoreError>;

    /// Any configuration created by this user
    async fn find_by_setter(&self, user_id: i64) -> Result<Option<StreamConfig>, StoreError>;

    /// Insert or overwrite the configuration for `config.group_id`
    async fn set(&self, config: &StreamConfig) -> Result<(), StoreError>;

    /// Delete the configuration for a group. Returns whether something was removed.
    async fn clear(&self, group_id: i64) -> Result<bool, StoreError>;
}

/// MongoDB-backed configuration store
pub struct MongoConfigStore {
    collection: Collection<StreamConfig>,
}

impl MongoConfigStore {
    pub fn new(database: &Database, collection: &str) -> Self {
        Self {
            collection: database.collection(collection),
        }
    }

    /// Ensure the unique index on group_id exists
    pub async fn setup_collection(&self) -> Result<(), StoreError> {
        self.collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "group_id": 1 })
                    .options(Some(IndexOptions::builder().unique(Some(true)).build()))
                    .build(),
                None,
            )
            .await?;

        self.collection
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1 }).build(), None)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MongoConfigStore {
    async fn get(&self, group_id: i64) -> Result<Option<StreamConfig>, StoreError> {
        Ok(self
            .collection
            .find_one(doc! { "group_id": group_id }, None)
            .await?)
    }

    async fn find_by_setter(&self, user_id: i64) -> Result<Option<StreamConfig>, StoreError> {
        Ok(self
            .collection
            .find_one(doc! { "user_id": user_id }, None)
            .await?)
    }

    async fn set(&self, config: &StreamConfig) -> Result<(), StoreError> {
        self.collection
            .update_one(
                doc! { "group_id": config.group_id },
                doc! {
                    "$set": {
                        "user_id": config.setter_user_id,
                        "rtmp": &config.rtmp_url,
                        "group_name": &config.group_name,
                    }
                },
                UpdateOptions::builder().upsert(Some(true)).build(),
            )
            .await?;

        log::debug!("Stored RTMP config for group {}", config.group_id);
        Ok(())
    }

    async fn clear(&self, group_id: i64) -> Result<bool, StoreError> {
        let result = self
            .collection
            .delete_one(doc! { "group_id": group_id }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }
}

/// Process-local store, used when MongoDB is not wanted (tests, dry runs)
#[derive(Default)]
pub struct MemoryConfigStore {
    configs: Mutex<HashMap<i64, StreamConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn configs(&self) -> std::sync::MutexGuard<'_, HashMap<i64, StreamConfig>> {
        self.configs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, group_id: i64) -> Result<Option<StreamConfig>, StoreError> {
        Ok(self.configs().get(&group_id).cloned())
    }

    async fn find_by_setter(&self, user_id: i64) -> Result<Option<StreamConfig>, StoreError> {
        Ok(self
            .configs()
            .values()
            .find(|config| config.setter_user_id == user_id)
            .cloned())
    }

    async fn set(&self, config: &StreamConfig) -> Result<(), StoreError> {
        self.configs().insert(config.group_id, config.clone());
        Ok(())
    }

    async fn clear(&self, group_id: i64) -> Result<bool, StoreError> {
        Ok(self.configs().remove(&group_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_upsert_and_clear() {
        let store = MemoryConfigStore::new();
        assert!(store.get(-1001).await.unwrap().is_none());

        store
            .set(&StreamConfig::new(-1001, 7, "rtmp://a/one", "First"))
            .await
            .unwrap();
        store
            .set(&StreamConfig::new(-1001, 8, "rtmp://a/two", "First"))
            .await
            .unwrap();

        let config = store.get(-1001).await.unwrap().unwrap();
        assert_eq!(config.rtmp_url, "rtmp://a/two");
        assert_eq!(config.setter_user_id, 8);
        assert!(store.find_by_setter(7).await.unwrap().is_none());
        assert!(store.find_by_setter(8).await.unwrap().is_some());

        assert!(store.clear(-1001).await.unwrap());
        assert!(!store.clear(-1001).await.unwrap());
    }
}
