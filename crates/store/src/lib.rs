//! SQLite tag-mapping store for tagbase.
//!
//! This crate provides the storage and merge engine:
//! - Identifier interning for hashes, namespaces and subtags
//! - Services and the tag service precedence order
//! - Per-service mapping statuses and petitions
//! - The precedence-merged combined tag service
//! - The incrementally maintained autocomplete count cache
//! - A single-writer queue with change notifications

pub mod autocomplete;
pub mod error;
pub mod merge;
pub mod models;
mod processor;
pub mod registry;
pub mod repos;
pub mod store;
pub mod writer;

pub use error::{StoreError, StoreResult};
pub use models::{FileDomain, Petition, ServiceRecord};
pub use registry::{PrecedenceOrder, ServiceLookup, ServiceRegistry};
pub use store::SqliteTagStore;
pub use writer::{AutocompleteRequest, TagStoreHandle};

use tagbase_core::config::StoreConfig;
use tokio::task::JoinHandle;

/// Open a store from configuration and start its writer task.
pub async fn from_config(config: &StoreConfig) -> StoreResult<(TagStoreHandle, JoinHandle<()>)> {
    let store = SqliteTagStore::new(config).await?;
    Ok(TagStoreHandle::spawn(store, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_file_backed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("tags.db");
        let config = StoreConfig {
            path: db_path.clone(),
            ..StoreConfig::default()
        };

        let (handle, _task) = from_config(&config).await.unwrap();
        handle.store().health_check().await.unwrap();
        assert_eq!(handle.list_services().await.unwrap().len(), 2);
        assert!(db_path.exists());
    }
}
