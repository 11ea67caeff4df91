//! Store setup helpers for integration tests.

use sqlx::Row;
use tagbase_core::{
    ContentHash, MappingStatus, ServiceChange, ServiceKey, ServiceType, ServiceUpdates, Tag,
};
use tagbase_store::SqliteTagStore;
use tempfile::TempDir;

/// Test store wrapper that keeps the temp dir alive for file-backed stores.
#[allow(dead_code)]
pub struct TestStore {
    pub store: SqliteTagStore,
    _temp_dir: Option<TempDir>,
}

#[allow(dead_code)]
impl TestStore {
    /// In-memory store.
    pub async fn new() -> Self {
        let store = SqliteTagStore::in_memory()
            .await
            .expect("Failed to create in-memory store");
        Self {
            store,
            _temp_dir: None,
        }
    }

    /// File-backed store in a fresh temp dir.
    pub async fn file_backed() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = tagbase_core::config::StoreConfig {
            path: temp_dir.path().join("tags.db"),
            ..tagbase_core::config::StoreConfig::default()
        };
        let store = SqliteTagStore::new(&config)
            .await
            .expect("Failed to create file-backed store");
        Self {
            store,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Register a local tag service and return its key.
    pub async fn local_tags(&self, name: &str) -> ServiceKey {
        self.register(ServiceType::LocalTag, name).await
    }

    /// Register a tag repository and return its key.
    pub async fn tag_repository(&self, name: &str) -> ServiceKey {
        self.register(ServiceType::TagRepository, name).await
    }

    /// Register a local file service and return its key.
    pub async fn local_files(&self, name: &str) -> ServiceKey {
        self.register(ServiceType::LocalFile, name).await
    }

    pub async fn register(&self, service_type: ServiceType, name: &str) -> ServiceKey {
        let key = ServiceKey::new();
        self.store
            .register_service(key, service_type, name)
            .await
            .expect("Failed to register service");
        key
    }

    /// Apply a batch, panicking on error.
    pub async fn apply(&self, updates: ServiceUpdates) -> Vec<ServiceChange> {
        self.store
            .apply_content_updates(&updates)
            .await
            .expect("Failed to apply content updates")
    }

    /// Status of a mapping given as tag text.
    pub async fn status(
        &self,
        service_key: ServiceKey,
        tag: &str,
        hash: &ContentHash,
    ) -> Option<MappingStatus> {
        let tag = Tag::parse(tag).expect("blank tag in test");
        self.store
            .get_mapping_status(service_key, &tag, hash)
            .await
            .expect("Failed to get mapping status")
    }

    /// Every mapping row of a service as `(tag text, hash, status code)`,
    /// sorted.
    pub async fn mapping_rows(&self, service_key: ServiceKey) -> Vec<(String, Vec<u8>, i64)> {
        let rows = sqlx::query(
            r#"
            SELECT n.namespace, s.subtag, h.hash, m.status
            FROM mappings m
            JOIN services sv ON sv.service_id = m.service_id
            JOIN namespaces n ON n.namespace_id = m.namespace_id
            JOIN subtags s ON s.tag_id = m.tag_id
            JOIN hashes h ON h.hash_id = m.hash_id
            WHERE sv.service_key = ?
            ORDER BY n.namespace, s.subtag, h.hash
            "#,
        )
        .bind(*service_key.as_uuid())
        .fetch_all(self.store.pool())
        .await
        .expect("Failed to read mapping rows");

        rows.into_iter()
            .map(|row| {
                let namespace: String = row.get("namespace");
                let subtag: String = row.get("subtag");
                (
                    format!("{namespace}:{subtag}"),
                    row.get("hash"),
                    row.get("status"),
                )
            })
            .collect()
    }

    /// Every cached autocomplete row as
    /// `(file key, tag key, namespace, subtag, current, pending)`, sorted.
    pub async fn autocomplete_rows(&self) -> Vec<(Vec<u8>, Vec<u8>, String, String, i64, i64)> {
        let rows = sqlx::query(
            r#"
            SELECT f.service_key AS file_key, t.service_key AS tag_key,
                   n.namespace, s.subtag, a.current_count, a.pending_count
            FROM autocomplete_counts a
            JOIN services f ON f.service_id = a.file_service_id
            JOIN services t ON t.service_id = a.tag_service_id
            JOIN namespaces n ON n.namespace_id = a.namespace_id
            JOIN subtags s ON s.tag_id = a.tag_id
            ORDER BY f.service_key, t.service_key, n.namespace, s.subtag
            "#,
        )
        .fetch_all(self.store.pool())
        .await
        .expect("Failed to read autocomplete rows");

        rows.into_iter()
            .map(|row| {
                (
                    row.get("file_key"),
                    row.get("tag_key"),
                    row.get("namespace"),
                    row.get("subtag"),
                    row.get("current_count"),
                    row.get("pending_count"),
                )
            })
            .collect()
    }

    /// Count rows in a table.
    pub async fn count_rows(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(self.store.pool())
            .await
            .expect("Failed to count rows")
    }
}
