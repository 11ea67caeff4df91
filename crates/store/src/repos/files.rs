//! File domain membership repository.

use crate::error::StoreResult;
use crate::models::{HashId, ServiceId};
use crate::repos::id_list;
use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::collections::HashMap;

/// Repository for real file service membership.
#[async_trait]
pub trait FileRepo: Send {
    /// Add hashes to a file service. Returns the hashes that were not
    /// already members.
    async fn add_files(
        &mut self,
        service_id: ServiceId,
        hash_ids: &[HashId],
    ) -> StoreResult<Vec<HashId>>;

    /// Remove hashes from a file service. Returns the hashes that were
    /// members.
    async fn remove_files(
        &mut self,
        service_id: ServiceId,
        hash_ids: &[HashId],
    ) -> StoreResult<Vec<HashId>>;

    /// Real file services each hash is a member of.
    async fn file_services_for_hashes(
        &mut self,
        hash_ids: &[HashId],
    ) -> StoreResult<HashMap<HashId, Vec<ServiceId>>>;
}

#[async_trait]
impl FileRepo for SqliteConnection {
    async fn add_files(
        &mut self,
        service_id: ServiceId,
        hash_ids: &[HashId],
    ) -> StoreResult<Vec<HashId>> {
        let mut added = Vec::new();
        for &hash_id in hash_ids {
            let result =
                sqlx::query("INSERT OR IGNORE INTO current_files (service_id, hash_id) VALUES (?, ?)")
                    .bind(service_id)
                    .bind(hash_id)
                    .execute(&mut *self)
                    .await?;
            if result.rows_affected() == 1 {
                added.push(hash_id);
            }
        }
        Ok(added)
    }

    async fn remove_files(
        &mut self,
        service_id: ServiceId,
        hash_ids: &[HashId],
    ) -> StoreResult<Vec<HashId>> {
        let mut removed = Vec::new();
        for &hash_id in hash_ids {
            let result = sqlx::query("DELETE FROM current_files WHERE service_id = ? AND hash_id = ?")
                .bind(service_id)
                .bind(hash_id)
                .execute(&mut *self)
                .await?;
            if result.rows_affected() == 1 {
                removed.push(hash_id);
            }
        }
        Ok(removed)
    }

    async fn file_services_for_hashes(
        &mut self,
        hash_ids: &[HashId],
    ) -> StoreResult<HashMap<HashId, Vec<ServiceId>>> {
        let mut memberships: HashMap<HashId, Vec<ServiceId>> = HashMap::new();
        if hash_ids.is_empty() {
            return Ok(memberships);
        }
        let rows: Vec<(HashId, ServiceId)> = sqlx::query_as(
            r#"
            SELECT hash_id, service_id FROM current_files
            WHERE hash_id IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(id_list(hash_ids)?)
        .fetch_all(&mut *self)
        .await?;
        for (hash_id, service_id) in rows {
            memberships.entry(hash_id).or_default().push(service_id);
        }
        Ok(memberships)
    }
}
