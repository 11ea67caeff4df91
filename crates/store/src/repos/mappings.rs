//! Mapping repository.

use crate::error::StoreResult;
use crate::models::{
    FileDomain, HashId, HashMappingRow, MappingStatusRow, OpinionRow, ServiceId, TagKey,
};
use crate::repos::id_list;
use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use tagbase_core::MappingStatus;
use tagbase_core::config::TaggedPolicy;

/// Repository for per-service mapping status records.
#[async_trait]
pub trait MappingRepo: Send {
    /// Get the status of one key.
    async fn get_status(
        &mut self,
        service_id: ServiceId,
        tag: TagKey,
        hash_id: HashId,
    ) -> StoreResult<Option<MappingStatus>>;

    /// Get the statuses of a set of hashes under one service and tag.
    /// Absent keys are missing from the map.
    async fn get_statuses(
        &mut self,
        service_id: ServiceId,
        tag: TagKey,
        hash_ids: &[HashId],
    ) -> StoreResult<HashMap<HashId, MappingStatus>>;

    /// Set the status of a set of hashes, replacing any prior status.
    async fn set_statuses(
        &mut self,
        service_id: ServiceId,
        tag: TagKey,
        hash_ids: &[HashId],
        status: MappingStatus,
    ) -> StoreResult<()>;

    /// Return a set of keys to absent.
    async fn clear_statuses(
        &mut self,
        service_id: ServiceId,
        tag: TagKey,
        hash_ids: &[HashId],
    ) -> StoreResult<()>;

    /// Every service's status rows for a tag over a set of hashes.
    async fn get_opinions(&mut self, tag: TagKey, hash_ids: &[HashId])
    -> StoreResult<Vec<OpinionRow>>;

    /// CURRENT and PENDING rows on any tag service for a set of hashes.
    async fn live_mappings_for_hashes(
        &mut self,
        hash_ids: &[HashId],
    ) -> StoreResult<Vec<HashMappingRow>>;

    /// Delete one service's rows for hashes in a file domain.
    async fn clear_service_rows(
        &mut self,
        service_id: ServiceId,
        domain: FileDomain,
    ) -> StoreResult<u64>;

    /// Copy `source` rows with `status` into `target`, keeping existing
    /// target rows.
    async fn copy_status_rows(
        &mut self,
        target: ServiceId,
        source: ServiceId,
        status: MappingStatus,
        domain: FileDomain,
    ) -> StoreResult<u64>;

    /// Delete CURRENT `target` rows that `source` holds DELETED.
    async fn remove_deleted_by(
        &mut self,
        target: ServiceId,
        source: ServiceId,
        domain: FileDomain,
    ) -> StoreResult<u64>;

    /// Copy PENDING rows of every ranked tag service into `target`,
    /// keeping existing target rows.
    async fn copy_ranked_pending_rows(
        &mut self,
        target: ServiceId,
        domain: FileDomain,
    ) -> StoreResult<u64>;

    /// Number of distinct hashes in a file domain holding any tag under a
    /// tag service.
    async fn count_tagged_hashes(
        &mut self,
        service_id: ServiceId,
        domain: FileDomain,
        policy: TaggedPolicy,
    ) -> StoreResult<u64>;
}

fn decode_status(code: i64) -> StoreResult<MappingStatus> {
    Ok(MappingStatus::from_i64(code)?)
}

#[async_trait]
impl MappingRepo for SqliteConnection {
    async fn get_status(
        &mut self,
        service_id: ServiceId,
        tag: TagKey,
        hash_id: HashId,
    ) -> StoreResult<Option<MappingStatus>> {
        let code: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT status FROM mappings
            WHERE service_id = ? AND namespace_id = ? AND tag_id = ? AND hash_id = ?
            "#,
        )
        .bind(service_id)
        .bind(tag.namespace_id)
        .bind(tag.tag_id)
        .bind(hash_id)
        .fetch_optional(&mut *self)
        .await?;
        code.map(decode_status).transpose()
    }

    async fn get_statuses(
        &mut self,
        service_id: ServiceId,
        tag: TagKey,
        hash_ids: &[HashId],
    ) -> StoreResult<HashMap<HashId, MappingStatus>> {
        if hash_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, MappingStatusRow>(
            r#"
            SELECT hash_id, status FROM mappings
            WHERE service_id = ? AND namespace_id = ? AND tag_id = ?
              AND hash_id IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(service_id)
        .bind(tag.namespace_id)
        .bind(tag.tag_id)
        .bind(id_list(hash_ids)?)
        .fetch_all(&mut *self)
        .await?;

        rows.into_iter()
            .map(|row| Ok((row.hash_id, decode_status(row.status)?)))
            .collect()
    }

    async fn set_statuses(
        &mut self,
        service_id: ServiceId,
        tag: TagKey,
        hash_ids: &[HashId],
        status: MappingStatus,
    ) -> StoreResult<()> {
        if hash_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO mappings (service_id, namespace_id, tag_id, hash_id, status)
            SELECT ?, ?, ?, value, ? FROM json_each(?)
            "#,
        )
        .bind(service_id)
        .bind(tag.namespace_id)
        .bind(tag.tag_id)
        .bind(status.as_i64())
        .bind(id_list(hash_ids)?)
        .execute(&mut *self)
        .await?;
        Ok(())
    }

    async fn clear_statuses(
        &mut self,
        service_id: ServiceId,
        tag: TagKey,
        hash_ids: &[HashId],
    ) -> StoreResult<()> {
        if hash_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            DELETE FROM mappings
            WHERE service_id = ? AND namespace_id = ? AND tag_id = ?
              AND hash_id IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(service_id)
        .bind(tag.namespace_id)
        .bind(tag.tag_id)
        .bind(id_list(hash_ids)?)
        .execute(&mut *self)
        .await?;
        Ok(())
    }

    async fn get_opinions(
        &mut self,
        tag: TagKey,
        hash_ids: &[HashId],
    ) -> StoreResult<Vec<OpinionRow>> {
        if hash_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, OpinionRow>(
            r#"
            SELECT hash_id, service_id, status FROM mappings
            WHERE namespace_id = ? AND tag_id = ?
              AND hash_id IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(tag.namespace_id)
        .bind(tag.tag_id)
        .bind(id_list(hash_ids)?)
        .fetch_all(&mut *self)
        .await?;
        Ok(rows)
    }

    async fn live_mappings_for_hashes(
        &mut self,
        hash_ids: &[HashId],
    ) -> StoreResult<Vec<HashMappingRow>> {
        if hash_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, HashMappingRow>(
            r#"
            SELECT service_id, namespace_id, tag_id, status FROM mappings
            WHERE hash_id IN (SELECT value FROM json_each(?))
              AND status IN (0, 1)
            "#,
        )
        .bind(id_list(hash_ids)?)
        .fetch_all(&mut *self)
        .await?;
        Ok(rows)
    }

    async fn clear_service_rows(
        &mut self,
        service_id: ServiceId,
        domain: FileDomain,
    ) -> StoreResult<u64> {
        let (all_files, file_service_id) = domain.binds();
        let result = sqlx::query(
            r#"
            DELETE FROM mappings
            WHERE service_id = ?
              AND (? = 1 OR hash_id IN (SELECT hash_id FROM current_files WHERE service_id = ?))
            "#,
        )
        .bind(service_id)
        .bind(all_files)
        .bind(file_service_id)
        .execute(&mut *self)
        .await?;
        Ok(result.rows_affected())
    }

    async fn copy_status_rows(
        &mut self,
        target: ServiceId,
        source: ServiceId,
        status: MappingStatus,
        domain: FileDomain,
    ) -> StoreResult<u64> {
        let (all_files, file_service_id) = domain.binds();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO mappings (service_id, namespace_id, tag_id, hash_id, status)
            SELECT ?, namespace_id, tag_id, hash_id, status FROM mappings
            WHERE service_id = ? AND status = ?
              AND (? = 1 OR hash_id IN (SELECT hash_id FROM current_files WHERE service_id = ?))
            "#,
        )
        .bind(target)
        .bind(source)
        .bind(status.as_i64())
        .bind(all_files)
        .bind(file_service_id)
        .execute(&mut *self)
        .await?;
        Ok(result.rows_affected())
    }

    async fn remove_deleted_by(
        &mut self,
        target: ServiceId,
        source: ServiceId,
        domain: FileDomain,
    ) -> StoreResult<u64> {
        let (all_files, file_service_id) = domain.binds();
        let result = sqlx::query(
            r#"
            DELETE FROM mappings
            WHERE service_id = ? AND status = 0
              AND EXISTS (
                SELECT 1 FROM mappings d
                WHERE d.service_id = ? AND d.status = 2
                  AND d.namespace_id = mappings.namespace_id
                  AND d.tag_id = mappings.tag_id
                  AND d.hash_id = mappings.hash_id
              )
              AND (? = 1 OR hash_id IN (SELECT hash_id FROM current_files WHERE service_id = ?))
            "#,
        )
        .bind(target)
        .bind(source)
        .bind(all_files)
        .bind(file_service_id)
        .execute(&mut *self)
        .await?;
        Ok(result.rows_affected())
    }

    async fn copy_ranked_pending_rows(
        &mut self,
        target: ServiceId,
        domain: FileDomain,
    ) -> StoreResult<u64> {
        let (all_files, file_service_id) = domain.binds();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO mappings (service_id, namespace_id, tag_id, hash_id, status)
            SELECT DISTINCT ?, namespace_id, tag_id, hash_id, 1 FROM mappings
            WHERE status = 1
              AND service_id IN (SELECT service_id FROM tag_service_precedence)
              AND (? = 1 OR hash_id IN (SELECT hash_id FROM current_files WHERE service_id = ?))
            "#,
        )
        .bind(target)
        .bind(all_files)
        .bind(file_service_id)
        .execute(&mut *self)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_tagged_hashes(
        &mut self,
        service_id: ServiceId,
        domain: FileDomain,
        policy: TaggedPolicy,
    ) -> StoreResult<u64> {
        let (all_files, file_service_id) = domain.binds();
        let max_status = match policy {
            TaggedPolicy::CurrentOnly => MappingStatus::Current.as_i64(),
            TaggedPolicy::CurrentOrPending => MappingStatus::Pending.as_i64(),
        };
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT hash_id) FROM mappings
            WHERE service_id = ? AND status <= ?
              AND (? = 1 OR hash_id IN (SELECT hash_id FROM current_files WHERE service_id = ?))
            "#,
        )
        .bind(service_id)
        .bind(max_status)
        .bind(all_files)
        .bind(file_service_id)
        .fetch_one(&mut *self)
        .await?;
        Ok(count as u64)
    }
}
