//! Autocomplete count cache repository.

use crate::autocomplete::{AutocompleteKey, CountDelta};
use crate::error::StoreResult;
use crate::models::{AutocompleteCandidateRow, CountsRow, ServiceId, TagKey};
use async_trait::async_trait;
use sqlx::SqliteConnection;
use tagbase_core::AutocompleteQuery;

/// Repository for the derived `autocomplete_counts` table.
#[async_trait]
pub trait AutocompleteRepo: Send {
    /// Insert zero rows for a new tag under every file service and tag
    /// service pair.
    async fn seed_tag_rows(&mut self, tag: TagKey) -> StoreResult<u64>;

    /// Add a delta to a cached row. Returns `false` when no row exists.
    async fn add_counts(&mut self, key: &AutocompleteKey, delta: CountDelta) -> StoreResult<bool>;

    /// Count directly from the mapping and membership tables.
    async fn compute_counts(&mut self, key: &AutocompleteKey) -> StoreResult<CountsRow>;

    /// Insert a computed row, keeping any existing one.
    async fn insert_counts(&mut self, key: &AutocompleteKey, counts: CountsRow) -> StoreResult<()>;

    /// Existing tags matching a query, with their cached counts for one
    /// file and tag service pair when present.
    async fn candidates(
        &mut self,
        file_service_id: ServiceId,
        tag_service_id: ServiceId,
        query: &AutocompleteQuery,
    ) -> StoreResult<Vec<AutocompleteCandidateRow>>;

    /// Drop and recompute every row of one tag service, for every file
    /// service and existing tag.
    async fn recompute_tag_service_rows(&mut self, tag_service_id: ServiceId) -> StoreResult<u64>;

    /// Drop every cached row.
    async fn clear_all_rows(&mut self) -> StoreResult<u64>;
}

#[async_trait]
impl AutocompleteRepo for SqliteConnection {
    async fn seed_tag_rows(&mut self, tag: TagKey) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO autocomplete_counts
                (file_service_id, tag_service_id, namespace_id, tag_id, current_count, pending_count)
            SELECT f.service_id, t.service_id, ?, ?, 0, 0
            FROM services f CROSS JOIN services t
            WHERE f.service_type IN ('local_file', 'file_repository', 'combined_file')
              AND t.service_type IN ('local_tag', 'tag_repository', 'combined_tag')
            "#,
        )
        .bind(tag.namespace_id)
        .bind(tag.tag_id)
        .execute(&mut *self)
        .await?;
        Ok(result.rows_affected())
    }

    async fn add_counts(&mut self, key: &AutocompleteKey, delta: CountDelta) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE autocomplete_counts
            SET current_count = current_count + ?, pending_count = pending_count + ?
            WHERE file_service_id = ? AND tag_service_id = ? AND namespace_id = ? AND tag_id = ?
            "#,
        )
        .bind(delta.current)
        .bind(delta.pending)
        .bind(key.file_service_id)
        .bind(key.tag_service_id)
        .bind(key.tag.namespace_id)
        .bind(key.tag.tag_id)
        .execute(&mut *self)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn compute_counts(&mut self, key: &AutocompleteKey) -> StoreResult<CountsRow> {
        let row = sqlx::query_as::<_, CountsRow>(
            r#"
            SELECT
                COALESCE(SUM(m.status = 0), 0) AS current_count,
                COALESCE(SUM(m.status = 1), 0) AS pending_count
            FROM mappings m
            WHERE m.service_id = ?1 AND m.namespace_id = ?2 AND m.tag_id = ?3
              AND (
                (SELECT service_type FROM services WHERE service_id = ?4) = 'combined_file'
                OR EXISTS (
                    SELECT 1 FROM current_files cf
                    WHERE cf.service_id = ?4 AND cf.hash_id = m.hash_id
                )
              )
            "#,
        )
        .bind(key.tag_service_id)
        .bind(key.tag.namespace_id)
        .bind(key.tag.tag_id)
        .bind(key.file_service_id)
        .fetch_one(&mut *self)
        .await?;
        Ok(row)
    }

    async fn insert_counts(&mut self, key: &AutocompleteKey, counts: CountsRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO autocomplete_counts
                (file_service_id, tag_service_id, namespace_id, tag_id, current_count, pending_count)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.file_service_id)
        .bind(key.tag_service_id)
        .bind(key.tag.namespace_id)
        .bind(key.tag.tag_id)
        .bind(counts.current_count)
        .bind(counts.pending_count)
        .execute(&mut *self)
        .await?;
        Ok(())
    }

    async fn candidates(
        &mut self,
        file_service_id: ServiceId,
        tag_service_id: ServiceId,
        query: &AutocompleteQuery,
    ) -> StoreResult<Vec<AutocompleteCandidateRow>> {
        let rows = sqlx::query_as::<_, AutocompleteCandidateRow>(
            r#"
            SELECT e.namespace_id, e.tag_id, n.namespace, s.subtag,
                   a.current_count, a.pending_count
            FROM existing_tags e
            JOIN namespaces n ON n.namespace_id = e.namespace_id
            JOIN subtags s ON s.tag_id = e.tag_id
            LEFT JOIN autocomplete_counts a
              ON a.file_service_id = ?1 AND a.tag_service_id = ?2
             AND a.namespace_id = e.namespace_id AND a.tag_id = e.tag_id
            WHERE s.subtag LIKE ?3 ESCAPE '\'
              AND (?4 IS NULL OR n.namespace = ?4)
            "#,
        )
        .bind(file_service_id)
        .bind(tag_service_id)
        .bind(&query.subtag_pattern)
        .bind(query.namespace.as_deref())
        .fetch_all(&mut *self)
        .await?;
        Ok(rows)
    }

    async fn recompute_tag_service_rows(&mut self, tag_service_id: ServiceId) -> StoreResult<u64> {
        sqlx::query("DELETE FROM autocomplete_counts WHERE tag_service_id = ?")
            .bind(tag_service_id)
            .execute(&mut *self)
            .await?;
        let result = sqlx::query(
            r#"
            INSERT INTO autocomplete_counts
                (file_service_id, tag_service_id, namespace_id, tag_id, current_count, pending_count)
            SELECT f.service_id, ?1, e.namespace_id, e.tag_id,
                (SELECT COUNT(*) FROM mappings m
                 WHERE m.service_id = ?1 AND m.namespace_id = e.namespace_id
                   AND m.tag_id = e.tag_id AND m.status = 0
                   AND (f.service_type = 'combined_file' OR EXISTS (
                       SELECT 1 FROM current_files cf
                       WHERE cf.service_id = f.service_id AND cf.hash_id = m.hash_id))),
                (SELECT COUNT(*) FROM mappings m
                 WHERE m.service_id = ?1 AND m.namespace_id = e.namespace_id
                   AND m.tag_id = e.tag_id AND m.status = 1
                   AND (f.service_type = 'combined_file' OR EXISTS (
                       SELECT 1 FROM current_files cf
                       WHERE cf.service_id = f.service_id AND cf.hash_id = m.hash_id)))
            FROM existing_tags e CROSS JOIN services f
            WHERE f.service_type IN ('local_file', 'file_repository', 'combined_file')
            "#,
        )
        .bind(tag_service_id)
        .execute(&mut *self)
        .await?;
        Ok(result.rows_affected())
    }

    async fn clear_all_rows(&mut self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM autocomplete_counts")
            .execute(&mut *self)
            .await?;
        Ok(result.rows_affected())
    }
}
