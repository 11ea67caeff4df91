//! Petition ledger repository.

use crate::error::StoreResult;
use crate::models::{HashId, Petition, PetitionRow, ServiceId, TagKey};
use crate::repos::id_list;
use async_trait::async_trait;
use sqlx::SqliteConnection;
use tagbase_core::{ContentHash, Tag};
use time::OffsetDateTime;

/// Repository for outstanding delete-requests.
#[async_trait]
pub trait PetitionRepo: Send {
    /// Create or replace the petition for one key.
    async fn upsert_petition(
        &mut self,
        service_id: ServiceId,
        tag: TagKey,
        hash_id: HashId,
        reason: &str,
        created_at: OffsetDateTime,
    ) -> StoreResult<()>;

    /// Remove petitions for a set of keys. Returns how many existed.
    async fn remove_petitions(
        &mut self,
        service_id: ServiceId,
        tag: TagKey,
        hash_ids: &[HashId],
    ) -> StoreResult<u64>;

    /// List a service's petitions ordered by tag then hash.
    async fn list_petitions(&mut self, service_id: ServiceId) -> StoreResult<Vec<Petition>>;
}

#[async_trait]
impl PetitionRepo for SqliteConnection {
    async fn upsert_petition(
        &mut self,
        service_id: ServiceId,
        tag: TagKey,
        hash_id: HashId,
        reason: &str,
        created_at: OffsetDateTime,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO petitions
                (service_id, namespace_id, tag_id, hash_id, reason, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(service_id)
        .bind(tag.namespace_id)
        .bind(tag.tag_id)
        .bind(hash_id)
        .bind(reason)
        .bind(created_at)
        .execute(&mut *self)
        .await?;
        Ok(())
    }

    async fn remove_petitions(
        &mut self,
        service_id: ServiceId,
        tag: TagKey,
        hash_ids: &[HashId],
    ) -> StoreResult<u64> {
        if hash_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
            DELETE FROM petitions
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
        Ok(result.rows_affected())
    }

    async fn list_petitions(&mut self, service_id: ServiceId) -> StoreResult<Vec<Petition>> {
        let rows = sqlx::query_as::<_, PetitionRow>(
            r#"
            SELECT n.namespace, s.subtag, h.hash, p.reason, p.created_at
            FROM petitions p
            JOIN namespaces n ON n.namespace_id = p.namespace_id
            JOIN subtags s ON s.tag_id = p.tag_id
            JOIN hashes h ON h.hash_id = p.hash_id
            WHERE p.service_id = ?
            ORDER BY n.namespace, s.subtag, h.hash
            "#,
        )
        .bind(service_id)
        .fetch_all(&mut *self)
        .await?;

        let mut petitions = Vec::with_capacity(rows.len());
        for row in rows {
            // stored parts are already clean
            let tag = Tag {
                namespace: row.namespace,
                subtag: row.subtag,
            };
            petitions.push(Petition {
                tag,
                hash: ContentHash::from_slice(&row.hash)?,
                reason: row.reason,
                created_at: row.created_at,
            });
        }
        Ok(petitions)
    }
}
