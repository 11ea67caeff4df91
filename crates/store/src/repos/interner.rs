//! Identifier interner repository.

use crate::error::StoreResult;
use crate::models::{HashId, NamespaceId, TagId, TagKey};
use crate::repos::AutocompleteRepo;
use async_trait::async_trait;
use sqlx::SqliteConnection;
use tagbase_core::{ContentHash, Tag};

/// Result of interning a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternedTag {
    pub key: TagKey,
    /// Whether this call added the tag to the existing-tags index.
    pub created: bool,
}

/// Repository mapping durable keys to compact surrogate ids.
///
/// The `intern_*` methods create records on first sight; the `lookup_*`
/// methods never allocate.
#[async_trait]
pub trait InternerRepo: Send {
    /// Intern a content hash.
    async fn intern_hash(&mut self, hash: &ContentHash) -> StoreResult<HashId>;

    /// Intern many content hashes, preserving input order.
    async fn intern_hashes(&mut self, hashes: &[ContentHash]) -> StoreResult<Vec<HashId>>;

    /// Intern a tag, registering it in the existing-tags index.
    ///
    /// A tag seen for the first time also gets zero-valued autocomplete rows
    /// for every file service and tag service pair.
    async fn intern_tag(&mut self, tag: &Tag) -> StoreResult<InternedTag>;

    /// Look up a hash id without creating it.
    async fn lookup_hash(&mut self, hash: &ContentHash) -> StoreResult<Option<HashId>>;

    /// Look up the ids of known hashes, skipping unknown ones.
    async fn lookup_hashes(&mut self, hashes: &[ContentHash]) -> StoreResult<Vec<HashId>>;

    /// Look up a tag without creating it.
    async fn lookup_tag(&mut self, tag: &Tag) -> StoreResult<Option<TagKey>>;
}

#[async_trait]
impl InternerRepo for SqliteConnection {
    async fn intern_hash(&mut self, hash: &ContentHash) -> StoreResult<HashId> {
        sqlx::query("INSERT OR IGNORE INTO hashes (hash) VALUES (?)")
            .bind(&hash.as_bytes()[..])
            .execute(&mut *self)
            .await?;
        let hash_id: HashId = sqlx::query_scalar("SELECT hash_id FROM hashes WHERE hash = ?")
            .bind(&hash.as_bytes()[..])
            .fetch_one(&mut *self)
            .await?;
        Ok(hash_id)
    }

    async fn intern_hashes(&mut self, hashes: &[ContentHash]) -> StoreResult<Vec<HashId>> {
        let mut ids = Vec::with_capacity(hashes.len());
        for hash in hashes {
            ids.push(self.intern_hash(hash).await?);
        }
        Ok(ids)
    }

    async fn intern_tag(&mut self, tag: &Tag) -> StoreResult<InternedTag> {
        sqlx::query("INSERT OR IGNORE INTO namespaces (namespace) VALUES (?)")
            .bind(&tag.namespace)
            .execute(&mut *self)
            .await?;
        let namespace_id: NamespaceId =
            sqlx::query_scalar("SELECT namespace_id FROM namespaces WHERE namespace = ?")
                .bind(&tag.namespace)
                .fetch_one(&mut *self)
                .await?;

        sqlx::query("INSERT OR IGNORE INTO subtags (subtag) VALUES (?)")
            .bind(&tag.subtag)
            .execute(&mut *self)
            .await?;
        let tag_id: TagId = sqlx::query_scalar("SELECT tag_id FROM subtags WHERE subtag = ?")
            .bind(&tag.subtag)
            .fetch_one(&mut *self)
            .await?;

        let key = TagKey::new(namespace_id, tag_id);
        let result =
            sqlx::query("INSERT OR IGNORE INTO existing_tags (namespace_id, tag_id) VALUES (?, ?)")
                .bind(namespace_id)
                .bind(tag_id)
                .execute(&mut *self)
                .await?;

        let created = result.rows_affected() == 1;
        if created {
            let seeded = self.seed_tag_rows(key).await?;
            tracing::debug!(tag = %tag, seeded_rows = seeded, "registered new tag");
        }
        Ok(InternedTag { key, created })
    }

    async fn lookup_hash(&mut self, hash: &ContentHash) -> StoreResult<Option<HashId>> {
        let hash_id = sqlx::query_scalar("SELECT hash_id FROM hashes WHERE hash = ?")
            .bind(&hash.as_bytes()[..])
            .fetch_optional(&mut *self)
            .await?;
        Ok(hash_id)
    }

    async fn lookup_hashes(&mut self, hashes: &[ContentHash]) -> StoreResult<Vec<HashId>> {
        let mut ids = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(hash_id) = self.lookup_hash(hash).await? {
                ids.push(hash_id);
            }
        }
        Ok(ids)
    }

    async fn lookup_tag(&mut self, tag: &Tag) -> StoreResult<Option<TagKey>> {
        let row: Option<(NamespaceId, TagId)> = sqlx::query_as(
            r#"
            SELECT e.namespace_id, e.tag_id
            FROM existing_tags e
            JOIN namespaces n ON n.namespace_id = e.namespace_id
            JOIN subtags s ON s.tag_id = e.tag_id
            WHERE n.namespace = ? AND s.subtag = ?
            "#,
        )
        .bind(&tag.namespace)
        .bind(&tag.subtag)
        .fetch_optional(&mut *self)
        .await?;
        Ok(row.map(|(namespace_id, tag_id)| TagKey::new(namespace_id, tag_id)))
    }
}
