//! SQLite tag store: connection setup, schema, and the public operations.
//!
//! Every operation runs in one transaction that commits or rolls back as a
//! whole. The pool holds a single connection, so operations never
//! interleave at the database either.

use crate::autocomplete;
use crate::error::{StoreError, StoreResult};
use crate::merge;
use crate::models::{FileDomain, Petition, ServiceRecord};
use crate::processor::BatchProcessor;
use crate::registry::{PrecedenceOrder, ServiceLookup, ServiceRegistry};
use crate::repos::{AutocompleteRepo, InternerRepo, MappingRepo, PetitionRepo, ServiceRepo};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::str::FromStr;
use tagbase_core::config::{StoreConfig, TaggedPolicy};
use tagbase_core::{
    AutocompleteMatch, AutocompleteQuery, ContentHash, MappingStatus, ServiceChange, ServiceKey,
    ServiceType, ServiceUpdates, Tag,
};
use time::OffsetDateTime;

/// SQLite-backed tag store.
pub struct SqliteTagStore {
    pool: Pool<Sqlite>,
    autocomplete_limit: usize,
    tagged_policy: TaggedPolicy,
}

impl SqliteTagStore {
    /// Open (creating if needed) and migrate a store.
    pub async fn new(config: &StoreConfig) -> StoreResult<Self> {
        config
            .validate()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let opts = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            // Ensure parent directory exists
            if let Some(parent) = config.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };
        let opts = opts
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout());

        let pool = SqlitePoolOptions::new()
            // one writer: a single connection serializes every operation
            .max_connections(1)
            .min_connections(1)
            // an in-memory database lives only as long as its connection
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            autocomplete_limit: config.autocomplete_limit,
            tagged_policy: config.tagged_policy,
        };
        store.migrate().await?;

        tracing::info!(
            path = %config.path.display(),
            tagged_policy = ?config.tagged_policy,
            "tag store opened"
        );
        Ok(store)
    }

    /// Open a throwaway in-memory store.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::new(&StoreConfig::for_testing()).await
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Create tables and seed the combined services. Idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(SCHEMA_SQL).execute(&mut *tx).await?;

        let now = OffsetDateTime::now_utc();
        for (key, service_type, name) in [
            (
                ServiceKey::combined_tags(),
                ServiceType::CombinedTag,
                "all known tags",
            ),
            (
                ServiceKey::combined_files(),
                ServiceType::CombinedFile,
                "all known files",
            ),
        ] {
            sqlx::query(
                "INSERT OR IGNORE INTO services (service_key, service_type, name, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(*key.as_uuid())
            .bind(service_type.as_str())
            .bind(name)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Check database connectivity and health.
    pub async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // =========================================================================
    // Service registry
    // =========================================================================

    /// Register a real service. A tag service joins the precedence order as
    /// the least trusted.
    pub async fn register_service(
        &self,
        service_key: ServiceKey,
        service_type: ServiceType,
        name: &str,
    ) -> StoreResult<ServiceRecord> {
        if service_type.is_combined() {
            return Err(StoreError::InvalidService(format!(
                "{service_type} services are built in and cannot be registered"
            )));
        }

        let mut tx = self.pool.begin().await?;
        if tx.get_service_by_key(service_key).await?.is_some() {
            return Err(StoreError::AlreadyExists(format!(
                "service {service_key} already exists"
            )));
        }

        let record = tx
            .insert_service(service_key, service_type, name, OffsetDateTime::now_utc())
            .await?;
        if service_type.is_ranked() {
            let current = tx.load_precedence().await?;
            let mut services = current.services().to_vec();
            services.push(record.service_id);
            let order = tx.write_precedence(&services).await?;
            tracing::debug!(version = order.version(), "precedence order extended");
        }
        tx.commit().await?;

        tracing::info!(
            service_key = %service_key,
            service_type = %service_type,
            name,
            "service registered"
        );
        Ok(record)
    }

    /// Remove a real service and everything recorded under it.
    pub async fn deregister_service(&self, lookup: ServiceLookup) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let registry = ServiceRegistry::load(&mut tx).await?;
        let service = registry.require(lookup)?.clone();
        if service.service_type.is_combined() {
            return Err(StoreError::InvalidService(format!(
                "the {} service cannot be removed",
                service.service_type
            )));
        }

        if service.service_type.is_ranked() {
            let services: Vec<_> = registry
                .precedence()
                .services()
                .iter()
                .copied()
                .filter(|id| *id != service.service_id)
                .collect();
            tx.write_precedence(&services).await?;
        }
        tx.delete_service(service.service_id).await?;

        if service.service_type.is_tag_service() {
            let registry = ServiceRegistry::load(&mut tx).await?;
            rebuild_combined_in(&mut tx, &registry, FileDomain::AllFiles).await?;
        }
        tx.commit().await?;

        tracing::info!(
            service_key = %service.service_key,
            service_type = %service.service_type,
            "service deregistered"
        );
        Ok(())
    }

    /// List every service, combined ones included.
    pub async fn list_services(&self) -> StoreResult<Vec<ServiceRecord>> {
        let mut conn = self.pool.acquire().await?;
        conn.list_services().await
    }

    /// Get one service.
    pub async fn get_service(&self, lookup: ServiceLookup) -> StoreResult<ServiceRecord> {
        let mut conn = self.pool.acquire().await?;
        let registry = ServiceRegistry::load(&mut conn).await?;
        Ok(registry.require(lookup)?.clone())
    }

    /// The current precedence order as a versioned value.
    pub async fn precedence_order(&self) -> StoreResult<PrecedenceOrder> {
        let mut conn = self.pool.acquire().await?;
        conn.load_precedence().await
    }

    /// Real tag service keys, most trusted first.
    pub async fn get_tag_service_precedence(&self) -> StoreResult<Vec<ServiceKey>> {
        let mut conn = self.pool.acquire().await?;
        let registry = ServiceRegistry::load(&mut conn).await?;
        registry
            .precedence()
            .services()
            .iter()
            .map(|id| {
                registry
                    .require(ServiceLookup::Id(*id))
                    .map(|service| service.service_key)
            })
            .collect()
    }

    /// Replace the precedence order and rebuild the combined view.
    ///
    /// `keys` must list every real tag service exactly once, most trusted
    /// first. Setting the order it already has is a no-op.
    pub async fn set_tag_service_precedence(&self, keys: &[ServiceKey]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let registry = ServiceRegistry::load(&mut tx).await?;
        let services = registry.precedence_from_keys(keys)?;
        if services == registry.precedence().services() {
            tracing::debug!("precedence order unchanged");
            return Ok(());
        }

        let order = tx.write_precedence(&services).await?;
        let registry = ServiceRegistry::load(&mut tx).await?;
        rebuild_combined_in(&mut tx, &registry, FileDomain::AllFiles).await?;
        tx.commit().await?;

        tracing::info!(version = order.version(), services = order.len(), "precedence order set");
        Ok(())
    }

    // =========================================================================
    // Content updates
    // =========================================================================

    /// Apply a batch of content updates atomically.
    pub async fn apply_content_updates(
        &self,
        updates: &ServiceUpdates,
    ) -> StoreResult<Vec<ServiceChange>> {
        let mut tx = self.pool.begin().await?;
        let registry = ServiceRegistry::load(&mut tx).await?;
        let changes = BatchProcessor::new(&mut tx, &registry, OffsetDateTime::now_utc())
            .apply(updates)
            .await?;
        tx.commit().await?;

        let updates_count: usize = updates.values().map(Vec::len).sum();
        tracing::debug!(
            services = updates.len(),
            updates = updates_count,
            changed_services = changes.len(),
            "content updates committed"
        );
        Ok(changes)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Status of one mapping; `None` when absent. Never creates ids.
    pub async fn get_mapping_status(
        &self,
        service_key: ServiceKey,
        tag: &Tag,
        hash: &ContentHash,
    ) -> StoreResult<Option<MappingStatus>> {
        let mut conn = self.pool.acquire().await?;
        let registry = ServiceRegistry::load(&mut conn).await?;
        let service_id = registry
            .require_tag_service(ServiceLookup::Key(service_key))?
            .service_id;

        let Some(tag_key) = conn.lookup_tag(tag).await? else {
            return Ok(None);
        };
        let Some(hash_id) = conn.lookup_hash(hash).await? else {
            return Ok(None);
        };
        conn.get_status(service_id, tag_key, hash_id).await
    }

    /// Outstanding petitions on a tag service.
    pub async fn get_petitions(&self, service_key: ServiceKey) -> StoreResult<Vec<Petition>> {
        let mut conn = self.pool.acquire().await?;
        let registry = ServiceRegistry::load(&mut conn).await?;
        let service_id = registry
            .require_tag_service(ServiceLookup::Key(service_key))?
            .service_id;
        conn.list_petitions(service_id).await
    }

    /// Autocomplete search. Missing counter rows are computed and stored.
    pub async fn get_autocomplete_matches(
        &self,
        tag_service_key: ServiceKey,
        file_service_key: ServiceKey,
        partial_text: &str,
        include_current: bool,
        include_pending: bool,
    ) -> StoreResult<Vec<AutocompleteMatch>> {
        let Some(query) = AutocompleteQuery::parse(partial_text) else {
            return Ok(Vec::new());
        };

        let mut tx = self.pool.begin().await?;
        let registry = ServiceRegistry::load(&mut tx).await?;
        let tag_service_id = registry
            .require_tag_service(ServiceLookup::Key(tag_service_key))?
            .service_id;
        let file_service_id = registry
            .require_file_service(ServiceLookup::Key(file_service_key))?
            .service_id;

        let matches = autocomplete::search(
            &mut tx,
            file_service_id,
            tag_service_id,
            &query,
            include_current,
            include_pending,
            self.autocomplete_limit,
        )
        .await?;
        tx.commit().await?;
        Ok(matches)
    }

    /// Number of files in a domain tagged under a tag service, per the
    /// configured policy.
    pub async fn count_tagged_hashes(
        &self,
        tag_service_key: ServiceKey,
        file_service_key: ServiceKey,
    ) -> StoreResult<u64> {
        let mut conn = self.pool.acquire().await?;
        let registry = ServiceRegistry::load(&mut conn).await?;
        let tag_service_id = registry
            .require_tag_service(ServiceLookup::Key(tag_service_key))?
            .service_id;
        let domain = registry.file_domain(ServiceLookup::Key(file_service_key))?;
        conn.count_tagged_hashes(tag_service_id, domain, self.tagged_policy)
            .await
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Rebuild the combined view for a file domain, then the combined tag
    /// service's autocomplete rows.
    pub async fn rebuild_combined_view(&self, file_service_key: ServiceKey) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let registry = ServiceRegistry::load(&mut tx).await?;
        let domain = registry.file_domain(ServiceLookup::Key(file_service_key))?;
        rebuild_combined_in(&mut tx, &registry, domain).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Drop and recompute the whole autocomplete cache.
    pub async fn rebuild_autocomplete_cache(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let registry = ServiceRegistry::load(&mut tx).await?;
        let tag_service_ids: Vec<_> = registry
            .services()
            .iter()
            .filter(|s| s.service_type.is_tag_service())
            .map(|s| s.service_id)
            .collect();
        autocomplete::rebuild_cache(&mut tx, &tag_service_ids).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Full combined rebuild for `domain` plus the combined tag service's
/// counter rows in every file domain.
async fn rebuild_combined_in(
    conn: &mut SqliteConnection,
    registry: &ServiceRegistry,
    domain: FileDomain,
) -> StoreResult<()> {
    merge::rebuild_combined(conn, registry, domain).await?;
    let rows = conn
        .recompute_tag_service_rows(registry.combined_tag_service_id())
        .await?;
    tracing::debug!(rows, "combined autocomplete rows recomputed");
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Interned identifiers
CREATE TABLE IF NOT EXISTS hashes (
    hash_id INTEGER PRIMARY KEY,
    hash BLOB NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS namespaces (
    namespace_id INTEGER PRIMARY KEY,
    namespace TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS subtags (
    tag_id INTEGER PRIMARY KEY,
    subtag TEXT NOT NULL UNIQUE
);

-- Every tag ever interned; never pruned
CREATE TABLE IF NOT EXISTS existing_tags (
    namespace_id INTEGER NOT NULL REFERENCES namespaces(namespace_id),
    tag_id INTEGER NOT NULL REFERENCES subtags(tag_id),
    PRIMARY KEY (namespace_id, tag_id)
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_existing_tags_tag ON existing_tags(tag_id);

-- Services and precedence
CREATE TABLE IF NOT EXISTS services (
    service_id INTEGER PRIMARY KEY,
    service_key BLOB NOT NULL UNIQUE,
    service_type TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tag_service_precedence (
    service_id INTEGER PRIMARY KEY REFERENCES services(service_id) ON DELETE CASCADE,
    precedence INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_options (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
INSERT OR IGNORE INTO store_options (name, value) VALUES ('precedence_version', 0);

-- File domain membership for real file services
CREATE TABLE IF NOT EXISTS current_files (
    service_id INTEGER NOT NULL REFERENCES services(service_id) ON DELETE CASCADE,
    hash_id INTEGER NOT NULL REFERENCES hashes(hash_id),
    PRIMARY KEY (service_id, hash_id)
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_current_files_hash ON current_files(hash_id);

-- Mapping statuses: 0 current, 1 pending, 2 deleted.
-- Rows of the combined tag service are derived by the merge.
CREATE TABLE IF NOT EXISTS mappings (
    service_id INTEGER NOT NULL REFERENCES services(service_id) ON DELETE CASCADE,
    namespace_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    hash_id INTEGER NOT NULL,
    status INTEGER NOT NULL,
    PRIMARY KEY (service_id, namespace_id, tag_id, hash_id)
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_mappings_service_hash ON mappings(service_id, hash_id);
CREATE INDEX IF NOT EXISTS idx_mappings_tag_hash ON mappings(namespace_id, tag_id, hash_id);
CREATE INDEX IF NOT EXISTS idx_mappings_hash ON mappings(hash_id);

CREATE TABLE IF NOT EXISTS petitions (
    service_id INTEGER NOT NULL REFERENCES services(service_id) ON DELETE CASCADE,
    namespace_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    hash_id INTEGER NOT NULL,
    reason TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (service_id, namespace_id, tag_id, hash_id)
) WITHOUT ROWID;

-- Derived counters; dropping this table loses nothing
CREATE TABLE IF NOT EXISTS autocomplete_counts (
    file_service_id INTEGER NOT NULL REFERENCES services(service_id) ON DELETE CASCADE,
    tag_service_id INTEGER NOT NULL REFERENCES services(service_id) ON DELETE CASCADE,
    namespace_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    current_count INTEGER NOT NULL DEFAULT 0,
    pending_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (file_service_id, tag_service_id, namespace_id, tag_id)
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_autocomplete_tag_service ON autocomplete_counts(tag_service_id);
"#;
