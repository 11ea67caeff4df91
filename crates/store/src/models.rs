//! Database models mapping to the tag store schema.

use sqlx::FromRow;
use tagbase_core::{ContentHash, MappingStatus, ServiceKey, ServiceType, Tag};
use time::OffsetDateTime;
use uuid::Uuid;

/// Surrogate id of an interned content hash.
pub type HashId = i64;
/// Surrogate id of an interned namespace.
pub type NamespaceId = i64;
/// Surrogate id of an interned subtag.
pub type TagId = i64;
/// Surrogate id of a registered service.
pub type ServiceId = i64;

/// Interned `(namespace_id, tag_id)` pair identifying one tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagKey {
    pub namespace_id: NamespaceId,
    pub tag_id: TagId,
}

impl TagKey {
    pub fn new(namespace_id: NamespaceId, tag_id: TagId) -> Self {
        Self {
            namespace_id,
            tag_id,
        }
    }
}

/// The set of hashes a file-relative computation is restricted to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileDomain {
    /// Every interned hash (the combined file service).
    AllFiles,
    /// Members of one real file service.
    Service(ServiceId),
}

impl FileDomain {
    /// `(all_files, service_id)` bind values for the shared domain filter
    /// `(? = 1 OR hash_id IN (SELECT hash_id FROM current_files WHERE service_id = ?))`.
    pub(crate) fn binds(&self) -> (bool, ServiceId) {
        match self {
            Self::AllFiles => (true, 0),
            Self::Service(service_id) => (false, *service_id),
        }
    }
}

// =============================================================================
// Services
// =============================================================================

/// Raw service record.
#[derive(Debug, Clone, FromRow)]
pub struct ServiceRow {
    pub service_id: ServiceId,
    pub service_key: Uuid,
    pub service_type: String,
    pub name: String,
    pub created_at: OffsetDateTime,
}

/// A registered service with its type decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub service_id: ServiceId,
    pub service_key: ServiceKey,
    pub service_type: ServiceType,
    pub name: String,
    pub created_at: OffsetDateTime,
}

impl TryFrom<ServiceRow> for ServiceRecord {
    type Error = tagbase_core::Error;

    fn try_from(row: ServiceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            service_id: row.service_id,
            service_key: ServiceKey::from_uuid(row.service_key),
            service_type: ServiceType::parse(&row.service_type)?,
            name: row.name,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Mappings and petitions
// =============================================================================

/// A mapping status read back for one hash.
#[derive(Debug, Clone, FromRow)]
pub struct MappingStatusRow {
    pub hash_id: HashId,
    pub status: i64,
}

/// One service's opinion on a `(namespace, tag, hash)` triple.
#[derive(Debug, Clone, FromRow)]
pub struct OpinionRow {
    pub hash_id: HashId,
    pub service_id: ServiceId,
    pub status: i64,
}

/// A live mapping row joined to a tag, used for membership deltas.
#[derive(Debug, Clone, FromRow)]
pub struct HashMappingRow {
    pub service_id: ServiceId,
    pub namespace_id: NamespaceId,
    pub tag_id: TagId,
    pub status: i64,
}

/// Status change of one key on one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub hash_id: HashId,
    pub before: Option<MappingStatus>,
    pub after: Option<MappingStatus>,
}

/// Raw petition record with its tag and hash resolved.
#[derive(Debug, Clone, FromRow)]
pub struct PetitionRow {
    pub namespace: String,
    pub subtag: String,
    pub hash: Vec<u8>,
    pub reason: String,
    pub created_at: OffsetDateTime,
}

/// An outstanding petition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Petition {
    pub tag: Tag,
    pub hash: ContentHash,
    pub reason: String,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Autocomplete
// =============================================================================

/// Autocomplete candidate: an existing tag with its cached counts, if any.
#[derive(Debug, Clone, FromRow)]
pub struct AutocompleteCandidateRow {
    pub namespace_id: NamespaceId,
    pub tag_id: TagId,
    pub namespace: String,
    pub subtag: String,
    pub current_count: Option<i64>,
    pub pending_count: Option<i64>,
}

/// Cached counters for one autocomplete key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct CountsRow {
    pub current_count: i64,
    pub pending_count: i64,
}
