//! Service registry and the tag service precedence order.

use crate::error::{StoreError, StoreResult};
use crate::models::{FileDomain, ServiceId, ServiceRecord};
use crate::repos::ServiceRepo;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tagbase_core::{ServiceKey, ServiceType};

/// How a service is addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceLookup {
    Id(ServiceId),
    Key(ServiceKey),
}

impl From<ServiceKey> for ServiceLookup {
    fn from(key: ServiceKey) -> Self {
        Self::Key(key)
    }
}

impl std::fmt::Display for ServiceLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "service_id {id}"),
            Self::Key(key) => write!(f, "service {key}"),
        }
    }
}

/// Immutable, versioned precedence order of real tag services.
///
/// `services` is most trusted first. Every persisted change bumps
/// `version`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrecedenceOrder {
    version: i64,
    services: Arc<[ServiceId]>,
}

impl PrecedenceOrder {
    pub fn new(version: i64, services: Vec<ServiceId>) -> Self {
        Self {
            version,
            services: services.into(),
        }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Service ids, most trusted first.
    pub fn services(&self) -> &[ServiceId] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Snapshot of every known service, loaded inside a transaction.
#[derive(Clone, Debug)]
pub struct ServiceRegistry {
    services: Vec<ServiceRecord>,
    by_id: HashMap<ServiceId, usize>,
    by_key: HashMap<ServiceKey, usize>,
    order: PrecedenceOrder,
    combined_tag: ServiceId,
    combined_file: ServiceId,
}

impl ServiceRegistry {
    /// Load the registry from the database.
    pub async fn load(conn: &mut SqliteConnection) -> StoreResult<Self> {
        let services = conn.list_services().await?;
        let order = conn.load_precedence().await?;
        Self::from_parts(services, order)
    }

    fn from_parts(services: Vec<ServiceRecord>, order: PrecedenceOrder) -> StoreResult<Self> {
        let mut by_id = HashMap::with_capacity(services.len());
        let mut by_key = HashMap::with_capacity(services.len());
        let mut combined_tag = None;
        let mut combined_file = None;
        for (index, service) in services.iter().enumerate() {
            by_id.insert(service.service_id, index);
            by_key.insert(service.service_key, index);
            match service.service_type {
                ServiceType::CombinedTag => combined_tag = Some(service.service_id),
                ServiceType::CombinedFile => combined_file = Some(service.service_id),
                _ => {}
            }
        }

        let (Some(combined_tag), Some(combined_file)) = (combined_tag, combined_file) else {
            return Err(StoreError::Internal(
                "combined services missing; database was not migrated".to_string(),
            ));
        };

        Ok(Self {
            services,
            by_id,
            by_key,
            order,
            combined_tag,
            combined_file,
        })
    }

    /// Find a service.
    pub fn get(&self, lookup: ServiceLookup) -> Option<&ServiceRecord> {
        let index = match lookup {
            ServiceLookup::Id(id) => self.by_id.get(&id),
            ServiceLookup::Key(key) => self.by_key.get(&key),
        }?;
        self.services.get(*index)
    }

    /// Find a service or fail with `NotFound`.
    pub fn require(&self, lookup: ServiceLookup) -> StoreResult<&ServiceRecord> {
        self.get(lookup)
            .ok_or_else(|| StoreError::NotFound(lookup.to_string()))
    }

    /// Find a tag service (real or combined).
    pub fn require_tag_service(&self, lookup: ServiceLookup) -> StoreResult<&ServiceRecord> {
        let service = self.require(lookup)?;
        if !service.service_type.is_tag_service() {
            return Err(StoreError::InvalidService(format!(
                "{} is a {} service, not a tag service",
                service.service_key, service.service_type
            )));
        }
        Ok(service)
    }

    /// Find a file service (real or combined).
    pub fn require_file_service(&self, lookup: ServiceLookup) -> StoreResult<&ServiceRecord> {
        let service = self.require(lookup)?;
        if !service.service_type.is_file_service() {
            return Err(StoreError::InvalidService(format!(
                "{} is a {} service, not a file service",
                service.service_key, service.service_type
            )));
        }
        Ok(service)
    }

    /// Resolve a file service (real or combined) to its file domain.
    pub fn file_domain(&self, lookup: ServiceLookup) -> StoreResult<FileDomain> {
        let service = self.require_file_service(lookup)?;
        Ok(match service.service_type {
            ServiceType::CombinedFile => FileDomain::AllFiles,
            _ => FileDomain::Service(service.service_id),
        })
    }

    /// All services ordered by id.
    pub fn services(&self) -> &[ServiceRecord] {
        &self.services
    }

    /// The current precedence order.
    pub fn precedence(&self) -> &PrecedenceOrder {
        &self.order
    }

    pub fn combined_tag_service_id(&self) -> ServiceId {
        self.combined_tag
    }

    pub fn combined_file_service_id(&self) -> ServiceId {
        self.combined_file
    }

    /// Map a caller-supplied list of keys to a new precedence order.
    ///
    /// The keys must name every real tag service exactly once.
    pub fn precedence_from_keys(&self, keys: &[ServiceKey]) -> StoreResult<Vec<ServiceId>> {
        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            let service = self.require(ServiceLookup::Key(*key))?;
            if !service.service_type.is_ranked() {
                return Err(StoreError::InvalidPrecedence(format!(
                    "{} is a {} service and cannot be ranked",
                    key, service.service_type
                )));
            }
            if ids.contains(&service.service_id) {
                return Err(StoreError::InvalidPrecedence(format!("{key} listed twice")));
            }
            ids.push(service.service_id);
        }

        let ranked = self
            .services
            .iter()
            .filter(|s| s.service_type.is_ranked())
            .count();
        if ids.len() != ranked {
            return Err(StoreError::InvalidPrecedence(format!(
                "expected all {} real tag services, got {}",
                ranked,
                ids.len()
            )));
        }
        Ok(ids)
    }
}
