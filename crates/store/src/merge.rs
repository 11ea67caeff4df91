//! Precedence merge of real tag services into the combined tag service.
//!
//! The combined status of a `(namespace, tag, hash)` triple is CURRENT when
//! the most trusted service holding an opinion (CURRENT or DELETED) says
//! CURRENT, otherwise PENDING when any ranked service has it PENDING,
//! otherwise absent. [`rebuild_combined`] derives the whole set with
//! set-based SQL; [`update_combined`] re-derives individual triples. Both
//! yield the same rows.

use crate::error::StoreResult;
use crate::models::{FileDomain, HashId, ServiceId, StatusTransition, TagKey};
use crate::registry::{PrecedenceOrder, ServiceRegistry};
use crate::repos::MappingRepo;
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, HashMap};
use tagbase_core::MappingStatus;

/// Combined status of one triple from the opinions of every tag service.
///
/// Services missing from `order` (including the combined service itself)
/// are ignored.
pub fn resolve_combined_status(
    order: &PrecedenceOrder,
    opinions: &HashMap<ServiceId, MappingStatus>,
) -> Option<MappingStatus> {
    let mut any_pending = false;
    for service_id in order.services() {
        match opinions.get(service_id) {
            Some(MappingStatus::Current) => return Some(MappingStatus::Current),
            Some(MappingStatus::Deleted) => {
                // a trusted DELETED shadows less trusted CURRENT rows,
                // but pending rows still count
                return ranked_pending(order, opinions).then_some(MappingStatus::Pending);
            }
            Some(MappingStatus::Pending) => any_pending = true,
            None => {}
        }
    }
    any_pending.then_some(MappingStatus::Pending)
}

fn ranked_pending(order: &PrecedenceOrder, opinions: &HashMap<ServiceId, MappingStatus>) -> bool {
    order
        .services()
        .iter()
        .any(|id| opinions.get(id) == Some(&MappingStatus::Pending))
}

/// Re-derive the combined rows of `tag` for `hash_ids` and write any
/// differences. Returns the combined transitions.
pub async fn update_combined(
    conn: &mut SqliteConnection,
    registry: &ServiceRegistry,
    tag: TagKey,
    hash_ids: &[HashId],
) -> StoreResult<Vec<StatusTransition>> {
    let combined_id = registry.combined_tag_service_id();
    let order = registry.precedence();

    let mut opinions: BTreeMap<HashId, HashMap<ServiceId, MappingStatus>> =
        hash_ids.iter().map(|id| (*id, HashMap::new())).collect();
    for row in conn.get_opinions(tag, hash_ids).await? {
        let status = MappingStatus::from_i64(row.status)?;
        if let Some(by_service) = opinions.get_mut(&row.hash_id) {
            by_service.insert(row.service_id, status);
        }
    }

    let mut transitions = Vec::new();
    let mut to_set: BTreeMap<MappingStatus, Vec<HashId>> = BTreeMap::new();
    let mut to_clear = Vec::new();
    for (hash_id, by_service) in &opinions {
        let before = by_service.get(&combined_id).copied();
        let after = resolve_combined_status(order, by_service);
        if before == after {
            continue;
        }
        match after {
            Some(status) => to_set.entry(status).or_default().push(*hash_id),
            None => to_clear.push(*hash_id),
        }
        transitions.push(StatusTransition {
            hash_id: *hash_id,
            before,
            after,
        });
    }

    for (status, ids) in &to_set {
        conn.set_statuses(combined_id, tag, ids, *status).await?;
    }
    conn.clear_statuses(combined_id, tag, &to_clear).await?;

    if !transitions.is_empty() {
        tracing::debug!(
            namespace_id = tag.namespace_id,
            tag_id = tag.tag_id,
            changed = transitions.len(),
            "combined view updated"
        );
    }
    Ok(transitions)
}

/// Rebuild the combined rows of every hash in `domain` from scratch.
///
/// Sweeps real tag services least to most trusted: each service's CURRENT
/// rows are unioned in and its DELETED rows remove CURRENT rows added by
/// less trusted services. PENDING rows of every ranked service are then
/// added for triples that are not CURRENT.
pub async fn rebuild_combined(
    conn: &mut SqliteConnection,
    registry: &ServiceRegistry,
    domain: FileDomain,
) -> StoreResult<u64> {
    let combined_id = registry.combined_tag_service_id();
    let cleared = conn.clear_service_rows(combined_id, domain).await?;

    for service_id in registry.precedence().services().iter().rev() {
        conn.copy_status_rows(combined_id, *service_id, MappingStatus::Current, domain)
            .await?;
        conn.remove_deleted_by(combined_id, *service_id, domain)
            .await?;
    }
    conn.copy_ranked_pending_rows(combined_id, domain).await?;

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mappings WHERE service_id = ?")
        .bind(combined_id)
        .fetch_one(&mut *conn)
        .await?;
    tracing::info!(
        ?domain,
        cleared,
        combined_rows = rows,
        precedence_version = registry.precedence().version(),
        "combined view rebuilt"
    );
    Ok(rows as u64)
}
