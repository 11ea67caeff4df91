//! Content update processing: the single write path for mappings,
//! petitions and file membership.

use crate::autocomplete::{self, AutocompleteDelta};
use crate::error::{StoreError, StoreResult};
use crate::merge;
use crate::models::{HashId, ServiceRecord, StatusTransition};
use crate::registry::{ServiceLookup, ServiceRegistry};
use crate::repos::{FileRepo, InternerRepo, MappingRepo, PetitionRepo};
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use tagbase_core::{
    ContentUpdate, FileAction, FileUpdate, MappingAction, MappingStatus, MappingUpdate,
    PetitionChange, ServiceChange, ServiceKey, ServiceUpdates, StatusChange, Tag,
};
use time::OffsetDateTime;

/// Applies one batch inside a caller-owned transaction.
pub(crate) struct BatchProcessor<'a> {
    conn: &'a mut SqliteConnection,
    registry: &'a ServiceRegistry,
    now: OffsetDateTime,
    delta: AutocompleteDelta,
    changes: BTreeMap<ServiceKey, ServiceChange>,
    combined_changed: u64,
}

impl<'a> BatchProcessor<'a> {
    pub(crate) fn new(
        conn: &'a mut SqliteConnection,
        registry: &'a ServiceRegistry,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            conn,
            registry,
            now,
            delta: AutocompleteDelta::new(),
            changes: BTreeMap::new(),
            combined_changed: 0,
        }
    }

    /// Apply every update, then the folded autocomplete delta.
    ///
    /// Returns one change record per service that actually changed, plus
    /// one for the combined tag service when the merge propagated.
    pub(crate) async fn apply(mut self, updates: &ServiceUpdates) -> StoreResult<Vec<ServiceChange>> {
        for (service_key, service_updates) in updates {
            let service = self.writable_service(*service_key)?;
            for update in service_updates {
                match update {
                    ContentUpdate::Mappings(update) => {
                        self.apply_mapping_update(&service, update).await?
                    }
                    ContentUpdate::Files(update) => self.apply_file_update(&service, update).await?,
                }
            }
        }

        let delta = std::mem::take(&mut self.delta);
        autocomplete::apply_delta(self.conn, &delta).await?;

        let mut changes: Vec<ServiceChange> = self
            .changes
            .into_values()
            .filter(|change| !change.is_empty())
            .collect();
        if self.combined_changed > 0 {
            changes.push(ServiceChange {
                service_key: ServiceKey::combined_tags(),
                mappings_changed: self.combined_changed,
                ..ServiceChange::default()
            });
        }
        Ok(changes)
    }

    fn writable_service(&self, service_key: ServiceKey) -> StoreResult<ServiceRecord> {
        let service = self.registry.require(ServiceLookup::Key(service_key))?;
        if service.service_type.is_combined() {
            return Err(StoreError::InvalidService(format!(
                "{} is the {} service and cannot be written directly",
                service_key, service.service_type
            )));
        }
        Ok(service.clone())
    }

    fn change_for(&mut self, service_key: ServiceKey) -> &mut ServiceChange {
        self.changes
            .entry(service_key)
            .or_insert_with(|| ServiceChange::new(service_key))
    }

    async fn apply_mapping_update(
        &mut self,
        service: &ServiceRecord,
        update: &MappingUpdate,
    ) -> StoreResult<()> {
        if !service.service_type.is_tag_service() {
            return Err(StoreError::InvalidService(format!(
                "mapping update addressed to {} service {}",
                service.service_type, service.service_key
            )));
        }
        let Some(tag) = Tag::parse(&update.tag) else {
            tracing::debug!(service_key = %service.service_key, "skipping blank tag");
            return Ok(());
        };
        if update.hashes.is_empty() {
            return Ok(());
        }
        if matches!(
            update.action,
            MappingAction::Petition { .. } | MappingAction::RescindPetition
        ) && !service.service_type.is_restricted()
        {
            tracing::debug!(
                service_key = %service.service_key,
                action = update.action.name(),
                "ignoring petition on unrestricted service"
            );
            return Ok(());
        }

        let interned = self.conn.intern_tag(&tag).await?;
        let tag_key = interned.key;
        let mut hash_ids = self.conn.intern_hashes(&update.hashes).await?;
        hash_ids.sort_unstable();
        hash_ids.dedup();

        let service_id = service.service_id;
        let priors = self.conn.get_statuses(service_id, tag_key, &hash_ids).await?;

        let mut to_set: BTreeMap<MappingStatus, Vec<HashId>> = BTreeMap::new();
        let mut to_clear = Vec::new();
        let mut petitions_upserted = Vec::new();
        let mut petitions_removed = Vec::new();
        let mut transitions = Vec::new();
        for &hash_id in &hash_ids {
            let prior = priors.get(&hash_id).copied();
            let after = match update.action.status_change(prior) {
                StatusChange::Unchanged => prior,
                StatusChange::Set(status) => {
                    to_set.entry(status).or_default().push(hash_id);
                    Some(status)
                }
                StatusChange::Clear => {
                    to_clear.push(hash_id);
                    None
                }
            };
            if after != prior {
                transitions.push(StatusTransition {
                    hash_id,
                    before: prior,
                    after,
                });
            }
            match update.action.petition_change(prior) {
                PetitionChange::Keep => {}
                PetitionChange::Upsert => petitions_upserted.push(hash_id),
                PetitionChange::Remove => petitions_removed.push(hash_id),
            }
        }

        for (status, ids) in &to_set {
            self.conn.set_statuses(service_id, tag_key, ids, *status).await?;
        }
        self.conn.clear_statuses(service_id, tag_key, &to_clear).await?;

        let mut petitions_changed = self
            .conn
            .remove_petitions(service_id, tag_key, &petitions_removed)
            .await?;
        if let MappingAction::Petition { reason } = &update.action {
            for hash_id in &petitions_upserted {
                self.conn
                    .upsert_petition(service_id, tag_key, *hash_id, reason, self.now)
                    .await?;
                petitions_changed += 1;
            }
        }

        tracing::debug!(
            service_key = %service.service_key,
            action = update.action.name(),
            tag = %tag,
            new_tag = interned.created,
            hashes = hash_ids.len(),
            changed = transitions.len(),
            petitions_changed,
            "applied mapping update"
        );

        let change = self.change_for(service.service_key);
        change.mappings_changed += transitions.len() as u64;
        change.petitions_changed += petitions_changed;

        if transitions.is_empty() {
            return Ok(());
        }

        let changed_ids: Vec<HashId> = transitions.iter().map(|t| t.hash_id).collect();
        let memberships = self.conn.file_services_for_hashes(&changed_ids).await?;
        let combined_file_id = self.registry.combined_file_service_id();
        self.delta.merge(autocomplete::mapping_delta(
            service_id,
            tag_key,
            &transitions,
            &memberships,
            combined_file_id,
        ));

        let combined =
            merge::update_combined(self.conn, self.registry, tag_key, &changed_ids).await?;
        if !combined.is_empty() {
            self.combined_changed += combined.len() as u64;
            self.delta.merge(autocomplete::mapping_delta(
                self.registry.combined_tag_service_id(),
                tag_key,
                &combined,
                &memberships,
                combined_file_id,
            ));
        }
        Ok(())
    }

    async fn apply_file_update(
        &mut self,
        service: &ServiceRecord,
        update: &FileUpdate,
    ) -> StoreResult<()> {
        if !service.service_type.is_file_service() {
            return Err(StoreError::InvalidService(format!(
                "file update addressed to {} service {}",
                service.service_type, service.service_key
            )));
        }

        let (changed, joined) = match update.action {
            FileAction::Add => {
                let mut hash_ids = self.conn.intern_hashes(&update.hashes).await?;
                hash_ids.sort_unstable();
                hash_ids.dedup();
                (self.conn.add_files(service.service_id, &hash_ids).await?, true)
            }
            FileAction::Delete => {
                // unknown hashes cannot be members
                let mut hash_ids = self.conn.lookup_hashes(&update.hashes).await?;
                hash_ids.sort_unstable();
                hash_ids.dedup();
                (self.conn.remove_files(service.service_id, &hash_ids).await?, false)
            }
        };

        tracing::debug!(
            service_key = %service.service_key,
            joined,
            hashes = update.hashes.len(),
            changed = changed.len(),
            "applied file update"
        );
        if changed.is_empty() {
            return Ok(());
        }

        self.change_for(service.service_key).files_changed += changed.len() as u64;
        let live = self.conn.live_mappings_for_hashes(&changed).await?;
        self.delta
            .merge(autocomplete::membership_delta(service.service_id, &live, joined)?);
        Ok(())
    }
}
