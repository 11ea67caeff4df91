//! Autocomplete count maintenance and search.
//!
//! Every mutation step produces an [`AutocompleteDelta`]; a batch folds them
//! and applies the result once, after all of its mapping changes. Rows that
//! already exist receive the folded delta. Missing rows are computed from
//! the post-batch tables instead, so they are never double counted.

use crate::error::StoreResult;
use crate::models::{HashId, HashMappingRow, ServiceId, StatusTransition, TagKey};
use crate::repos::AutocompleteRepo;
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, HashMap};
use tagbase_core::{AutocompleteMatch, AutocompleteQuery, MappingStatus, Tag};

/// Key of one cached counter row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AutocompleteKey {
    pub file_service_id: ServiceId,
    pub tag_service_id: ServiceId,
    pub tag: TagKey,
}

/// Signed change to one row's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountDelta {
    pub current: i64,
    pub pending: i64,
}

impl CountDelta {
    /// Delta for one key moving from `before` to `after`.
    pub fn for_transition(before: Option<MappingStatus>, after: Option<MappingStatus>) -> Self {
        let weight = |status: Option<MappingStatus>, target: MappingStatus| -> i64 {
            i64::from(status == Some(target))
        };
        Self {
            current: weight(after, MappingStatus::Current) - weight(before, MappingStatus::Current),
            pending: weight(after, MappingStatus::Pending) - weight(before, MappingStatus::Pending),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.current == 0 && self.pending == 0
    }
}

impl std::ops::AddAssign for CountDelta {
    fn add_assign(&mut self, rhs: Self) {
        self.current += rhs.current;
        self.pending += rhs.pending;
    }
}

/// Accumulated counter changes for a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutocompleteDelta {
    entries: BTreeMap<AutocompleteKey, CountDelta>,
}

impl AutocompleteDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: AutocompleteKey, delta: CountDelta) {
        if delta.is_zero() {
            return;
        }
        *self.entries.entry(key).or_default() += delta;
    }

    /// Fold another delta into this one.
    pub fn merge(&mut self, other: AutocompleteDelta) {
        for (key, delta) in other.entries {
            self.add(key, delta);
        }
    }

    /// Non-zero entries.
    pub fn iter(&self) -> impl Iterator<Item = (&AutocompleteKey, &CountDelta)> {
        self.entries.iter().filter(|(_, delta)| !delta.is_zero())
    }

    pub fn get(&self, key: &AutocompleteKey) -> CountDelta {
        self.entries.get(key).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Delta for status transitions of one tag on one tag service.
///
/// Each hash counts in the combined file domain and in every real file
/// service listed for it in `memberships`.
pub fn mapping_delta(
    tag_service_id: ServiceId,
    tag: TagKey,
    transitions: &[StatusTransition],
    memberships: &HashMap<HashId, Vec<ServiceId>>,
    combined_file_id: ServiceId,
) -> AutocompleteDelta {
    let mut delta = AutocompleteDelta::new();
    for transition in transitions {
        let change = CountDelta::for_transition(transition.before, transition.after);
        let real_files = memberships
            .get(&transition.hash_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for file_service_id in std::iter::once(&combined_file_id).chain(real_files) {
            delta.add(
                AutocompleteKey {
                    file_service_id: *file_service_id,
                    tag_service_id,
                    tag,
                },
                change,
            );
        }
    }
    delta
}

/// Delta for hashes joining (`joined = true`) or leaving a real file
/// service, given the live mappings those hashes hold.
pub fn membership_delta(
    file_service_id: ServiceId,
    live_mappings: &[HashMappingRow],
    joined: bool,
) -> StoreResult<AutocompleteDelta> {
    let mut delta = AutocompleteDelta::new();
    for row in live_mappings {
        let status = MappingStatus::from_i64(row.status)?;
        let change = if joined {
            CountDelta::for_transition(None, Some(status))
        } else {
            CountDelta::for_transition(Some(status), None)
        };
        delta.add(
            AutocompleteKey {
                file_service_id,
                tag_service_id: row.service_id,
                tag: TagKey::new(row.namespace_id, row.tag_id),
            },
            change,
        );
    }
    Ok(delta)
}

/// Apply a folded batch delta. Returns `(updated, computed)` row counts.
pub async fn apply_delta(
    conn: &mut SqliteConnection,
    delta: &AutocompleteDelta,
) -> StoreResult<(u64, u64)> {
    let mut updated = 0;
    let mut computed = 0;
    for (key, change) in delta.iter() {
        if conn.add_counts(key, *change).await? {
            updated += 1;
        } else {
            // cold row: count the post-batch state directly
            let counts = conn.compute_counts(key).await?;
            conn.insert_counts(key, counts).await?;
            computed += 1;
        }
    }
    if updated + computed > 0 {
        tracing::debug!(updated, computed, "autocomplete counts adjusted");
    }
    Ok((updated, computed))
}

/// Search existing tags, memoizing any missing counter rows.
pub async fn search(
    conn: &mut SqliteConnection,
    file_service_id: ServiceId,
    tag_service_id: ServiceId,
    query: &AutocompleteQuery,
    include_current: bool,
    include_pending: bool,
    limit: usize,
) -> StoreResult<Vec<AutocompleteMatch>> {
    let candidates = conn
        .candidates(file_service_id, tag_service_id, query)
        .await?;

    let mut matches = Vec::with_capacity(candidates.len());
    let mut memoized = 0u64;
    for candidate in candidates {
        let (current, pending) = match (candidate.current_count, candidate.pending_count) {
            (Some(current), Some(pending)) => (current, pending),
            _ => {
                let key = AutocompleteKey {
                    file_service_id,
                    tag_service_id,
                    tag: TagKey::new(candidate.namespace_id, candidate.tag_id),
                };
                let counts = conn.compute_counts(&key).await?;
                conn.insert_counts(&key, counts).await?;
                memoized += 1;
                (counts.current_count, counts.pending_count)
            }
        };

        let mut count = 0i64;
        if include_current {
            count += current;
        }
        if include_pending {
            count += pending;
        }
        matches.push(AutocompleteMatch {
            tag: Tag {
                namespace: candidate.namespace,
                subtag: candidate.subtag,
            },
            count: count.max(0) as u64,
        });
    }

    matches.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.tag.to_string().cmp(&b.tag.to_string()))
    });
    matches.truncate(limit);

    if memoized > 0 {
        tracing::debug!(memoized, "autocomplete rows computed on demand");
    }
    Ok(matches)
}

/// Drop every cached row and recompute rows for every existing tag, file
/// service and tag service.
pub async fn rebuild_cache(
    conn: &mut SqliteConnection,
    tag_service_ids: &[ServiceId],
) -> StoreResult<u64> {
    let dropped = conn.clear_all_rows().await?;
    let mut rows = 0;
    for tag_service_id in tag_service_ids {
        rows += conn.recompute_tag_service_rows(*tag_service_id).await?;
    }
    tracing::info!(dropped, rows, "autocomplete cache rebuilt");
    Ok(rows)
}
