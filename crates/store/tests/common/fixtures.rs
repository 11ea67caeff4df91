//! Test fixtures for generating test data.

use std::collections::BTreeMap;
use tagbase_core::{ContentHash, ContentUpdate, FileAction, MappingAction, ServiceKey, ServiceUpdates};

/// Deterministic pseudo-random source (simple LCG).
#[allow(dead_code)]
pub struct Lcg(u64);

#[allow(dead_code)]
impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed ^ 0x9e37_79b9_7f4a_7c15)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    /// Uniform-ish value in `0..n`.
    pub fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.below(items.len())]
    }

    /// A random non-empty subset, in input order.
    pub fn subset<T: Clone>(&mut self, items: &[T]) -> Vec<T> {
        let mut picked: Vec<T> = items
            .iter()
            .filter(|_| self.below(3) == 0)
            .cloned()
            .collect();
        if picked.is_empty() {
            picked.push(self.pick(items).clone());
        }
        picked
    }
}

/// Deterministic content hash for a seed.
#[allow(dead_code)]
pub fn test_hash(seed: u64) -> ContentHash {
    ContentHash::compute(&seed.to_le_bytes())
}

/// `count` distinct deterministic hashes.
#[allow(dead_code)]
pub fn test_hashes(count: u64) -> Vec<ContentHash> {
    (0..count).map(test_hash).collect()
}

/// Single-service batch.
#[allow(dead_code)]
pub fn batch(service_key: ServiceKey, updates: Vec<ContentUpdate>) -> ServiceUpdates {
    BTreeMap::from([(service_key, updates)])
}

/// Single mapping update batch.
#[allow(dead_code)]
pub fn mapping_batch(
    service_key: ServiceKey,
    action: MappingAction,
    tag: &str,
    hashes: &[ContentHash],
) -> ServiceUpdates {
    batch(
        service_key,
        vec![ContentUpdate::mappings(action, tag, hashes.to_vec())],
    )
}

/// Single file membership update batch.
#[allow(dead_code)]
pub fn file_batch(service_key: ServiceKey, action: FileAction, hashes: &[ContentHash]) -> ServiceUpdates {
    batch(service_key, vec![ContentUpdate::files(action, hashes.to_vec())])
}

/// A random mapping action; petitions carry a fixed reason.
#[allow(dead_code)]
pub fn random_action(rng: &mut Lcg) -> MappingAction {
    match rng.below(9) {
        0..=2 => MappingAction::Add,
        3 | 4 => MappingAction::Delete,
        5 => MappingAction::Pend,
        6 => MappingAction::RescindPending,
        7 => MappingAction::Petition {
            reason: "mistagged".to_string(),
        },
        _ => MappingAction::RescindPetition,
    }
}
