//! Combined tag service merge tests: incremental updates, full rebuilds and
//! precedence changes.

mod common;

use common::*;
use std::collections::BTreeMap;
use tagbase_core::{
    ContentHash, ContentUpdate, FileAction, MappingAction, MappingStatus, ServiceKey,
    ServiceUpdates,
};
use tagbase_store::{ServiceLookup, StoreError};

const TAGS: [&str; 3] = ["samus", "series:metroid", "character:ridley"];

/// Expected combined status from per-service statuses, most trusted first.
fn expected_combined(statuses: &[Option<MappingStatus>]) -> Option<MappingStatus> {
    for status in statuses {
        match status {
            Some(MappingStatus::Current) => return Some(MappingStatus::Current),
            Some(MappingStatus::Deleted) => break,
            _ => {}
        }
    }
    statuses
        .contains(&Some(MappingStatus::Pending))
        .then_some(MappingStatus::Pending)
}

/// Random batch touching any of `services`.
fn random_batch(rng: &mut Lcg, services: &[ServiceKey], hashes: &[ContentHash]) -> ServiceUpdates {
    let mut updates: ServiceUpdates = BTreeMap::new();
    for _ in 0..=rng.below(4) {
        let service = *rng.pick(services);
        let action = random_action(rng);
        let tag = *rng.pick(&TAGS);
        let picked = rng.subset(hashes);
        updates
            .entry(service)
            .or_default()
            .push(ContentUpdate::mappings(action, tag, picked));
    }
    updates
}

async fn assert_combined_matches_resolver(
    ts: &TestStore,
    order: &[ServiceKey],
    hashes: &[ContentHash],
) {
    for tag in TAGS {
        for hash in hashes {
            let mut statuses = Vec::with_capacity(order.len());
            for service in order {
                statuses.push(ts.status(*service, tag, hash).await);
            }
            assert_eq!(
                ts.status(ServiceKey::combined_tags(), tag, hash).await,
                expected_combined(&statuses),
                "{tag} {hash} with {statuses:?}"
            );
        }
    }
}

#[tokio::test]
async fn test_trusted_delete_overrides_less_trusted_current() {
    let ts = TestStore::new().await;
    let a = ts.local_tags("A").await;
    let b = ts.tag_repository("B").await;
    let hash = test_hash(1);
    let combined = ServiceKey::combined_tags();

    assert_eq!(ts.store.get_tag_service_precedence().await.unwrap(), vec![a, b]);

    let changes = ts
        .apply(mapping_batch(b, MappingAction::Add, "series:metroid", &[hash]))
        .await;
    assert_eq!(
        ts.status(combined, "series:metroid", &hash).await,
        Some(MappingStatus::Current)
    );
    let keys: Vec<_> = changes.iter().map(|c| c.service_key).collect();
    assert_eq!(keys, vec![b, combined]);

    let changes = ts
        .apply(mapping_batch(a, MappingAction::Delete, "series:metroid", &[hash]))
        .await;
    assert_eq!(ts.status(combined, "series:metroid", &hash).await, None);
    assert_eq!(changes.last().unwrap().service_key, combined);
    assert_eq!(changes.last().unwrap().mappings_changed, 1);
}

#[tokio::test]
async fn test_pending_propagates_until_current() {
    let ts = TestStore::new().await;
    let a = ts.local_tags("A").await;
    let b = ts.tag_repository("B").await;
    let hash = test_hash(2);
    let combined = ServiceKey::combined_tags();

    ts.apply(mapping_batch(a, MappingAction::Delete, "samus", &[hash]))
        .await;
    ts.apply(mapping_batch(b, MappingAction::Pend, "samus", &[hash]))
        .await;
    assert_eq!(
        ts.status(combined, "samus", &hash).await,
        Some(MappingStatus::Pending),
        "pending survives a trusted delete"
    );

    ts.apply(mapping_batch(b, MappingAction::RescindPending, "samus", &[hash]))
        .await;
    assert_eq!(ts.status(combined, "samus", &hash).await, None);
}

#[tokio::test]
async fn test_unrelated_change_does_not_touch_combined() {
    let ts = TestStore::new().await;
    let a = ts.local_tags("A").await;
    let b = ts.tag_repository("B").await;
    let hash = test_hash(3);

    ts.apply(mapping_batch(a, MappingAction::Add, "samus", &[hash]))
        .await;
    let changes = ts
        .apply(mapping_batch(b, MappingAction::Add, "samus", &[hash]))
        .await;

    assert_eq!(changes.len(), 1, "combined already CURRENT");
    assert_eq!(changes[0].service_key, b);
}

#[tokio::test]
async fn test_precedence_flip_rebuilds_combined() {
    let ts = TestStore::new().await;
    let a = ts.local_tags("A").await;
    let b = ts.tag_repository("B").await;
    let hash = test_hash(4);
    let combined = ServiceKey::combined_tags();

    ts.apply(mapping_batch(a, MappingAction::Delete, "samus", &[hash]))
        .await;
    ts.apply(mapping_batch(b, MappingAction::Add, "samus", &[hash]))
        .await;
    assert_eq!(ts.status(combined, "samus", &hash).await, None);

    let before = ts.store.precedence_order().await.unwrap().version();
    ts.store.set_tag_service_precedence(&[b, a]).await.unwrap();
    assert_eq!(ts.store.get_tag_service_precedence().await.unwrap(), vec![b, a]);
    assert_eq!(
        ts.status(combined, "samus", &hash).await,
        Some(MappingStatus::Current)
    );
    assert_eq!(
        ts.store.precedence_order().await.unwrap().version(),
        before + 1
    );

    // same order again is a no-op
    ts.store.set_tag_service_precedence(&[b, a]).await.unwrap();
    assert_eq!(
        ts.store.precedence_order().await.unwrap().version(),
        before + 1
    );
}

#[tokio::test]
async fn test_precedence_must_be_a_permutation() {
    let ts = TestStore::new().await;
    let a = ts.local_tags("A").await;
    let b = ts.tag_repository("B").await;
    let files = ts.local_files("files").await;

    for keys in [
        vec![a],
        vec![a, b, a],
        vec![a, b, ServiceKey::new()],
        vec![a, b, files],
        vec![a, ServiceKey::combined_tags()],
    ] {
        let err = ts.store.set_tag_service_precedence(&keys).await.unwrap_err();
        assert!(
            matches!(err, StoreError::InvalidPrecedence(_) | StoreError::NotFound(_)),
            "{keys:?}: {err}"
        );
    }
    assert_eq!(ts.store.get_tag_service_precedence().await.unwrap(), vec![a, b]);
}

#[tokio::test]
async fn test_deregister_tag_service_rebuilds_combined() {
    let ts = TestStore::new().await;
    let a = ts.local_tags("A").await;
    let b = ts.tag_repository("B").await;
    let hash = test_hash(5);
    let combined = ServiceKey::combined_tags();

    ts.apply(mapping_batch(a, MappingAction::Delete, "samus", &[hash]))
        .await;
    ts.apply(mapping_batch(b, MappingAction::Add, "samus", &[hash]))
        .await;
    assert_eq!(ts.status(combined, "samus", &hash).await, None);

    ts.store
        .deregister_service(ServiceLookup::Key(a))
        .await
        .unwrap();

    assert_eq!(ts.store.get_tag_service_precedence().await.unwrap(), vec![b]);
    assert_eq!(
        ts.status(combined, "samus", &hash).await,
        Some(MappingStatus::Current)
    );
    let err = ts
        .store
        .get_service(ServiceLookup::Key(a))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_rebuild_restores_cleared_rows_per_domain() {
    let ts = TestStore::new().await;
    let a = ts.local_tags("A").await;
    let files = ts.local_files("files").await;
    let hashes = test_hashes(4);

    ts.apply(file_batch(files, FileAction::Add, &hashes[..2]))
        .await;
    ts.apply(mapping_batch(a, MappingAction::Add, "samus", &hashes))
        .await;
    let full = ts.mapping_rows(ServiceKey::combined_tags()).await;
    assert_eq!(full.len(), 4);

    sqlx::query(
        "DELETE FROM mappings WHERE service_id = (SELECT service_id FROM services WHERE service_type = 'combined_tag')",
    )
    .execute(ts.store.pool())
    .await
    .unwrap();

    ts.store.rebuild_combined_view(files).await.unwrap();
    assert_eq!(
        ts.mapping_rows(ServiceKey::combined_tags()).await.len(),
        2,
        "only hashes in the domain"
    );

    ts.store
        .rebuild_combined_view(ServiceKey::combined_files())
        .await
        .unwrap();
    assert_eq!(ts.mapping_rows(ServiceKey::combined_tags()).await, full);
}

#[tokio::test]
async fn test_rebuild_rejects_tag_service_domain() {
    let ts = TestStore::new().await;
    let a = ts.local_tags("A").await;

    let err = ts.store.rebuild_combined_view(a).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidService(_)), "{err}");
}

#[tokio::test]
async fn test_incremental_matches_resolver_and_rebuild() {
    for seed in 0..6u64 {
        let ts = TestStore::new().await;
        let mut rng = Lcg::new(seed);

        let mut services = Vec::new();
        for i in 0..(2 + rng.below(3)) {
            let key = if i % 2 == 0 {
                ts.local_tags(&format!("local {i}")).await
            } else {
                ts.tag_repository(&format!("repo {i}")).await
            };
            services.push(key);
        }
        let hashes = test_hashes(6);

        for round in 0..12 {
            ts.apply(random_batch(&mut rng, &services, &hashes)).await;
            if round == 6 {
                // reshuffle precedence midway
                let mut order = services.clone();
                let len = order.len();
                order.rotate_left(1 + rng.below(len - 1));
                ts.store.set_tag_service_precedence(&order).await.unwrap();
            }
        }

        let order = ts.store.get_tag_service_precedence().await.unwrap();
        assert_combined_matches_resolver(&ts, &order, &hashes).await;

        let incremental = ts.mapping_rows(ServiceKey::combined_tags()).await;
        ts.store
            .rebuild_combined_view(ServiceKey::combined_files())
            .await
            .unwrap();
        assert_eq!(
            ts.mapping_rows(ServiceKey::combined_tags()).await,
            incremental,
            "seed {seed}"
        );
    }
}

#[tokio::test]
async fn test_combined_never_holds_deleted() {
    let ts = TestStore::new().await;
    let a = ts.local_tags("A").await;
    let hashes = test_hashes(3);

    ts.apply(mapping_batch(a, MappingAction::Delete, "samus", &hashes))
        .await;
    assert!(ts.mapping_rows(ServiceKey::combined_tags()).await.is_empty());
    ts.store
        .rebuild_combined_view(ServiceKey::combined_files())
        .await
        .unwrap();
    assert!(ts.mapping_rows(ServiceKey::combined_tags()).await.is_empty());
}
