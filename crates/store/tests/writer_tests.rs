//! Writer queue tests: replies, notifications and the failure channel.

mod common;

use common::*;
use std::time::Duration;
use tagbase_core::config::StoreConfig;
use tagbase_core::{FileAction, MappingAction, MappingStatus, ServiceKey, ServiceType, Tag};
use tagbase_store::{AutocompleteRequest, ServiceLookup, SqliteTagStore, StoreError, TagStoreHandle};
use tokio::time::timeout;

async fn spawn_handle() -> TagStoreHandle {
    let config = StoreConfig::for_testing();
    let store = SqliteTagStore::new(&config).await.unwrap();
    let (handle, _task) = TagStoreHandle::spawn(store, &config);
    handle
}

#[tokio::test]
async fn test_changes_are_broadcast_after_commit() {
    let handle = spawn_handle().await;
    let local = ServiceKey::new();
    handle
        .register_service(local, ServiceType::LocalTag, "my tags")
        .await
        .unwrap();
    let mut changes = handle.subscribe_changes();

    let hashes = test_hashes(2);
    let reported = handle
        .apply_content_updates(mapping_batch(local, MappingAction::Add, "samus", &hashes))
        .await
        .unwrap();
    assert_eq!(reported.len(), 2);

    let first = changes.recv().await.unwrap();
    assert_eq!(first.service_key, local);
    assert_eq!(first.mappings_changed, 2);
    let second = changes.recv().await.unwrap();
    assert_eq!(second.service_key, ServiceKey::combined_tags());
    assert_eq!(second.mappings_changed, 2);
}

#[tokio::test]
async fn test_noop_batch_sends_nothing() {
    let handle = spawn_handle().await;
    let local = ServiceKey::new();
    handle
        .register_service(local, ServiceType::LocalTag, "my tags")
        .await
        .unwrap();
    let mut changes = handle.subscribe_changes();

    let reported = handle
        .apply_content_updates(mapping_batch(
            local,
            MappingAction::RescindPending,
            "samus",
            &[test_hash(1)],
        ))
        .await
        .unwrap();

    assert!(reported.is_empty());
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_submitted_failure_reaches_failure_channel() {
    let handle = spawn_handle().await;
    let mut failures = handle.subscribe_failures();
    let mut changes = handle.subscribe_changes();

    handle
        .submit_content_updates(mapping_batch(
            ServiceKey::new(),
            MappingAction::Add,
            "samus",
            &[test_hash(1)],
        ))
        .await
        .unwrap();

    let failure = timeout(Duration::from_secs(5), failures.recv())
        .await
        .expect("no failure reported")
        .unwrap();
    assert_eq!(failure.operation, "apply_content_updates");
    assert!(failure.error.contains("not found"), "{}", failure.error);
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_awaited_failure_is_returned_not_broadcast() {
    let handle = spawn_handle().await;
    let mut failures = handle.subscribe_failures();

    let err = handle
        .deregister_service(ServiceLookup::Key(ServiceKey::combined_tags()))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidService(_)), "{err}");
    assert!(failures.try_recv().is_err());
}

#[tokio::test]
async fn test_queue_runs_in_submission_order() {
    let handle = spawn_handle().await;
    let local = ServiceKey::new();
    let files = ServiceKey::new();
    handle
        .register_service(local, ServiceType::LocalTag, "my tags")
        .await
        .unwrap();
    handle
        .register_service(files, ServiceType::LocalFile, "my files")
        .await
        .unwrap();
    let hash = test_hash(1);

    // fire-and-forget writes followed by an awaited read through the queue
    handle
        .submit_content_updates(mapping_batch(local, MappingAction::Pend, "samus", &[hash]))
        .await
        .unwrap();
    handle
        .submit_content_updates(mapping_batch(local, MappingAction::Add, "samus", &[hash]))
        .await
        .unwrap();
    handle
        .submit_content_updates(file_batch(files, FileAction::Add, &[hash]))
        .await
        .unwrap();
    handle
        .submit_rebuild_combined_view(ServiceKey::combined_files())
        .await
        .unwrap();

    let matches = handle
        .get_autocomplete_matches(AutocompleteRequest {
            tag_service_key: local,
            file_service_key: files,
            partial_text: "sam".to_string(),
            include_current: true,
            include_pending: true,
        })
        .await
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].count, 1);

    let tag = Tag::parse("samus").unwrap();
    assert_eq!(
        handle.get_mapping_status(local, &tag, &hash).await.unwrap(),
        Some(MappingStatus::Current)
    );
    assert_eq!(
        handle
            .get_mapping_status(ServiceKey::combined_tags(), &tag, &hash)
            .await
            .unwrap(),
        Some(MappingStatus::Current)
    );
    assert_eq!(handle.count_tagged_hashes(local, files).await.unwrap(), 1);
}

#[tokio::test]
async fn test_reads_see_submitted_batch() {
    let handle = spawn_handle().await;
    let repo = ServiceKey::new();
    handle
        .register_service(repo, ServiceType::TagRepository, "public tags")
        .await
        .unwrap();
    let tag = Tag::parse("character:ridley").unwrap();
    let hash = test_hash(7);

    handle
        .submit_content_updates(mapping_batch(repo, MappingAction::Add, "character:ridley", &[hash]))
        .await
        .unwrap();
    assert_eq!(
        handle.get_mapping_status(repo, &tag, &hash).await.unwrap(),
        Some(MappingStatus::Current)
    );

    handle
        .submit_content_updates(mapping_batch(
            repo,
            MappingAction::Petition {
                reason: "wrong character".to_string(),
            },
            "character:ridley",
            &[hash],
        ))
        .await
        .unwrap();
    let petitions = handle.get_petitions(repo).await.unwrap();
    assert_eq!(petitions.len(), 1);
    assert_eq!(petitions[0].reason, "wrong character");

    let later = ServiceKey::new();
    handle
        .register_service(later, ServiceType::LocalTag, "later tags")
        .await
        .unwrap();
    assert_eq!(handle.list_services().await.unwrap().len(), 4);
    assert_eq!(
        handle.get_tag_service_precedence().await.unwrap(),
        vec![repo, later]
    );
    assert_eq!(
        handle
            .count_tagged_hashes(repo, ServiceKey::combined_files())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_precedence_and_registry_through_handle() {
    let handle = spawn_handle().await;
    let a = ServiceKey::new();
    let b = ServiceKey::new();
    handle
        .register_service(a, ServiceType::LocalTag, "A")
        .await
        .unwrap();
    handle
        .register_service(b, ServiceType::TagRepository, "B")
        .await
        .unwrap();
    assert_eq!(handle.list_services().await.unwrap().len(), 4);

    handle.set_tag_service_precedence(vec![b, a]).await.unwrap();
    assert_eq!(handle.get_tag_service_precedence().await.unwrap(), vec![b, a]);

    handle.deregister_service(ServiceLookup::Key(b)).await.unwrap();
    assert_eq!(handle.get_tag_service_precedence().await.unwrap(), vec![a]);
    handle.rebuild_autocomplete_cache().await.unwrap();
    assert!(handle.get_petitions(a).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_writer_stops_when_handles_drop() {
    let config = StoreConfig::for_testing();
    let store = SqliteTagStore::new(&config).await.unwrap();
    let (handle, task) = TagStoreHandle::spawn(store, &config);

    drop(handle);
    timeout(Duration::from_secs(5), task)
        .await
        .expect("writer did not stop")
        .unwrap();
}
