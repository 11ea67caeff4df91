//! Single-writer work queue in front of [`SqliteTagStore`].
//!
//! Operations are queued on a bounded channel and run one at a time by a
//! single worker task. Callers either await the result or submit and move
//! on; results nobody awaits are reported on the failure channel when they
//! fail. Change notifications are broadcast after each commit.

use crate::error::{StoreError, StoreResult};
use crate::models::{Petition, ServiceRecord};
use crate::registry::ServiceLookup;
use crate::store::SqliteTagStore;
use std::sync::Arc;
use tagbase_core::config::StoreConfig;
use tagbase_core::{
    AutocompleteMatch, ContentHash, JobFailure, MappingStatus, ServiceChange, ServiceKey,
    ServiceType, ServiceUpdates, Tag,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Reply slot; `None` for fire-and-forget submissions.
type Reply<T> = Option<oneshot::Sender<StoreResult<T>>>;

/// Autocomplete search parameters.
#[derive(Clone, Debug)]
pub struct AutocompleteRequest {
    pub tag_service_key: ServiceKey,
    pub file_service_key: ServiceKey,
    pub partial_text: String,
    pub include_current: bool,
    pub include_pending: bool,
}

enum Command {
    Apply {
        updates: ServiceUpdates,
        reply: Reply<Vec<ServiceChange>>,
    },
    SetPrecedence {
        keys: Vec<ServiceKey>,
        reply: Reply<()>,
    },
    Register {
        service_key: ServiceKey,
        service_type: ServiceType,
        name: String,
        reply: Reply<ServiceRecord>,
    },
    Deregister {
        lookup: ServiceLookup,
        reply: Reply<()>,
    },
    RebuildCombined {
        file_service_key: ServiceKey,
        reply: Reply<()>,
    },
    RebuildAutocomplete {
        reply: Reply<()>,
    },
    Autocomplete {
        request: AutocompleteRequest,
        reply: Reply<Vec<AutocompleteMatch>>,
    },
    Status {
        service_key: ServiceKey,
        tag: Tag,
        hash: ContentHash,
        reply: Reply<Option<MappingStatus>>,
    },
    Petitions {
        service_key: ServiceKey,
        reply: Reply<Vec<Petition>>,
    },
    ListServices {
        reply: Reply<Vec<ServiceRecord>>,
    },
    Precedence {
        reply: Reply<Vec<ServiceKey>>,
    },
    CountTagged {
        tag_service_key: ServiceKey,
        file_service_key: ServiceKey,
        reply: Reply<u64>,
    },
}

impl Command {
    fn operation(&self) -> &'static str {
        match self {
            Self::Apply { .. } => "apply_content_updates",
            Self::SetPrecedence { .. } => "set_tag_service_precedence",
            Self::Register { .. } => "register_service",
            Self::Deregister { .. } => "deregister_service",
            Self::RebuildCombined { .. } => "rebuild_combined_view",
            Self::RebuildAutocomplete { .. } => "rebuild_autocomplete_cache",
            Self::Autocomplete { .. } => "get_autocomplete_matches",
            Self::Status { .. } => "get_mapping_status",
            Self::Petitions { .. } => "get_petitions",
            Self::ListServices { .. } => "list_services",
            Self::Precedence { .. } => "get_tag_service_precedence",
            Self::CountTagged { .. } => "count_tagged_hashes",
        }
    }
}

/// Cloneable handle to the writer task.
///
/// Every operation, reads included, goes through the queue, so a read
/// observes every batch queued before it, submitted ones too.
#[derive(Clone)]
pub struct TagStoreHandle {
    tx: mpsc::Sender<Command>,
    store: Arc<SqliteTagStore>,
    changes: broadcast::Sender<ServiceChange>,
    failures: broadcast::Sender<JobFailure>,
}

impl TagStoreHandle {
    /// Start the writer task for `store`.
    ///
    /// The task stops once every handle is dropped and the queue drains.
    pub fn spawn(store: SqliteTagStore, config: &StoreConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (changes, _) = broadcast::channel(config.event_capacity);
        let (failures, _) = broadcast::channel(config.event_capacity);
        let store = Arc::new(store);

        let worker = Worker {
            store: Arc::clone(&store),
            changes: changes.clone(),
            failures: failures.clone(),
        };
        let task = tokio::spawn(worker.run(rx));

        let handle = Self {
            tx,
            store,
            changes,
            failures,
        };
        (handle, task)
    }

    /// Subscribe to change notifications, sent after each commit.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ServiceChange> {
        self.changes.subscribe()
    }

    /// Subscribe to failures of fire-and-forget submissions.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<JobFailure> {
        self.failures.subscribe()
    }

    /// The underlying store. Queries here skip the queue and may run ahead
    /// of queued batches.
    pub fn store(&self) -> &SqliteTagStore {
        &self.store
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> StoreResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(Some(reply_tx)))
            .await
            .map_err(|_| StoreError::QueueClosed)?;
        reply_rx.await.map_err(|_| StoreError::QueueClosed)?
    }

    async fn submit(&self, command: Command) -> StoreResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| StoreError::QueueClosed)
    }

    /// Apply a batch and wait for it to commit.
    pub async fn apply_content_updates(
        &self,
        updates: ServiceUpdates,
    ) -> StoreResult<Vec<ServiceChange>> {
        self.call(|reply| Command::Apply { updates, reply }).await
    }

    /// Queue a batch without waiting. Failures go to the failure channel.
    pub async fn submit_content_updates(&self, updates: ServiceUpdates) -> StoreResult<()> {
        self.submit(Command::Apply {
            updates,
            reply: None,
        })
        .await
    }

    pub async fn set_tag_service_precedence(&self, keys: Vec<ServiceKey>) -> StoreResult<()> {
        self.call(|reply| Command::SetPrecedence { keys, reply }).await
    }

    pub async fn register_service(
        &self,
        service_key: ServiceKey,
        service_type: ServiceType,
        name: impl Into<String>,
    ) -> StoreResult<ServiceRecord> {
        let name = name.into();
        self.call(|reply| Command::Register {
            service_key,
            service_type,
            name,
            reply,
        })
        .await
    }

    pub async fn deregister_service(&self, lookup: ServiceLookup) -> StoreResult<()> {
        self.call(|reply| Command::Deregister { lookup, reply }).await
    }

    pub async fn rebuild_combined_view(&self, file_service_key: ServiceKey) -> StoreResult<()> {
        self.call(|reply| Command::RebuildCombined {
            file_service_key,
            reply,
        })
        .await
    }

    /// Queue a combined view rebuild without waiting.
    pub async fn submit_rebuild_combined_view(&self, file_service_key: ServiceKey) -> StoreResult<()> {
        self.submit(Command::RebuildCombined {
            file_service_key,
            reply: None,
        })
        .await
    }

    pub async fn rebuild_autocomplete_cache(&self) -> StoreResult<()> {
        self.call(|reply| Command::RebuildAutocomplete { reply })
            .await
    }

    pub async fn get_autocomplete_matches(
        &self,
        request: AutocompleteRequest,
    ) -> StoreResult<Vec<AutocompleteMatch>> {
        self.call(|reply| Command::Autocomplete { request, reply })
            .await
    }

    pub async fn get_mapping_status(
        &self,
        service_key: ServiceKey,
        tag: &Tag,
        hash: &ContentHash,
    ) -> StoreResult<Option<MappingStatus>> {
        let (tag, hash) = (tag.clone(), *hash);
        self.call(|reply| Command::Status {
            service_key,
            tag,
            hash,
            reply,
        })
        .await
    }

    pub async fn get_petitions(&self, service_key: ServiceKey) -> StoreResult<Vec<Petition>> {
        self.call(|reply| Command::Petitions { service_key, reply })
            .await
    }

    pub async fn list_services(&self) -> StoreResult<Vec<ServiceRecord>> {
        self.call(|reply| Command::ListServices { reply }).await
    }

    pub async fn get_tag_service_precedence(&self) -> StoreResult<Vec<ServiceKey>> {
        self.call(|reply| Command::Precedence { reply }).await
    }

    pub async fn count_tagged_hashes(
        &self,
        tag_service_key: ServiceKey,
        file_service_key: ServiceKey,
    ) -> StoreResult<u64> {
        self.call(|reply| Command::CountTagged {
            tag_service_key,
            file_service_key,
            reply,
        })
        .await
    }
}

struct Worker {
    store: Arc<SqliteTagStore>,
    changes: broadcast::Sender<ServiceChange>,
    failures: broadcast::Sender<JobFailure>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<Command>) {
        tracing::debug!("tag store writer started");
        while let Some(command) = rx.recv().await {
            let operation = command.operation();
            match command {
                Command::Apply { updates, reply } => {
                    let result = self.store.apply_content_updates(&updates).await;
                    if let Ok(changes) = &result {
                        for change in changes {
                            // no subscribers is fine
                            let _ = self.changes.send(change.clone());
                        }
                    }
                    self.finish(operation, result, reply);
                }
                Command::SetPrecedence { keys, reply } => {
                    let result = self.store.set_tag_service_precedence(&keys).await;
                    self.finish(operation, result, reply);
                }
                Command::Register {
                    service_key,
                    service_type,
                    name,
                    reply,
                } => {
                    let result = self
                        .store
                        .register_service(service_key, service_type, &name)
                        .await;
                    self.finish(operation, result, reply);
                }
                Command::Deregister { lookup, reply } => {
                    let result = self.store.deregister_service(lookup).await;
                    self.finish(operation, result, reply);
                }
                Command::RebuildCombined {
                    file_service_key,
                    reply,
                } => {
                    let result = self.store.rebuild_combined_view(file_service_key).await;
                    self.finish(operation, result, reply);
                }
                Command::RebuildAutocomplete { reply } => {
                    let result = self.store.rebuild_autocomplete_cache().await;
                    self.finish(operation, result, reply);
                }
                Command::Autocomplete { request, reply } => {
                    let result = self
                        .store
                        .get_autocomplete_matches(
                            request.tag_service_key,
                            request.file_service_key,
                            &request.partial_text,
                            request.include_current,
                            request.include_pending,
                        )
                        .await;
                    self.finish(operation, result, reply);
                }
                Command::Status {
                    service_key,
                    tag,
                    hash,
                    reply,
                } => {
                    let result = self.store.get_mapping_status(service_key, &tag, &hash).await;
                    self.finish(operation, result, reply);
                }
                Command::Petitions { service_key, reply } => {
                    let result = self.store.get_petitions(service_key).await;
                    self.finish(operation, result, reply);
                }
                Command::ListServices { reply } => {
                    let result = self.store.list_services().await;
                    self.finish(operation, result, reply);
                }
                Command::Precedence { reply } => {
                    let result = self.store.get_tag_service_precedence().await;
                    self.finish(operation, result, reply);
                }
                Command::CountTagged {
                    tag_service_key,
                    file_service_key,
                    reply,
                } => {
                    let result = self
                        .store
                        .count_tagged_hashes(tag_service_key, file_service_key)
                        .await;
                    self.finish(operation, result, reply);
                }
            }
        }
        tracing::debug!("tag store writer stopped");
    }

    fn finish<T>(&self, operation: &'static str, result: StoreResult<T>, reply: Reply<T>) {
        match reply {
            Some(reply) => {
                if reply.send(result).is_err() {
                    tracing::debug!(operation, "caller went away before the reply");
                }
            }
            None => {
                if let Err(err) = result {
                    tracing::warn!(operation, error = %err, "queued operation failed");
                    let _ = self.failures.send(JobFailure {
                        operation: operation.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }
    }
}
