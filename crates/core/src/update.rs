//! Content update intents submitted by collaborators.

use crate::hash::ContentHash;
use crate::service::ServiceKey;
use crate::status::MappingAction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A batch of updates, grouped by the service they address.
///
/// Ordered by key so a batch always applies in the same sequence.
pub type ServiceUpdates = BTreeMap<ServiceKey, Vec<ContentUpdate>>;

/// One update intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentUpdate {
    /// Mapping intent for a tag service.
    Mappings(MappingUpdate),
    /// Membership intent for a file service.
    Files(FileUpdate),
}

/// A mapping intent: one action, one tag, many hashes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingUpdate {
    #[serde(flatten)]
    pub action: MappingAction,
    /// Raw tag text; cleaned and parsed when applied. Blank text is a no-op.
    pub tag: String,
    pub hashes: Vec<ContentHash>,
}

/// File membership action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Add,
    Delete,
}

/// A membership intent for a real file service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdate {
    pub action: FileAction,
    pub hashes: Vec<ContentHash>,
}

impl ContentUpdate {
    /// Mapping update helper.
    pub fn mappings(action: MappingAction, tag: impl Into<String>, hashes: Vec<ContentHash>) -> Self {
        Self::Mappings(MappingUpdate {
            action,
            tag: tag.into(),
            hashes,
        })
    }

    /// File membership update helper.
    pub fn files(action: FileAction, hashes: Vec<ContentHash>) -> Self {
        Self::Files(FileUpdate { action, hashes })
    }
}
