//! Change notifications emitted after a batch commits.

use crate::service::ServiceKey;
use serde::{Deserialize, Serialize};

/// Summary of what one committed operation changed on one service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceChange {
    pub service_key: ServiceKey,
    /// Mapping keys whose status changed.
    pub mappings_changed: u64,
    /// Petition rows created, replaced, or removed.
    pub petitions_changed: u64,
    /// File membership rows added or removed.
    pub files_changed: u64,
}

impl ServiceChange {
    /// Empty change record for a service.
    pub fn new(service_key: ServiceKey) -> Self {
        Self {
            service_key,
            ..Self::default()
        }
    }

    /// Whether anything changed.
    pub fn is_empty(&self) -> bool {
        self.mappings_changed == 0 && self.petitions_changed == 0 && self.files_changed == 0
    }
}

/// A queued operation that failed with no caller waiting for the result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Operation name, e.g. `apply_content_updates`.
    pub operation: String,
    /// Rendered error.
    pub error: String,
}
