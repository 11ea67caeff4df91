//! Mapping statuses and the per-key transition table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a `(service, namespace, tag, hash)` mapping.
///
/// A key with no row is "absent", modelled as `Option::None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    /// The tag applies to the file.
    Current,
    /// The tag is waiting to be committed to a repository.
    Pending,
    /// The tag was explicitly removed; an opinion, not an absence.
    Deleted,
}

impl MappingStatus {
    /// Integer code stored in the database.
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Current => 0,
            Self::Pending => 1,
            Self::Deleted => 2,
        }
    }

    /// Decode a stored integer code.
    pub fn from_i64(code: i64) -> crate::Result<Self> {
        match code {
            0 => Ok(Self::Current),
            1 => Ok(Self::Pending),
            2 => Ok(Self::Deleted),
            other => Err(crate::Error::UnknownStatus(other)),
        }
    }

    /// Whether this status is an explicit precedence opinion.
    pub fn is_opinion(&self) -> bool {
        matches!(self, Self::Current | Self::Deleted)
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Current => "current",
            Self::Pending => "pending",
            Self::Deleted => "deleted",
        })
    }
}

/// An update intent for a mapping key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MappingAction {
    Add,
    Delete,
    Pend,
    RescindPending,
    Petition { reason: String },
    RescindPetition,
}

/// What an intent does to a key's status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusChange {
    /// No-op: already in the target state, or precondition not met.
    Unchanged,
    /// The key takes this status, replacing any prior one.
    Set(MappingStatus),
    /// The key returns to absent.
    Clear,
}

/// What an intent does to a key's petition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PetitionChange {
    Keep,
    Upsert,
    Remove,
}

impl MappingAction {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Pend => "pend",
            Self::RescindPending => "rescind_pending",
            Self::Petition { .. } => "petition",
            Self::RescindPetition => "rescind_petition",
        }
    }

    /// Status transition for a key currently in `prior`.
    pub fn status_change(&self, prior: Option<MappingStatus>) -> StatusChange {
        use MappingStatus::*;
        match (self, prior) {
            (Self::Add, Some(Current)) => StatusChange::Unchanged,
            (Self::Add, _) => StatusChange::Set(Current),
            (Self::Delete, Some(Deleted)) => StatusChange::Unchanged,
            (Self::Delete, _) => StatusChange::Set(Deleted),
            (Self::Pend, None) => StatusChange::Set(Pending),
            (Self::Pend, Some(_)) => StatusChange::Unchanged,
            (Self::RescindPending, Some(Pending)) => StatusChange::Clear,
            (Self::RescindPending, _) => StatusChange::Unchanged,
            (Self::Petition { .. } | Self::RescindPetition, _) => StatusChange::Unchanged,
        }
    }

    /// Petition effect for a key currently in `prior`.
    ///
    /// Any status change clears the petition; DELETE clears it even as a
    /// status no-op.
    pub fn petition_change(&self, prior: Option<MappingStatus>) -> PetitionChange {
        match self {
            Self::Petition { .. } if prior == Some(MappingStatus::Current) => PetitionChange::Upsert,
            Self::Petition { .. } => PetitionChange::Keep,
            Self::RescindPetition | Self::Delete => PetitionChange::Remove,
            _ if self.status_change(prior) != StatusChange::Unchanged => PetitionChange::Remove,
            _ => PetitionChange::Keep,
        }
    }
}
