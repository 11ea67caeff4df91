//! Service identifiers and types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Key of the synthetic combined tag service as a 128-bit constant.
pub const COMBINED_TAG_SERVICE_KEY_U128: u128 = 0x00000000_0000_0000_0000_0000000000c7;

/// Key of the synthetic combined file service ("all known files").
pub const COMBINED_FILE_SERVICE_KEY_U128: u128 = 0x00000000_0000_0000_0000_0000000000cf;

/// Stable, durable key of a service.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceKey(Uuid);

impl ServiceKey {
    /// Generate a new random service key.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The combined tag service key.
    pub fn combined_tags() -> Self {
        Self(Uuid::from_u128(COMBINED_TAG_SERVICE_KEY_U128))
    }

    /// The combined file service key.
    pub fn combined_files() -> Self {
        Self(Uuid::from_u128(COMBINED_FILE_SERVICE_KEY_U128))
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidServiceKey(format!("{s}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ServiceKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self.0)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Tags kept only on this machine.
    LocalTag,
    /// Tags synchronized from a remote repository.
    TagRepository,
    /// Synthetic precedence-merged view over all real tag services.
    CombinedTag,
    /// Files kept on this machine.
    LocalFile,
    /// Files held by a remote file repository.
    FileRepository,
    /// Synthetic union of every known file.
    CombinedFile,
}

impl ServiceType {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "local_tag" => Ok(Self::LocalTag),
            "tag_repository" => Ok(Self::TagRepository),
            "combined_tag" => Ok(Self::CombinedTag),
            "local_file" => Ok(Self::LocalFile),
            "file_repository" => Ok(Self::FileRepository),
            "combined_file" => Ok(Self::CombinedFile),
            _ => Err(crate::Error::UnknownServiceType(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalTag => "local_tag",
            Self::TagRepository => "tag_repository",
            Self::CombinedTag => "combined_tag",
            Self::LocalFile => "local_file",
            Self::FileRepository => "file_repository",
            Self::CombinedFile => "combined_file",
        }
    }

    /// Tag services, combined included.
    pub fn is_tag_service(&self) -> bool {
        matches!(self, Self::LocalTag | Self::TagRepository | Self::CombinedTag)
    }

    /// File services, combined included.
    pub fn is_file_service(&self) -> bool {
        matches!(
            self,
            Self::LocalFile | Self::FileRepository | Self::CombinedFile
        )
    }

    /// Synthetic services derived by the engine and never written by callers.
    pub fn is_combined(&self) -> bool {
        matches!(self, Self::CombinedTag | Self::CombinedFile)
    }

    /// Real tag services take part in precedence.
    pub fn is_ranked(&self) -> bool {
        matches!(self, Self::LocalTag | Self::TagRepository)
    }

    /// Restricted services keep petitions; deletes there need approval.
    pub fn is_restricted(&self) -> bool {
        matches!(self, Self::TagRepository)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
