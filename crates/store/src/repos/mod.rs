//! Repository traits for tag store operations.
//!
//! Every trait is implemented for [`sqlx::SqliteConnection`] so a single
//! transaction can drive all of them.

pub mod autocomplete;
pub mod files;
pub mod interner;
pub mod mappings;
pub mod petitions;
pub mod services;

pub use autocomplete::AutocompleteRepo;
pub use files::FileRepo;
pub use interner::{InternedTag, InternerRepo};
pub use mappings::MappingRepo;
pub use petitions::PetitionRepo;
pub use services::ServiceRepo;

use crate::error::StoreResult;

/// Encode ids as a JSON array for `IN (SELECT value FROM json_each(?))`.
pub(crate) fn id_list(ids: &[i64]) -> StoreResult<String> {
    Ok(serde_json::to_string(ids)?)
}
