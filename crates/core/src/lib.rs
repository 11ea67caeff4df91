//! Core domain types for the tagbase tag-mapping engine.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content hashes identifying files
//! - Namespaced tags and their cleaning rules
//! - Service keys, service types, and the well-known combined services
//! - Mapping statuses and the per-key transition table
//! - Content update intents submitted by collaborators
//! - Change notifications and configuration

pub mod autocomplete;
pub mod config;
pub mod error;
pub mod hash;
pub mod notification;
pub mod service;
pub mod status;
pub mod tag;
pub mod update;

pub use autocomplete::{AutocompleteMatch, AutocompleteQuery};
pub use error::{Error, Result};
pub use hash::ContentHash;
pub use notification::{JobFailure, ServiceChange};
pub use service::{
    COMBINED_FILE_SERVICE_KEY_U128, COMBINED_TAG_SERVICE_KEY_U128, ServiceKey, ServiceType,
};
pub use status::{MappingAction, MappingStatus, PetitionChange, StatusChange};
pub use tag::Tag;
pub use update::{ContentUpdate, FileAction, FileUpdate, MappingUpdate, ServiceUpdates};
