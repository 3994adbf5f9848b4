//! Storage module for campusdb
//! Handles the record model and durable per-dataset persistence.

pub mod index;
pub mod record;
pub mod store;

use std::io;
use thiserror::Error;

pub use index::{Header, HeaderIndex};
pub use record::{
    DatasetKind, Field, FieldType, FieldValue, Record, Room, RoomField, Section, SectionField,
};
pub use store::{Dataset, DatasetStore};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid ID: '{0}'")]
    InvalidId(String),
    #[error("Dataset ID: '{0}', already exists")]
    DuplicateId(String),
    #[error("Dataset '{0}' contains no records")]
    EmptyDataset(String),
    #[error("Dataset '{0}' mixes record kinds")]
    KindMismatch(String),
    #[error("ID not found: '{0}'")]
    NotFound(String),
    #[error("Corrupted dataset file: {0}")]
    Corrupted(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Checks that `id` is usable both as a dataset identifier and as a file stem.
pub fn validate_id(id: &str) -> Result<(), StorageError> {
    let invalid = id.trim().is_empty()
        || id.contains('_')
        || id.contains('/')
        || id.contains('\\')
        || id.starts_with('.');
    if invalid {
        return Err(StorageError::InvalidId(id.to_string()));
    }
    Ok(())
}
