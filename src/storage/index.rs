use serde::{Deserialize, Serialize};

use crate::storage::record::DatasetKind;

/// File name of the persisted header index inside the data directory
pub const INDEX_FILE: &str = "dataset_index.json";

/// Metadata about a stored dataset, kept apart from its records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// The dataset identifier
    pub id: String,
    /// The kind of record the dataset holds
    pub kind: DatasetKind,
    /// Number of records in the dataset
    #[serde(rename = "numRows")]
    pub num_rows: usize,
    /// Unix timestamp in milliseconds when the dataset was added
    #[serde(rename = "addedAt", default)]
    pub added_at: i64,
}

impl Header {
    pub fn new(id: String, kind: DatasetKind, num_rows: usize) -> Self {
        Self {
            id,
            kind,
            num_rows,
            added_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// In-memory copy of the header index, in insertion order
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    headers: Vec<Header>,
}

impl HeaderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let headers: Vec<Header> = serde_json::from_slice(bytes)?;
        Ok(Self { headers })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.headers)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Header> {
        self.headers.iter().find(|header| header.id == id)
    }

    /// Adds a header. Returns false if a header with the same id is already indexed.
    pub fn insert(&mut self, header: Header) -> bool {
        if self.contains(&header.id) {
            return false;
        }
        self.headers.push(header);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<Header> {
        let position = self.headers.iter().position(|header| header.id == id)?;
        Some(self.headers.remove(position))
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn ids(&self) -> Vec<String> {
        self.headers.iter().map(|header| header.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}
