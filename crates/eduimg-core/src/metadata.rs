//! Positional metadata store.
//!
//! Offline jobs write one metadata record per index row, in row order.
//! The store is read-only once loaded.

use std::path::Path;

use crate::error::{Result, RetrievalError};
use crate::models::DocumentRecord;

#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    records: Vec<DocumentRecord>,
}

impl MetadataStore {
    pub fn from_records(records: Vec<DocumentRecord>) -> Self {
        Self { records }
    }

    /// Load a JSON array of records.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let records: Vec<DocumentRecord> =
            serde_json::from_slice(&bytes).map_err(|e| RetrievalError::corrupt(path, e))?;
        Ok(Self { records })
    }

    pub fn get(&self, position: usize) -> Result<&DocumentRecord> {
        self.records
            .get(position)
            .ok_or(RetrievalError::IndexOutOfRange {
                position,
                len: self.records.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.records.iter()
    }

    /// Fail unless the store has exactly one record per index entry.
    pub fn check_aligned(&self, index_len: usize) -> Result<()> {
        if self.records.len() != index_len {
            return Err(RetrievalError::MetadataMisaligned {
                metadata: self.records.len(),
                index: index_len,
            });
        }
        Ok(())
    }
}
