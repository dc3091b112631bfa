//! Exact linear-scan vector store.
//!
//! Everything lives in memory; the whole store is serialized to a JSON file
//! every 5 insertions and on demand. Good enough for a single organism's
//! consolidated memories, and the fallback when the durable store cannot
//! open.

use crate::embedding::cosine_similarity;
use crate::store::{MemoryMatch, MemoryRecord};
use serde::{Deserialize, Serialize};
use soma_core::SomaError;
use std::path::PathBuf;

/// Persist after this many insertions since the last write.
const PERSIST_EVERY: usize = 5;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LinearStoreFile {
    records: Vec<MemoryRecord>,
}

pub struct LinearStore {
    path: PathBuf,
    records: Vec<MemoryRecord>,
    inserts_since_save: usize,
}

impl LinearStore {
    /// Open the store, loading any previously persisted records. A corrupt
    /// or unreadable file degrades to an empty store with a warning rather
    /// than failing construction.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SomaError> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<LinearStoreFile>(&content) {
                Ok(file) => file.records,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "linear store file corrupt ({}), starting empty", e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        tracing::debug!(count = records.len(), "linear store loaded");
        Ok(Self {
            path,
            records,
            inserts_since_save: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or overwrite by id. Persists every [`PERSIST_EVERY`]
    /// insertions; a failed write degrades durability but keeps the record
    /// in memory.
    pub fn upsert(&mut self, record: MemoryRecord) -> Result<(), SomaError> {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }

        self.inserts_since_save += 1;
        if self.inserts_since_save >= PERSIST_EVERY {
            if let Err(e) = self.flush() {
                tracing::warn!("linear store persistence failed: {}", e);
            }
        }
        Ok(())
    }

    /// Exact cosine scan, best first. `threshold` is a maximum cosine
    /// distance (1 − similarity).
    pub fn query(&self, vector: &[f32], k: usize, threshold: Option<f32>) -> Vec<MemoryMatch> {
        let mut matches: Vec<MemoryMatch> = self
            .records
            .iter()
            .map(|r| MemoryMatch {
                id: r.id.clone(),
                document: r.document.clone(),
                distance: 1.0 - cosine_similarity(vector, &r.embedding),
                metadata: r.metadata.clone(),
            })
            .filter(|m| threshold.map_or(true, |t| m.distance <= t))
            .collect();

        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        matches
    }

    /// Write the full store to disk.
    pub fn flush(&mut self) -> Result<(), SomaError> {
        let file = LinearStoreFile {
            records: self.records.clone(),
        };
        let json = serde_json::to_string(&file)
            .map_err(|e| SomaError::Persistence(format!("serialize linear store: {}", e)))?;
        std::fs::write(&self.path, json).map_err(|e| {
            SomaError::Persistence(format!("write {}: {}", self.path.display(), e))
        })?;
        self.inserts_since_save = 0;
        Ok(())
    }
}
