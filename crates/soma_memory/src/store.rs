//! Long-term store contract and the two interchangeable backends.
//!
//! The pipeline only ever sees `upsert` / `query` / `stats`. Which backend
//! is live is decided once at construction: the durable SQLite store when it
//! opens, otherwise the in-memory linear store with JSON persistence.

use crate::embedding::Embedding;
use crate::linear::LinearStore;
use crate::sqlite::SqliteStore;
use serde::{Deserialize, Serialize};
use soma_core::config::MemoryConfig;
use soma_core::SomaError;

/// Metadata attached to every consolidated memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub timestamp: i64,
    pub source: String,
    pub length: usize,
}

impl MemoryMetadata {
    pub fn now(source: &str, document: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            source: source.to_string(),
            length: document.chars().count(),
        }
    }
}

/// A stored memory. Same id overwrites on upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub document: String,
    pub embedding: Embedding,
    pub metadata: MemoryMetadata,
}

/// A ranked query result. Distance is cosine distance (1 − similarity),
/// so smaller is better.
#[derive(Debug, Clone)]
pub struct MemoryMatch {
    pub id: String,
    pub document: String,
    pub distance: f32,
    pub metadata: MemoryMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub backend: &'static str,
    pub count: u64,
}

/// The two store variants, selected once at construction.
pub enum LongTermStore {
    Linear(LinearStore),
    Durable(SqliteStore),
}

impl LongTermStore {
    /// Open the configured backend. A durable-store open failure is absorbed
    /// by falling back to the linear store (the collaborator is unavailable,
    /// but a fallback variant exists).
    pub async fn open(cfg: &MemoryConfig) -> Result<Self, SomaError> {
        if cfg.durable {
            match SqliteStore::open(&cfg.db_path).await {
                Ok(store) => {
                    tracing::info!(path = %cfg.db_path, "long-term memory: durable store");
                    return Ok(LongTermStore::Durable(store));
                }
                Err(e) => {
                    tracing::warn!(
                        "durable store unavailable ({}), falling back to linear store",
                        e
                    );
                }
            }
        }
        let store = LinearStore::open(&cfg.store_path)?;
        tracing::info!(path = %cfg.store_path, "long-term memory: linear store");
        Ok(LongTermStore::Linear(store))
    }

    pub fn backend(&self) -> &'static str {
        match self {
            LongTermStore::Linear(_) => "linear",
            LongTermStore::Durable(_) => "sqlite",
        }
    }

    pub async fn upsert(&mut self, record: MemoryRecord) -> Result<(), SomaError> {
        match self {
            LongTermStore::Linear(s) => s.upsert(record),
            LongTermStore::Durable(s) => s.upsert(record).await,
        }
    }

    /// Ranked nearest neighbors, best first. `threshold` is a maximum cosine
    /// distance; `None` disables filtering.
    pub async fn query(
        &self,
        vector: &[f32],
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<MemoryMatch>, SomaError> {
        match self {
            LongTermStore::Linear(s) => Ok(s.query(vector, k, threshold)),
            LongTermStore::Durable(s) => s.query(vector, k, threshold).await,
        }
    }

    pub async fn stats(&self) -> Result<StoreStats, SomaError> {
        match self {
            LongTermStore::Linear(s) => Ok(StoreStats {
                backend: "linear",
                count: s.len() as u64,
            }),
            LongTermStore::Durable(s) => Ok(StoreStats {
                backend: "sqlite",
                count: s.count().await?,
            }),
        }
    }

    /// Force pending state to disk (linear store batches writes).
    pub async fn flush(&mut self) -> Result<(), SomaError> {
        match self {
            LongTermStore::Linear(s) => s.flush(),
            LongTermStore::Durable(_) => Ok(()),
        }
    }
}
