//! Durable long-term store over SQLite.
//!
//! Rows keep the document text plus a bincode-serialized embedding BLOB.
//! Queries fetch a recency-bounded candidate set and rank it by exact
//! cosine similarity in process; the LIMIT keeps the scan approximate at
//! scale while recent memories stay fully covered.

use crate::embedding::cosine_similarity;
use crate::store::{MemoryMatch, MemoryMetadata, MemoryRecord};
use soma_core::SomaError;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};

/// Upper bound on rows considered per query.
const CANDIDATE_LIMIT: i64 = 1000;

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn open(db_path: &str) -> Result<Self, SomaError> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path);
        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .map_err(|e| {
                SomaError::CollaboratorUnavailable(format!("sqlite {}: {}", db_path, e))
            })?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), SomaError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                embedding BLOB NOT NULL,
                timestamp INTEGER NOT NULL,
                source TEXT NOT NULL,
                length INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SomaError::Persistence(format!("create memories table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_timestamp ON memories(timestamp)")
            .execute(&self.pool)
            .await
            .map_err(|e| SomaError::Persistence(format!("create timestamp index: {}", e)))?;

        Ok(())
    }

    /// Insert or overwrite by id.
    pub async fn upsert(&self, record: MemoryRecord) -> Result<(), SomaError> {
        let blob = bincode::serialize(&record.embedding)
            .map_err(|e| SomaError::Persistence(format!("serialize embedding: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO memories (id, document, embedding, timestamp, source, length)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                document = excluded.document,
                embedding = excluded.embedding,
                timestamp = excluded.timestamp,
                source = excluded.source,
                length = excluded.length
            "#,
        )
        .bind(&record.id)
        .bind(&record.document)
        .bind(blob)
        .bind(record.metadata.timestamp)
        .bind(&record.metadata.source)
        .bind(record.metadata.length as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| SomaError::Persistence(format!("upsert memory: {}", e)))?;

        Ok(())
    }

    /// Ranked nearest neighbors over the most recent candidates.
    pub async fn query(
        &self,
        vector: &[f32],
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<MemoryMatch>, SomaError> {
        let rows = sqlx::query(
            "SELECT id, document, embedding, timestamp, source, length FROM memories \
             ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(CANDIDATE_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SomaError::Retrieval(format!("fetch candidates: {}", e)))?;

        let mut matches = Vec::new();
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let embedding: Vec<f32> = match bincode::deserialize(&blob) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("skipping memory with corrupt embedding: {}", e);
                    continue;
                }
            };

            let distance = 1.0 - cosine_similarity(vector, &embedding);
            if threshold.map_or(true, |t| distance <= t) {
                matches.push(MemoryMatch {
                    id: row.get("id"),
                    document: row.get("document"),
                    distance,
                    metadata: MemoryMetadata {
                        timestamp: row.get("timestamp"),
                        source: row.get("source"),
                        length: row.get::<i64, _>("length") as usize,
                    },
                });
            }
        }

        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        Ok(matches)
    }

    pub async fn count(&self) -> Result<u64, SomaError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM memories")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SomaError::Retrieval(format!("count memories: {}", e)))?;
        Ok(row.get::<i64, _>("n") as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, doc: &str, embedding: Vec<f32>) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            document: doc.to_string(),
            metadata: MemoryMetadata::now("test", doc),
            embedding,
        }
    }

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soma.db").display().to_string();
        let store = SqliteStore::open(&path).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_query_empty_store() {
        let (_dir, store) = temp_store().await;
        let matches = store.query(&[1.0, 0.0], 5, None).await.unwrap();
        assert!(matches.is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_and_query() {
        let (_dir, store) = temp_store().await;
        store
            .upsert(record("a", "likes rust", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(record("b", "likes tea", vec![0.0, 1.0]))
            .await
            .unwrap();

        let matches = store.query(&[1.0, 0.1], 2, None).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].document, "likes rust");
        assert!(matches[0].distance < matches[1].distance);
    }

    #[tokio::test]
    async fn test_upsert_same_id_overwrites() {
        let (_dir, store) = temp_store().await;
        store
            .upsert(record("a", "first", vec![1.0]))
            .await
            .unwrap();
        store
            .upsert(record("a", "second", vec![1.0]))
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let matches = store.query(&[1.0], 1, None).await.unwrap();
        assert_eq!(matches[0].document, "second");
    }

    #[tokio::test]
    async fn test_threshold_filters_matches() {
        let (_dir, store) = temp_store().await;
        store
            .upsert(record("near", "near", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(record("far", "far", vec![0.0, 1.0]))
            .await
            .unwrap();

        let matches = store.query(&[1.0, 0.0], 5, Some(0.5)).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "near");
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let (_dir, store) = temp_store().await;
        let rec = record("a", "doc text", vec![1.0]);
        let ts = rec.metadata.timestamp;
        store.upsert(rec).await.unwrap();

        let matches = store.query(&[1.0], 1, None).await.unwrap();
        assert_eq!(matches[0].metadata.timestamp, ts);
        assert_eq!(matches[0].metadata.source, "test");
        assert_eq!(matches[0].metadata.length, 8);
    }
}
