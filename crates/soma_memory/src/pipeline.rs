//! The memory pipeline: short-term window, overflow queue, consolidation
//! and retrieval.
//!
//! `MemoryPipeline` is the synchronous core (buffer + queue + counters).
//! `MemorySystem` wraps it for concurrent use: every task that touches the
//! buffers goes through the same mutex, and a separate gate guarantees at
//! most one consolidation is in flight at a time. Slow collaborator calls
//! (summarize, embed) run without holding the buffer lock.

use crate::buffer::{ConsolidationQueue, Role, ShortTermBuffer, Turn};
use crate::embedding::Embedder;
use crate::store::{LongTermStore, MemoryMetadata, MemoryRecord};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use soma_core::config::MemoryConfig;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Compress raw buffer text into a one-line memory. Implemented by the
/// orchestrator over the fast text generator; declared here so the memory
/// crate never depends on the reasoning crate.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Counters surfaced in the status snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    pub consolidated: u64,
    pub retrieved: u64,
}

/// Snapshot of the whole memory subsystem.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub backend: &'static str,
    pub buffer_size: usize,
    pub queue_size: usize,
    pub consolidated: u64,
    pub retrieved: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ltm_total: Option<u64>,
}

/// Synchronous pipeline core. Single-owner: all mutation goes through the
/// `MemorySystem` lock.
#[derive(Debug)]
pub struct MemoryPipeline {
    buffer: ShortTermBuffer,
    queue: ConsolidationQueue,
    stats: PipelineStats,
}

impl MemoryPipeline {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            buffer: ShortTermBuffer::new(buffer_capacity),
            queue: ConsolidationQueue::new(),
            stats: PipelineStats::default(),
        }
    }

    /// Append a turn; overflow moves the oldest turn onto the queue.
    pub fn append_turn(&mut self, role: Role, text: impl Into<String>) {
        if let Some(evicted) = self.buffer.push(Turn::new(role, text)) {
            self.queue.push(evicted.render());
        }
    }

    /// Queue raw text directly, bypassing the buffer (dream output).
    pub fn push_raw(&mut self, text: String) {
        self.queue.push(text);
    }

    pub fn buffer(&self) -> &ShortTermBuffer {
        &self.buffer
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn pop_queue(&mut self) -> Option<String> {
        self.queue.pop()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }
}

/// Concurrency-safe facade over the pipeline, the long-term store, and the
/// embedder.
pub struct MemorySystem {
    pipeline: Mutex<MemoryPipeline>,
    store: Mutex<LongTermStore>,
    embedder: Arc<dyn Embedder>,
    /// Held for the duration of one consolidation; serializes the
    /// pop → summarize → embed → upsert sequence against itself.
    consolidation_gate: Mutex<()>,
    retrieval_threshold: f32,
}

impl MemorySystem {
    pub fn new(cfg: &MemoryConfig, store: LongTermStore, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            pipeline: Mutex::new(MemoryPipeline::new(cfg.buffer_capacity)),
            store: Mutex::new(store),
            embedder,
            consolidation_gate: Mutex::new(()),
            retrieval_threshold: cfg.retrieval_threshold,
        }
    }

    pub async fn append_turn(&self, role: Role, text: impl Into<String>) {
        self.pipeline.lock().await.append_turn(role, text);
    }

    /// Commit streamed reply text as the buffer's last agent turn.
    pub async fn commit_agent_turn(&self, text: String) {
        self.pipeline.lock().await.append_turn(Role::Agent, text);
    }

    pub async fn push_raw(&self, text: String) {
        self.pipeline.lock().await.push_raw(text);
    }

    pub async fn recent_context(&self, n: usize) -> String {
        self.pipeline.lock().await.buffer().recent_context(n)
    }

    pub async fn queue_len(&self) -> usize {
        self.pipeline.lock().await.queue_len()
    }

    /// Consolidate at most one queued item: summarize → embed → upsert.
    ///
    /// Returns Ok(false) when the queue was empty. A failure anywhere drops
    /// the item (no retry) and is reported to the caller, who logs it; the
    /// queue is already shorter either way.
    pub async fn consolidate_one(&self, summarizer: &dyn Summarizer) -> Result<bool> {
        let _gate = self.consolidation_gate.lock().await;

        let item = match self.pipeline.lock().await.pop_queue() {
            Some(item) => item,
            None => return Ok(false),
        };

        let result = self.consolidate_item(summarizer, &item).await;
        match result {
            Ok(summary) => {
                let mut pipeline = self.pipeline.lock().await;
                pipeline.stats.consolidated += 1;
                tracing::info!(summary = %truncate(&summary, 60), "memory consolidated");
                Ok(true)
            }
            Err(e) => {
                tracing::error!("consolidation failed, dropping item: {}", e);
                Err(e)
            }
        }
    }

    async fn consolidate_item(&self, summarizer: &dyn Summarizer, item: &str) -> Result<String> {
        let summary = summarizer.summarize(item).await?;
        let embedding = self.embedder.embed(&summary)?;

        let record = MemoryRecord {
            id: format!("mem_{}", Uuid::new_v4().simple()),
            metadata: MemoryMetadata::now("consolidation", &summary),
            document: summary.clone(),
            embedding,
        };

        self.store.lock().await.upsert(record).await?;
        Ok(summary)
    }

    /// Nearest-neighbor retrieval for prompt context. Never fails: an empty
    /// store or any collaborator error yields an empty sequence.
    pub async fn retrieve(&self, query_text: &str, top_k: usize) -> Vec<String> {
        let vector = match self.embedder.embed(query_text) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("retrieval embed failed: {}", e);
                return Vec::new();
            }
        };

        let matches = {
            let store = self.store.lock().await;
            match store
                .query(&vector, top_k, Some(self.retrieval_threshold))
                .await
            {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!("retrieval query failed: {}", e);
                    return Vec::new();
                }
            }
        };

        let docs: Vec<String> = matches.into_iter().map(|m| m.document).collect();
        if !docs.is_empty() {
            self.pipeline.lock().await.stats.retrieved += docs.len() as u64;
        }
        docs
    }

    pub async fn stats(&self) -> MemoryStats {
        let (buffer_size, queue_size, counters) = {
            let pipeline = self.pipeline.lock().await;
            (
                pipeline.buffer().len(),
                pipeline.queue_len(),
                pipeline.stats(),
            )
        };

        let store = self.store.lock().await;
        let backend = store.backend();
        let ltm_total = match store.stats().await {
            Ok(s) => Some(s.count),
            Err(e) => {
                tracing::warn!("store stats failed: {}", e);
                None
            }
        };

        MemoryStats {
            backend,
            buffer_size,
            queue_size,
            consolidated: counters.consolidated,
            retrieved: counters.retrieved,
            ltm_total,
        }
    }

    /// Flush any batched store state to disk.
    pub async fn flush(&self) -> Result<()> {
        self.store.lock().await.flush().await?;
        Ok(())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedding;

    struct StubEmbedder;

    impl Embedder for StubEmbedder {
        fn embed(&self, text: &str) -> Result<Embedding> {
            // Deterministic toy embedding: char-count features.
            let len = text.chars().count() as f32;
            Ok(vec![len, 1.0])
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Embedding> {
            anyhow::bail!("embedder offline")
        }
    }

    struct EchoSummarizer;

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        async fn summarize(&self, text: &str) -> Result<String> {
            Ok(format!("summary of: {}", text))
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _text: &str) -> Result<String> {
            anyhow::bail!("generator offline")
        }
    }

    async fn system(dir: &tempfile::TempDir, capacity: usize) -> MemorySystem {
        let cfg = MemoryConfig {
            buffer_capacity: capacity,
            durable: false,
            store_path: dir.path().join("mem.json").display().to_string(),
            ..MemoryConfig::default()
        };
        let store = LongTermStore::open(&cfg).await.unwrap();
        MemorySystem::new(&cfg, store, Arc::new(StubEmbedder))
    }

    #[tokio::test]
    async fn test_append_overflow_reaches_queue() {
        let dir = tempfile::tempdir().unwrap();
        let sys = system(&dir, 10).await;

        for i in 0..11 {
            sys.append_turn(Role::User, format!("turn {}", i)).await;
        }
        let stats = sys.stats().await;
        assert_eq!(stats.buffer_size, 10);
        assert_eq!(stats.queue_size, 1);
    }

    #[tokio::test]
    async fn test_consolidate_one_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let sys = system(&dir, 5).await;
        let did = sys.consolidate_one(&EchoSummarizer).await.unwrap();
        assert!(!did);
    }

    #[tokio::test]
    async fn test_consolidate_one_stores_summary() {
        let dir = tempfile::tempdir().unwrap();
        let sys = system(&dir, 5).await;
        sys.push_raw("raw overflow text".to_string()).await;

        let did = sys.consolidate_one(&EchoSummarizer).await.unwrap();
        assert!(did);

        let stats = sys.stats().await;
        assert_eq!(stats.queue_size, 0);
        assert_eq!(stats.consolidated, 1);
        assert_eq!(stats.ltm_total, Some(1));
    }

    #[tokio::test]
    async fn test_consolidation_failure_drops_item() {
        let dir = tempfile::tempdir().unwrap();
        let sys = system(&dir, 5).await;
        sys.push_raw("doomed item".to_string()).await;

        let result = sys.consolidate_one(&FailingSummarizer).await;
        assert!(result.is_err());

        // The item is gone (no retry) and nothing reached the store.
        let stats = sys.stats().await;
        assert_eq!(stats.queue_size, 0);
        assert_eq!(stats.consolidated, 0);
        assert_eq!(stats.ltm_total, Some(0));
    }

    #[tokio::test]
    async fn test_consolidate_processes_one_item_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let sys = system(&dir, 5).await;
        sys.push_raw("first".to_string()).await;
        sys.push_raw("second".to_string()).await;

        sys.consolidate_one(&EchoSummarizer).await.unwrap();
        assert_eq!(sys.queue_len().await, 1);
    }

    #[tokio::test]
    async fn test_retrieve_empty_store_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sys = system(&dir, 5).await;
        let docs = sys.retrieve("anything", 4).await;
        assert!(docs.is_empty());
        assert_eq!(sys.stats().await.retrieved, 0);
    }

    #[tokio::test]
    async fn test_retrieve_counts_and_returns_best_first() {
        let dir = tempfile::tempdir().unwrap();
        let sys = system(&dir, 5).await;

        // Stub embedding is (len, 1.0): same-length texts are near-identical.
        sys.push_raw("abcde".to_string()).await;
        sys.consolidate_one(&EchoSummarizer).await.unwrap();

        let docs = sys.retrieve("summary of: abcde", 4).await;
        assert_eq!(docs.len(), 1);
        assert!(docs[0].contains("abcde"));
        assert_eq!(sys.stats().await.retrieved, 1);
    }

    #[tokio::test]
    async fn test_retrieve_embedder_failure_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MemoryConfig {
            buffer_capacity: 5,
            durable: false,
            store_path: dir.path().join("mem.json").display().to_string(),
            ..MemoryConfig::default()
        };
        let store = LongTermStore::open(&cfg).await.unwrap();
        let sys = MemorySystem::new(&cfg, store, Arc::new(FailingEmbedder));

        let docs = sys.retrieve("query", 4).await;
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_stats_backend_label() {
        let dir = tempfile::tempdir().unwrap();
        let sys = system(&dir, 5).await;
        assert_eq!(sys.stats().await.backend, "linear");
    }
}
