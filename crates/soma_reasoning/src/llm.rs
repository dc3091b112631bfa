//! Text-generation capability contract.
//!
//! The orchestrator only ever talks to `dyn TextGenerator`; providers and
//! test doubles implement it. Streams are finite, not restartable, and are
//! delivered over an mpsc channel so the producer can be dropped to stop a
//! stream early.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Which model variant to use for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelTier {
    /// The main chat model.
    #[default]
    Primary,
    /// Lower-latency/cost variant for subtasks: summaries, inner thoughts,
    /// dreams, proactive one-liners.
    Fast,
}

/// Per-call generation options.
#[derive(Debug, Clone, Default)]
pub struct GenOptions {
    pub tier: ModelTier,
    /// Override the provider's configured temperature for this call.
    pub temperature: Option<f32>,
}

impl GenOptions {
    pub fn fast() -> Self {
        Self {
            tier: ModelTier::Fast,
            ..Self::default()
        }
    }
}

/// One event on a generation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Fragment(String),
    Done,
    Error(String),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete and return the full text.
    async fn generate(&self, system: &str, user: &str, opts: GenOptions) -> Result<String>;

    /// Complete as a lazy sequence of text fragments. The receiver yields
    /// `Fragment`s followed by exactly one `Done` (or an `Error`, after
    /// which nothing else arrives).
    async fn stream_generate(
        &self,
        system: &str,
        user: &str,
        opts: GenOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>>;
}

/// Compress raw text into a single short sentence using the fast model.
pub async fn summarize(generator: &dyn TextGenerator, text: &str) -> Result<String> {
    let prompt = format!("Summarize this in one short sentence: '{}'", text);
    let summary = generator
        .generate("You are a summarizer. Reply with the summary only.", &prompt, GenOptions::fast())
        .await?;
    Ok(summary.trim().to_string())
}
