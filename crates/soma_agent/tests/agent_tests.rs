//! Integration tests for the orchestrator.
//!
//! A scripted MockGenerator stands in for the LLM and a deterministic stub
//! embedder for the embedding model, so the full turn / dream / life-cycle
//! paths run without external collaborators.

use anyhow::Result;
use async_trait::async_trait;
use soma_agent::agent::TurnEvent;
use soma_agent::{dream, lifecycle, AgentEvent, AgentStatus, SomaAgent, FALLBACK_REPLY};
use soma_core::config::{MemoryConfig, SomaConfig};
use soma_core::hormone::AgentState;
use soma_memory::{Embedder, LongTermStore, MemorySystem, ProfileStore};
use soma_reasoning::{GenOptions, StreamEvent, TextGenerator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

// ============================================================================
// Mock collaborators
// ============================================================================

/// Scripted text generator. `generate` always returns `reply`; streams
/// deliver `fragments` with a configurable delay after `stream_start_delay`.
struct MockGenerator {
    reply: String,
    fragments: Vec<String>,
    fragment_delay: Duration,
    stream_start_delay: Duration,
    fail_streams: bool,
}

impl MockGenerator {
    fn with_fragments(fragments: &[&str]) -> Self {
        Self {
            reply: "a short summary".to_string(),
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            fragment_delay: Duration::from_millis(5),
            stream_start_delay: Duration::ZERO,
            fail_streams: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail_streams: true,
            ..Self::with_fragments(&[])
        }
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, _system: &str, _user: &str, _opts: GenOptions) -> Result<String> {
        if self.fail_streams {
            anyhow::bail!("generator offline");
        }
        Ok(self.reply.clone())
    }

    async fn stream_generate(
        &self,
        _system: &str,
        _user: &str,
        _opts: GenOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        if self.fail_streams {
            anyhow::bail!("generator offline");
        }
        sleep(self.stream_start_delay).await;

        let (tx, rx) = mpsc::channel(16);
        let fragments = self.fragments.clone();
        let delay = self.fragment_delay;
        tokio::spawn(async move {
            for fragment in fragments {
                sleep(delay).await;
                if tx.send(StreamEvent::Fragment(fragment)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(StreamEvent::Done).await;
        });
        Ok(rx)
    }
}

/// Deterministic embedding: one dimension per character-count bucket.
struct StubEmbedder;

impl Embedder for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let len = text.chars().count() as f32;
        Ok(vec![len, 1.0])
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    agent: Arc<SomaAgent>,
    memory: Arc<MemorySystem>,
    _dir: tempfile::TempDir,
}

async fn harness_with(generator: MockGenerator, cfg_tweak: impl FnOnce(&mut SomaConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = SomaConfig::default();
    cfg.memory = MemoryConfig {
        durable: false,
        store_path: dir.path().join("mem.json").display().to_string(),
        profile_path: dir.path().join("profile.json").display().to_string(),
        ..MemoryConfig::default()
    };
    cfg_tweak(&mut cfg);

    let store = LongTermStore::open(&cfg.memory).await.unwrap();
    let memory = Arc::new(MemorySystem::new(&cfg.memory, store, Arc::new(StubEmbedder)));
    let profile = ProfileStore::open(&cfg.memory.profile_path);
    let agent = SomaAgent::new(cfg, Arc::new(generator), memory.clone(), profile);

    Harness {
        agent,
        memory,
        _dir: dir,
    }
}

async fn harness(generator: MockGenerator) -> Harness {
    harness_with(generator, |_| {}).await
}

/// Drain a turn receiver into (fragments, terminal event).
async fn collect_turn(mut rx: mpsc::Receiver<TurnEvent>) -> (String, TurnEvent) {
    let mut text = String::new();
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("turn stalled")
            .expect("turn channel closed without terminal event");
        match event {
            TurnEvent::Fragment(f) => text.push_str(&f),
            terminal => return (text, terminal),
        }
    }
}

// ============================================================================
// Chat turn protocol
// ============================================================================

#[tokio::test]
async fn test_turn_streams_fragments_and_commits_reply() {
    let h = harness(MockGenerator::with_fragments(&["Hello ", "there", "!"])).await;

    let rx = h.agent.start_turn("hi, how are you?".to_string());
    let (text, terminal) = collect_turn(rx).await;

    assert_eq!(text, "Hello there!");
    assert_eq!(terminal, TurnEvent::Done);

    // Both turns are in the buffer, agent reply last.
    let context = h.memory.recent_context(2).await;
    assert!(context.contains("User: hi, how are you?"));
    assert!(context.ends_with("Agent: Hello there!"));

    // The turn task flips back to IDLE just after the terminal event.
    sleep(Duration::from_millis(50)).await;
    assert_eq!(h.agent.status().await, AgentStatus::Idle);
}

#[tokio::test]
async fn test_turn_updates_hormones_from_sentiment() {
    let h = harness(MockGenerator::with_fragments(&["ok"])).await;

    let baseline_stress = h.agent.snapshot().await.hormones.stress;
    let rx = h.agent.start_turn("this is terrible, I hate it".to_string());
    let _ = collect_turn(rx).await;

    let after = h.agent.snapshot().await.hormones;
    assert!(
        after.stress > baseline_stress + 0.3,
        "negative sentiment must spike stress (was {}, now {})",
        baseline_stress,
        after.stress
    );
}

#[tokio::test]
async fn test_generator_failure_yields_fallback_reply() {
    let h = harness(MockGenerator::failing()).await;

    let rx = h.agent.start_turn("hello?".to_string());
    let (text, terminal) = collect_turn(rx).await;

    assert_eq!(text, FALLBACK_REPLY);
    assert_eq!(terminal, TurnEvent::Done);

    // The fallback is still committed as the agent's turn.
    let context = h.memory.recent_context(1).await;
    assert!(context.contains(FALLBACK_REPLY));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(h.agent.status().await, AgentStatus::Idle);
}

#[tokio::test]
async fn test_new_turn_interrupts_inflight_stream() {
    let mut slow = MockGenerator::with_fragments(&["one ", "two ", "three ", "four ", "five "]);
    slow.fragment_delay = Duration::from_millis(50);
    // The second turn's stream opens late enough for the first turn to poll
    // the token while still streaming.
    slow.stream_start_delay = Duration::from_millis(150);
    let h = harness(slow).await;

    let mut rx1 = h.agent.start_turn("first question".to_string());

    // Wait for the first fragment so turn 1 is demonstrably mid-stream.
    let first = timeout(Duration::from_secs(5), rx1.recv()).await.unwrap();
    assert!(matches!(first, Some(TurnEvent::Fragment(_))));

    let rx2 = h.agent.start_turn("never mind, new question".to_string());

    // Turn 1 must end with the Interrupted marker.
    let mut saw_interrupted = false;
    while let Ok(Some(event)) = timeout(Duration::from_secs(5), rx1.recv()).await {
        match event {
            TurnEvent::Interrupted => {
                saw_interrupted = true;
                break;
            }
            TurnEvent::Done => break,
            TurnEvent::Fragment(_) => {}
        }
    }
    assert!(saw_interrupted, "first turn should observe the interruption");

    // Turn 2 runs to completion.
    let (text2, terminal2) = collect_turn(rx2).await;
    assert_eq!(terminal2, TurnEvent::Done);
    assert!(!text2.is_empty());

    // Whatever turn 1 produced before stopping was committed.
    let context = h.memory.recent_context(10).await;
    assert!(context.contains("Agent: one "), "partial reply must be committed: {}", context);
}

#[tokio::test]
async fn test_turn_overflow_feeds_consolidation() {
    let h = harness_with(MockGenerator::with_fragments(&["reply"]), |cfg| {
        cfg.memory.buffer_capacity = 2;
    })
    .await;

    // 3 turns x 2 entries overflow a capacity-2 buffer repeatedly; the
    // post-turn worker consolidates one item per turn.
    for i in 0..3 {
        let rx = h.agent.start_turn(format!("message number {}", i));
        let _ = collect_turn(rx).await;
    }
    // Let the fire-and-forget consolidation worker drain its nudges.
    sleep(Duration::from_millis(300)).await;

    let stats = h.agent.snapshot().await.memory;
    assert_eq!(stats.buffer_size, 2);
    assert!(
        stats.consolidated >= 1,
        "worker should have consolidated at least one evicted turn, stats: {:?}",
        stats
    );
    assert_eq!(stats.backend, "linear");
}

// ============================================================================
// Dream protocol
// ============================================================================

#[tokio::test]
async fn test_dream_consolidates_directly() {
    let h = harness(MockGenerator::with_fragments(&["neon towers ", "hum softly"])).await;

    dream::run_dream(&h.agent).await;

    let stats = h.agent.snapshot().await.memory;
    assert_eq!(stats.queue_size, 0, "dream text should be consumed");
    assert_eq!(stats.consolidated, 1);
    assert_eq!(stats.ltm_total, Some(1));
    assert_eq!(h.agent.status().await, AgentStatus::Idle);

    // Dreams bypass the short-term buffer entirely.
    assert_eq!(stats.buffer_size, 0);
}

#[tokio::test]
async fn test_dream_generator_failure_is_quiet() {
    let h = harness(MockGenerator::failing()).await;

    dream::run_dream(&h.agent).await;

    let stats = h.agent.snapshot().await.memory;
    assert_eq!(stats.consolidated, 0);
    assert_eq!(h.agent.status().await, AgentStatus::Idle);
}

// ============================================================================
// Life-cycle
// ============================================================================

#[tokio::test]
async fn test_tick_decays_toward_baseline_and_broadcasts() {
    let h = harness(MockGenerator::with_fragments(&["ok"])).await;
    let mut events = h.agent.subscribe();

    // Push stress well above baseline, then decay.
    h.agent.apply_signal(-0.9).await;
    let stressed = h.agent.snapshot().await.hormones.stress;

    lifecycle::tick_once(&h.agent).await;
    lifecycle::tick_once(&h.agent).await;

    let relaxed = h.agent.snapshot().await.hormones.stress;
    assert!(relaxed < stressed, "decay ticks must relax stress");
    assert!(relaxed >= 0.1 - 1e-6, "decay must not overshoot the baseline");

    // Each tick broadcast a status snapshot.
    let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
    assert!(matches!(event, AgentEvent::Status(_)));
}

#[tokio::test]
async fn test_evolve_fires_once_per_cooldown() {
    let h = harness_with(MockGenerator::with_fragments(&["ok"]), |cfg| {
        cfg.behavior.evolve_cooldown_secs = 3600;
    })
    .await;

    assert_eq!(h.agent.complexity(), 1);
    assert!(h.agent.maybe_evolve(AgentState::Expand).await);
    assert_eq!(h.agent.complexity(), 2);

    // Second suggestion inside the window is ignored.
    assert!(!h.agent.maybe_evolve(AgentState::Expand).await);
    assert_eq!(h.agent.complexity(), 2);

    // Non-advisory states never evolve.
    assert!(!h.agent.maybe_evolve(AgentState::Thinking).await);
}

#[tokio::test]
async fn test_evolve_prune_saturates_at_minimum() {
    let h = harness_with(MockGenerator::with_fragments(&["ok"]), |cfg| {
        cfg.behavior.evolve_cooldown_secs = 0;
    })
    .await;

    assert!(h.agent.maybe_evolve(AgentState::Prune).await);
    assert_eq!(h.agent.complexity(), 1, "complexity saturates at min");
}

#[tokio::test]
async fn test_proactive_broadcasts_and_joins_buffer() {
    let mut generator = MockGenerator::with_fragments(&[]);
    generator.reply = "So, how did the chess game go?".to_string();
    let h = harness(generator).await;
    let mut events = h.agent.subscribe();

    lifecycle::run_proactive(&h.agent).await;

    let mut saw_message = false;
    while let Ok(Ok(event)) = timeout(Duration::from_millis(500), events.recv()).await {
        if let AgentEvent::Message(msg) = event {
            assert!(msg.contains("chess"));
            saw_message = true;
            break;
        }
    }
    assert!(saw_message, "proactive turn must broadcast its message");

    let context = h.memory.recent_context(1).await;
    assert!(context.contains("Agent: So, how did the chess game go?"));
    assert_eq!(h.agent.status().await, AgentStatus::Idle);
}

#[tokio::test]
async fn test_snapshot_shape() {
    let h = harness(MockGenerator::with_fragments(&["ok"])).await;
    let snapshot = h.agent.snapshot().await;

    assert_eq!(snapshot.agent_status, AgentStatus::Idle);
    assert_eq!(snapshot.profile.name, "Nova");
    assert_eq!(snapshot.profile.fact_count, 0);
    assert_eq!(snapshot.memory.backend, "linear");
    assert!(snapshot.diagnostics.internal_validation <= 1.0);

    // The snapshot serializes for the surrounding service.
    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"agent_status\":\"IDLE\""));
    assert!(json.contains("\"stress\""));
}
