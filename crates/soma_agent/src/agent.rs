//! The orchestrator.
//!
//! Owns every piece of mutable organism state (hormones, profile, the
//! memory system) and serializes mutation through its locks. External tasks
//! only ever talk to the agent through `start_turn`, the broadcast channel
//! and the snapshot call.
//!
//! Side tasks (fact extraction, inner thought, post-turn consolidation) are
//! fire-and-forget by contract: their effects may land before or after the
//! reply commits, and callers must not assume an ordering.

use crate::interrupt::InterruptToken;
use crate::status::{AgentEvent, AgentStatus, ProfileSummary, StatusSnapshot};
use anyhow::Result;
use async_trait::async_trait;
use soma_core::hormone::{AgentState, HormoneEngine};
use soma_core::{sentiment_signal, SomaConfig};
use soma_memory::{MemorySystem, ProfileStore, Role, Summarizer};
use soma_reasoning::prompts;
use soma_reasoning::{extract_profile_facts, GenOptions, StreamEvent, TextGenerator};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};

/// Degraded reply when the generator is unavailable mid-turn.
pub const FALLBACK_REPLY: &str = "Sorry, I'm having trouble thinking right now.";

/// Events delivered to the caller of [`SomaAgent::start_turn`].
///
/// `Interrupted` and `Done` are both terminal; exactly one of them ends
/// every turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Fragment(String),
    Interrupted,
    Done,
}

/// Adapts the fast model into the memory crate's summarization capability.
struct GeneratorSummarizer {
    generator: Arc<dyn TextGenerator>,
}

#[async_trait]
impl Summarizer for GeneratorSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        soma_reasoning::summarize(self.generator.as_ref(), text).await
    }
}

pub struct SomaAgent {
    cfg: SomaConfig,
    hormones: Mutex<HormoneEngine>,
    memory: Arc<MemorySystem>,
    profile: Arc<Mutex<ProfileStore>>,
    generator: Arc<dyn TextGenerator>,
    summarizer: Arc<dyn Summarizer>,
    status: RwLock<AgentStatus>,
    last_active: RwLock<Instant>,
    interrupt: InterruptToken,
    events: broadcast::Sender<AgentEvent>,
    complexity: AtomicU8,
    last_evolve: Mutex<Option<Instant>>,
    consolidate_tx: mpsc::Sender<()>,
}

impl SomaAgent {
    /// Wire the organism together and spawn the consolidation worker.
    ///
    /// The worker is the only consumer of the consolidation queue, so one
    /// item at most is ever in flight.
    pub fn new(
        cfg: SomaConfig,
        generator: Arc<dyn TextGenerator>,
        memory: Arc<MemorySystem>,
        profile: ProfileStore,
    ) -> Arc<Self> {
        let (consolidate_tx, mut consolidate_rx) = mpsc::channel::<()>(16);
        let (events, _) = broadcast::channel(64);
        let summarizer: Arc<dyn Summarizer> = Arc::new(GeneratorSummarizer {
            generator: generator.clone(),
        });

        let agent = Arc::new(Self {
            hormones: Mutex::new(HormoneEngine::new(cfg.hormones.clone())),
            complexity: AtomicU8::new(cfg.behavior.initial_complexity),
            cfg,
            memory: memory.clone(),
            profile: Arc::new(Mutex::new(profile)),
            generator,
            summarizer: summarizer.clone(),
            status: RwLock::new(AgentStatus::Idle),
            last_active: RwLock::new(Instant::now()),
            interrupt: InterruptToken::new(),
            events,
            last_evolve: Mutex::new(None),
            consolidate_tx,
        });

        tokio::spawn(async move {
            while consolidate_rx.recv().await.is_some() {
                if let Err(e) = memory.consolidate_one(summarizer.as_ref()).await {
                    tracing::warn!("consolidation worker: {}", e);
                }
            }
        });

        agent
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> AgentStatus {
        *self.status.read().await
    }

    pub fn complexity(&self) -> u8 {
        self.complexity.load(Ordering::SeqCst)
    }

    pub(crate) fn memory(&self) -> &Arc<MemorySystem> {
        &self.memory
    }

    pub(crate) fn summarizer(&self) -> &dyn Summarizer {
        self.summarizer.as_ref()
    }

    pub(crate) fn generator(&self) -> &Arc<dyn TextGenerator> {
        &self.generator
    }

    pub(crate) fn config(&self) -> &SomaConfig {
        &self.cfg
    }

    pub(crate) fn interrupt_token(&self) -> &InterruptToken {
        &self.interrupt
    }

    pub(crate) fn broadcast(&self, event: AgentEvent) {
        // No subscribers is fine; drop the event.
        let _ = self.events.send(event);
    }

    pub(crate) async fn set_status(&self, status: AgentStatus) {
        *self.status.write().await = status;
    }

    pub(crate) async fn touch(&self) {
        *self.last_active.write().await = Instant::now();
    }

    pub(crate) async fn idle_for(&self) -> Duration {
        self.last_active.read().await.elapsed()
    }

    /// Run one hormone update for a feedback signal. Decay and delta apply
    /// under a single lock acquisition.
    pub async fn apply_signal(&self, signal: f32) {
        let mut hormones = self.hormones.lock().await;
        let deltas = hormones.evaluate(signal);
        hormones.update(deltas);
    }

    /// Pure-decay tick for the life-cycle loop.
    pub(crate) async fn decay_tick(&self) {
        self.hormones.lock().await.update(Default::default());
    }

    pub(crate) async fn hormone_view(&self) -> (soma_core::hormone::HormoneState, AgentState) {
        let hormones = self.hormones.lock().await;
        (hormones.state(), hormones.suggest_transition())
    }

    pub(crate) async fn hormone_stress(&self) -> f32 {
        self.hormones.lock().await.state().stress
    }

    pub(crate) async fn last_fact(&self) -> Option<String> {
        self.profile.lock().await.facts().last().cloned()
    }

    /// Full state snapshot for `/status` consumers and the broadcast.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let (hormones, diagnostics) = {
            let engine = self.hormones.lock().await;
            (engine.state().rounded(), engine.diagnostics())
        };
        let memory = self.memory.stats().await;
        let profile = {
            let profile = self.profile.lock().await;
            ProfileSummary {
                name: profile.name().to_string(),
                fact_count: profile.fact_count(),
            }
        };

        StatusSnapshot {
            agent_status: self.status().await,
            hormones,
            diagnostics,
            memory,
            profile,
        }
    }

    /// Consume an advisory EXPAND/PRUNE suggestion, at most once per
    /// cooldown window. Returns true if an evolve action fired.
    pub async fn maybe_evolve(&self, suggestion: AgentState) -> bool {
        let direction = match suggestion {
            AgentState::Expand => 1i16,
            AgentState::Prune => -1i16,
            _ => return false,
        };

        let mut last = self.last_evolve.lock().await;
        let cooldown = Duration::from_secs(self.cfg.behavior.evolve_cooldown_secs);
        if let Some(at) = *last {
            if at.elapsed() < cooldown {
                return false;
            }
        }

        let b = &self.cfg.behavior;
        let current = self.complexity.load(Ordering::SeqCst) as i16;
        let next = (current + direction).clamp(b.min_complexity as i16, b.max_complexity as i16);
        self.complexity.store(next as u8, Ordering::SeqCst);
        *last = Some(Instant::now());

        tracing::info!(from = current, to = next, "complexity evolved ({})", suggestion);
        self.broadcast(AgentEvent::Log(format!(
            "complexity evolved: {} -> {} ({})",
            current, next, suggestion
        )));
        true
    }

    /// Begin a conversational turn. Returns the lazy fragment stream.
    ///
    /// Interrupts any in-flight generation (chat or dream) first; the new
    /// turn's own stream clears the token when it starts. Each returned
    /// receiver belongs to exactly one turn and ends with `Interrupted` or
    /// `Done`.
    pub fn start_turn(self: &Arc<Self>, user_text: String) -> mpsc::Receiver<TurnEvent> {
        self.interrupt.interrupt();

        let (tx, rx) = mpsc::channel(64);
        let agent = Arc::clone(self);
        tokio::spawn(async move {
            agent.touch().await;
            agent.set_status(AgentStatus::Thinking).await;

            run_turn(&agent, user_text, &tx).await;

            agent.set_status(AgentStatus::Idle).await;
            agent.touch().await;
            // Nudge the worker; a full nudge queue already guarantees a run.
            let _ = agent.consolidate_tx.try_send(());
        });
        rx
    }
}

/// The chat-turn protocol.
async fn run_turn(agent: &Arc<SomaAgent>, user_text: String, tx: &mpsc::Sender<TurnEvent>) {
    // 1. Sentiment → hormone delta, atomically with decay.
    let signal = sentiment_signal(&user_text);
    agent.apply_signal(signal).await;

    // 2. The input joins the short-term window.
    agent.memory.append_turn(Role::User, user_text.clone()).await;

    // 3. Best-effort side tasks; ordering relative to the reply is
    //    deliberately unspecified.
    spawn_fact_extraction(agent, user_text.clone());
    spawn_inner_thought(agent, user_text.clone()).await;

    // 4. Retrieval. Failures surface as empty context inside the memory
    //    system, never here.
    let retrieved = agent
        .memory
        .retrieve(&user_text, agent.cfg.memory.top_k)
        .await;
    if let Some(best) = retrieved.first() {
        agent.broadcast(AgentEvent::Log(format!(
            "retrieved memory: {}",
            preview(best, 50)
        )));
    }

    // 5. Prompt assembly from hormone state + identity + context.
    let system = {
        let hormones = agent.hormones.lock().await.state();
        let core_identity = agent.profile.lock().await.core_prompt();
        prompts::assemble_chat_system(&hormones, agent.complexity(), &core_identity, &retrieved)
    };

    // 6. Request the stream. The token is cleared only once our own stream
    //    starts; until then earlier generations stay interrupted.
    let mut stream = match agent
        .generator
        .stream_generate(&system, &user_text, GenOptions::default())
        .await
    {
        Ok(stream) => {
            agent.interrupt.clear();
            stream
        }
        Err(e) => {
            tracing::error!("generation unavailable: {}", e);
            let _ = tx.send(TurnEvent::Fragment(FALLBACK_REPLY.to_string())).await;
            agent.memory.commit_agent_turn(FALLBACK_REPLY.to_string()).await;
            let _ = tx.send(TurnEvent::Done).await;
            return;
        }
    };

    // 7. Forward fragments, polling the token once per fragment. Whatever
    //    was produced before an interruption still becomes the buffer's
    //    last agent turn.
    let mut collected = String::new();
    let mut interrupted = false;

    while let Some(event) = stream.recv().await {
        match event {
            StreamEvent::Fragment(fragment) => {
                if agent.interrupt.is_interrupted() {
                    interrupted = true;
                    let _ = tx.send(TurnEvent::Interrupted).await;
                    break;
                }
                collected.push_str(&fragment);
                if tx.send(TurnEvent::Fragment(fragment)).await.is_err() {
                    // Caller went away; finish quietly and commit.
                    break;
                }
            }
            StreamEvent::Error(e) => {
                tracing::warn!("stream aborted: {}", e);
                break;
            }
            StreamEvent::Done => break,
        }
    }

    if !collected.is_empty() {
        agent.memory.commit_agent_turn(collected).await;
    }

    if !interrupted {
        let _ = tx.send(TurnEvent::Done).await;
    }
}

/// Fire-and-forget profile learning from the inbound text.
fn spawn_fact_extraction(agent: &Arc<SomaAgent>, user_text: String) {
    let generator = agent.generator.clone();
    let profile = agent.profile.clone();
    tokio::spawn(async move {
        let extracted = extract_profile_facts(generator.as_ref(), &user_text).await;

        if extracted.new_name.is_none() && extracted.preference.is_none() {
            return;
        }
        let mut profile = profile.lock().await;
        if let Some(name) = extracted.new_name {
            tracing::info!(name = %name, "learned user-given name");
            if let Err(e) = profile.update("name", &name) {
                tracing::warn!("profile update failed: {}", e);
            }
        }
        if let Some(preference) = extracted.preference {
            tracing::info!(fact = %preference, "learned user fact");
            if let Err(e) = profile.add_fact(&preference) {
                tracing::warn!("profile update failed: {}", e);
            }
        }
    });
}

/// Fire-and-forget inner voice, only when calm enough to reflect.
async fn spawn_inner_thought(agent: &Arc<SomaAgent>, user_text: String) {
    let stress = agent.hormones.lock().await.state().stress;
    if stress >= 0.6 {
        return;
    }

    let generator = agent.generator.clone();
    let events_agent = Arc::clone(agent);
    tokio::spawn(async move {
        match generator
            .generate(
                prompts::THOUGHT_SYSTEM,
                &prompts::thought_prompt(&user_text),
                GenOptions::fast(),
            )
            .await
        {
            Ok(thought) if !thought.trim().is_empty() => {
                events_agent.broadcast(AgentEvent::Thought(thought.trim().to_string()));
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("inner thought failed (non-fatal): {}", e),
        }
    });
}

pub(crate) fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
