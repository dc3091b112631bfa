//! The life-cycle loop.
//!
//! A fixed-interval tick that decays hormones, broadcasts the status
//! snapshot, consumes EXPAND/PRUNE suggestions, and starts proactive or
//! dream turns when the organism has been idle long enough. Every failure
//! is caught at the tick boundary; nothing terminates the loop.

use crate::agent::SomaAgent;
use crate::dream::run_dream;
use crate::status::{AgentEvent, AgentStatus};
use soma_core::hormone::AgentState;
use soma_memory::Role;
use soma_reasoning::{prompts, GenOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawn the periodic life-cycle task.
pub fn spawn_lifecycle(agent: Arc<SomaAgent>) -> JoinHandle<()> {
    let tick = Duration::from_secs(agent.config().behavior.tick_interval_secs.max(1));
    tokio::spawn(async move {
        tracing::info!(interval = ?tick, "life-cycle started");
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so idle timers start
        // from a full interval.
        interval.tick().await;

        loop {
            interval.tick().await;
            tick_once(&agent).await;
        }
    })
}

/// One life-cycle tick. Public for tests; never returns an error because
/// per-tick failures must not escape.
pub async fn tick_once(agent: &Arc<SomaAgent>) {
    // 1. Decay toward baseline.
    agent.decay_tick().await;

    // 2. Broadcast current state and diagnostics.
    let snapshot = agent.snapshot().await;
    agent.broadcast(AgentEvent::Status(snapshot));

    // 3. Consume an advisory EXPAND/PRUNE, gated by the evolve cooldown.
    let (hormones, suggestion) = agent.hormone_view().await;
    if matches!(suggestion, AgentState::Expand | AgentState::Prune) {
        agent.maybe_evolve(suggestion).await;
    }

    // 4. Idle behavior. Only from IDLE: a turn in progress wins.
    if agent.status().await != AgentStatus::Idle {
        return;
    }

    let behavior = &agent.config().behavior;
    let idle = agent.idle_for().await;
    let in_proactive_window = idle > Duration::from_secs(behavior.proactive_idle_min_secs)
        && idle < Duration::from_secs(behavior.proactive_idle_max_secs);

    if in_proactive_window && hormones.reward > agent.config().hormones.reward_threshold {
        run_proactive(agent).await;
    } else if idle > Duration::from_secs(behavior.dream_idle_min_secs)
        && hormones.stress < behavior.dream_stress_threshold
    {
        run_dream(agent).await;
    }
}

/// Self-initiated message. Non-streaming; a generator failure just logs.
pub async fn run_proactive(agent: &Arc<SomaAgent>) {
    agent.set_status(AgentStatus::Proactive).await;
    agent.broadcast(AgentEvent::Log("initiating conversation".to_string()));

    let last_fact = agent.last_fact().await;
    let prompt = prompts::proactive_prompt(last_fact.as_deref());

    match agent
        .generator()
        .generate(prompts::PROACTIVE_SYSTEM, &prompt, GenOptions::fast())
        .await
    {
        Ok(message) if !message.trim().is_empty() => {
            let message = message.trim().to_string();
            agent.memory().append_turn(Role::Agent, message.clone()).await;
            agent.broadcast(AgentEvent::Message(message));
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("proactive generation failed: {}", e),
    }

    agent.touch().await;
    agent.set_status(AgentStatus::Idle).await;
}
