//! The dream path.
//!
//! A self-generated reflection: pick a topic from the current stress level,
//! ask the fast model for a short creative scene, and feed the result
//! straight into the consolidation queue, bypassing the buffer-overflow
//! path. One consolidation step runs immediately so the dream lands in
//! long-term memory while it is fresh.

use crate::agent::SomaAgent;
use crate::status::{AgentEvent, AgentStatus};
use soma_reasoning::{prompts, GenOptions, StreamEvent};
use std::sync::Arc;

pub async fn run_dream(agent: &Arc<SomaAgent>) {
    agent.set_status(AgentStatus::Dreaming).await;
    agent.broadcast(AgentEvent::Log("entering dream state".to_string()));
    // A user turn arriving mid-dream re-sets this and aborts us.
    agent.interrupt_token().clear();

    let stress = agent.hormone_stress().await;
    let topic = prompts::dream_topic(stress);
    tracing::info!(topic, "dreaming");

    let mut stream = match agent
        .generator()
        .stream_generate(
            prompts::DREAM_SYSTEM,
            &prompts::dream_prompt(topic),
            GenOptions::fast(),
        )
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("dream generation failed: {}", e);
            agent.set_status(AgentStatus::Idle).await;
            return;
        }
    };

    let mut dream = String::new();
    while let Some(event) = stream.recv().await {
        match event {
            StreamEvent::Fragment(fragment) => {
                if agent.interrupt_token().is_interrupted() {
                    tracing::debug!("dream interrupted");
                    agent.broadcast(AgentEvent::Log("dream interrupted".to_string()));
                    agent.set_status(AgentStatus::Idle).await;
                    return;
                }
                dream.push_str(&fragment);
            }
            StreamEvent::Error(e) => {
                tracing::warn!("dream stream aborted: {}", e);
                agent.set_status(AgentStatus::Idle).await;
                return;
            }
            StreamEvent::Done => break,
        }
    }

    if !dream.trim().is_empty() {
        let text = format!("Dream ({}): {}", topic, dream.trim());
        agent.memory().push_raw(text).await;
        if let Err(e) = agent.memory().consolidate_one(agent.summarizer()).await {
            tracing::error!("dream consolidation failed: {}", e);
        }
    }

    agent.broadcast(AgentEvent::Log("dream finished".to_string()));
    agent.set_status(AgentStatus::Idle).await;
}
