//! Status snapshot and broadcast event types.

use serde::{Deserialize, Serialize};
use soma_core::hormone::{Diagnostics, HormoneState};
use soma_memory::MemoryStats;

/// What the orchestrator is actually doing right now (as opposed to the
/// hormone engine's advisory [`soma_core::AgentState`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentStatus {
    Idle,
    Thinking,
    Proactive,
    Dreaming,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Idle => "IDLE",
            AgentStatus::Thinking => "THINKING",
            AgentStatus::Proactive => "PROACTIVE",
            AgentStatus::Dreaming => "DREAMING",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub name: String,
    pub fact_count: usize,
}

/// Full state snapshot exposed to the surrounding service and carried by
/// the periodic broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub agent_status: AgentStatus,
    pub hormones: HormoneState,
    pub diagnostics: Diagnostics,
    pub memory: MemoryStats,
    pub profile: ProfileSummary,
}

/// Events published on the agent's broadcast channel.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Periodic status update (once per life-cycle tick).
    Status(StatusSnapshot),
    /// Human-readable life-cycle log line (dreams, evolve, retrieval hits).
    Log(String),
    /// Inner-voice side channel emitted during some chat turns.
    Thought(String),
    /// A self-initiated (proactive) message to the user.
    Message(String),
}
