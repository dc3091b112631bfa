//! Homeostatic hormone engine
//!
//! Instead of discrete mood labels, behavior is modulated by a continuous
//! 3-D state: stress, reward, stability, each in [0, 1]. Every update first
//! decays toward a configured baseline, then applies an event-driven delta,
//! then clamps. The engine proposes (but never enforces) behavioral-state
//! transitions; the orchestrator decides what to do with them.

use crate::config::HormoneConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of snapshots kept in the engine's history.
pub const HORMONE_HISTORY_CAP: usize = 100;

/// Behavioral state suggested by the hormone engine.
///
/// This is advisory: the orchestrator may be occupied with something else
/// when a suggestion is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentState {
    Idle,
    Thinking,
    Proactive,
    Dreaming,
    /// High stress, low stability: grow capacity.
    Expand,
    /// High stress, adequate stability: trim capacity.
    Prune,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentState::Idle => "IDLE",
            AgentState::Thinking => "THINKING",
            AgentState::Proactive => "PROACTIVE",
            AgentState::Dreaming => "DREAMING",
            AgentState::Expand => "EXPAND",
            AgentState::Prune => "PRUNE",
        };
        write!(f, "{}", s)
    }
}

/// The 3-D homeostatic state. Invariant: every field is in [0, 1] after
/// every update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HormoneState {
    pub stress: f32,
    pub reward: f32,
    pub stability: f32,
}

impl HormoneState {
    pub fn new(stress: f32, reward: f32, stability: f32) -> Self {
        Self {
            stress: stress.clamp(0.0, 1.0),
            reward: reward.clamp(0.0, 1.0),
            stability: stability.clamp(0.0, 1.0),
        }
    }

    /// Round to 3 decimals for display/broadcast payloads.
    pub fn rounded(&self) -> Self {
        let r = |v: f32| (v * 1000.0).round() / 1000.0;
        Self {
            stress: r(self.stress),
            reward: r(self.reward),
            stability: r(self.stability),
        }
    }
}

/// Per-dimension deltas produced by [`HormoneEngine::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HormoneDeltas {
    pub stress: f32,
    pub reward: f32,
    pub stability: f32,
}

/// One history entry: the state right after an update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HormoneSnapshot {
    pub state: HormoneState,
    pub timestamp: i64,
}

/// Diagnostics exposed through the status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub current: HormoneState,
    pub suggested_state: AgentState,
    /// Self-assessment scalar in [-1, 1]. Computed every cycle but consumed
    /// by nothing yet; surfaced here so external observers can watch it.
    pub internal_validation: f32,
    pub history_length: usize,
}

/// The hormone engine. Not internally synchronized: callers must route all
/// mutations through a single owner (the orchestrator holds it behind a
/// lock), so that decay and delta application stay one indivisible step.
#[derive(Debug, Clone)]
pub struct HormoneEngine {
    state: HormoneState,
    config: HormoneConfig,
    history: VecDeque<HormoneSnapshot>,
}

impl HormoneEngine {
    pub fn new(config: HormoneConfig) -> Self {
        let state = HormoneState::new(
            config.stress_baseline,
            config.reward_baseline,
            config.stability_baseline,
        );
        tracing::info!(
            stress = state.stress,
            reward = state.reward,
            stability = state.stability,
            "hormone engine initialized"
        );
        Self {
            state,
            config,
            history: VecDeque::with_capacity(HORMONE_HISTORY_CAP),
        }
    }

    pub fn state(&self) -> HormoneState {
        self.state
    }

    pub fn config(&self) -> &HormoneConfig {
        &self.config
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Map a feedback signal in [-1, 1] to per-dimension deltas.
    ///
    /// Five exclusive bands; out-of-range input is clamped first. Boundary
    /// semantics are strict `<` between bands.
    pub fn evaluate(&self, signal: f32) -> HormoneDeltas {
        let signal = signal.clamp(-1.0, 1.0);

        if signal < -0.5 {
            HormoneDeltas {
                stress: signal.abs() * 0.8,
                reward: -0.2,
                stability: -0.15,
            }
        } else if signal < 0.0 {
            HormoneDeltas {
                stress: signal.abs() * 0.4,
                reward: -0.1,
                stability: -0.05,
            }
        } else if signal < 0.3 {
            HormoneDeltas {
                stress: -0.1,
                reward: 0.1,
                stability: 0.02,
            }
        } else if signal < 0.7 {
            HormoneDeltas {
                stress: -0.2,
                reward: signal * 0.6,
                stability: 0.08,
            }
        } else {
            HormoneDeltas {
                stress: -0.3,
                reward: signal * 0.8,
                stability: 0.15,
            }
        }
    }

    /// Decay toward baseline, apply deltas, clamp, record a snapshot.
    ///
    /// Decay and delta application are one indivisible operation; a zero
    /// delta is the life-cycle's pure-decay tick.
    pub fn update(&mut self, deltas: HormoneDeltas) -> HormoneState {
        let cfg = &self.config;
        let decay = |v: f32, baseline: f32| v + (baseline - v) * cfg.decay_rate;

        self.state.stress =
            (decay(self.state.stress, cfg.stress_baseline) + deltas.stress).clamp(0.0, 1.0);
        self.state.reward =
            (decay(self.state.reward, cfg.reward_baseline) + deltas.reward).clamp(0.0, 1.0);
        self.state.stability = (decay(self.state.stability, cfg.stability_baseline)
            + deltas.stability)
            .clamp(0.0, 1.0);

        self.history.push_back(HormoneSnapshot {
            state: self.state,
            timestamp: chrono::Utc::now().timestamp(),
        });
        while self.history.len() > HORMONE_HISTORY_CAP {
            self.history.pop_front();
        }

        self.state
    }

    /// Pure function of the current state and configured thresholds.
    ///
    /// Fixed evaluation order: stress dominates, then reward hunger, then
    /// stability, then the dreaming/idle split.
    pub fn suggest_transition(&self) -> AgentState {
        let s = &self.state;
        let cfg = &self.config;

        if s.stress > cfg.stress_threshold {
            return if s.stability < 0.4 {
                AgentState::Expand
            } else {
                AgentState::Prune
            };
        }

        if s.reward < cfg.reward_threshold {
            return AgentState::Proactive;
        }

        if s.stability > cfg.stability_threshold {
            return AgentState::Thinking;
        }

        if s.reward > 0.5 {
            AgentState::Dreaming
        } else {
            AgentState::Idle
        }
    }

    /// Self-assessment scalar: stability and reward argue for confidence,
    /// stress argues against. Clamped to [-1, 1].
    pub fn internal_validation_signal(&self) -> f32 {
        let s = &self.state;
        (s.stability * 0.5 + s.reward * 0.3 - s.stress * 0.4).clamp(-1.0, 1.0)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            current: self.state.rounded(),
            suggested_state: self.suggest_transition(),
            internal_validation: (self.internal_validation_signal() * 1000.0).round() / 1000.0,
            history_length: self.history.len(),
        }
    }
}

impl Default for HormoneEngine {
    fn default() -> Self {
        Self::new(HormoneConfig::default())
    }
}
