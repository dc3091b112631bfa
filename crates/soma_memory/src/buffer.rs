//! Short-term conversation buffer and consolidation queue.
//!
//! The buffer is the recent-turn window injected directly into prompts.
//! When it overflows, the oldest turn is not lost; it moves to the
//! consolidation queue to await summarization into long-term memory, in
//! the order it was spoken.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Agent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Agent => write!(f, "Agent"),
        }
    }
}

/// One conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    /// Render as "Role: text" for prompts and consolidation.
    pub fn render(&self) -> String {
        format!("{}: {}", self.role, self.text)
    }
}

/// Bounded FIFO window of recent turns.
#[derive(Debug, Clone)]
pub struct ShortTermBuffer {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl ShortTermBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
        }
    }

    /// Push a turn; if the buffer is over capacity afterwards, the oldest
    /// turn is popped and returned so the caller can queue it.
    pub fn push(&mut self, turn: Turn) -> Option<Turn> {
        self.turns.push_back(turn);
        if self.turns.len() > self.capacity {
            self.turns.pop_front()
        } else {
            None
        }
    }

    /// The last `n` turns joined by newlines, oldest first.
    pub fn recent_context(&self, n: usize) -> String {
        let skip = self.turns.len().saturating_sub(n);
        self.turns
            .iter()
            .skip(skip)
            .map(Turn::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }
}

/// FIFO queue of rendered text awaiting consolidation.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationQueue {
    items: VecDeque<String>,
}

impl ConsolidationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: String) {
        self.items.push_back(text);
    }

    pub fn pop(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
