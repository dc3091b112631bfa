//! Prompt assembly.
//!
//! Pure functions from (hormone state, complexity, profile, memories) to
//! prompt strings, so every branch is unit-testable without a model.

use soma_core::hormone::HormoneState;

const BASE_INSTRUCTION: &str = "You are a helpful AI assistant.";

/// Build the system prompt from the organism's current disposition.
///
/// Exactly one mood bracket is appended: stress dominates, then euphoria,
/// then calm; none when nothing matches.
pub fn build_system_prompt(hormones: &HormoneState, complexity: u8) -> String {
    let mut prompt = String::from(BASE_INSTRUCTION);

    if complexity > 5 {
        prompt.push_str(" Think deeply and provide detailed, nuanced answers.");
    } else {
        prompt.push_str(" Be concise and direct.");
    }

    if hormones.stress > 0.7 {
        prompt.push_str(
            " [STATE: STRESSED] You are currently irritated. Keep answers short and slightly defensive.",
        );
    } else if hormones.reward > 0.7 {
        prompt.push_str(" [STATE: EUPHORIC] You are excited and very helpful!");
    } else if hormones.stress < 0.3 && hormones.reward > 0.4 {
        prompt.push_str(" [STATE: CALM] You are balanced and reflective.");
    }

    prompt
}

/// Full system prompt for a chat turn: disposition + identity + retrieved
/// context.
pub fn assemble_chat_system(
    hormones: &HormoneState,
    complexity: u8,
    core_identity: &str,
    memories: &[String],
) -> String {
    let context = memories
        .iter()
        .map(|m| format!("[Memory] {}", m))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n{}\nCONTEXT:\n{}",
        build_system_prompt(hormones, complexity),
        core_identity,
        context
    )
}

/// Prompt for a proactive one-liner, anchored on the freshest known fact
/// when there is one.
pub fn proactive_prompt(last_fact: Option<&str>) -> String {
    match last_fact {
        Some(fact) => format!("Ask a follow-up about {}. One sentence.", fact),
        None => "Ask a friendly question to learn about the user. One sentence.".to_string(),
    }
}

pub const PROACTIVE_SYSTEM: &str = "You are curious and friendly.";

/// Dream topic chosen from current stress level.
pub fn dream_topic(stress: f32) -> &'static str {
    if stress < 0.5 {
        "a futuristic city"
    } else {
        "handling a difficult error"
    }
}

pub fn dream_prompt(topic: &str) -> String {
    format!("Describe a scene about {}.", topic)
}

pub const DREAM_SYSTEM: &str = "You are dreaming. Be creative.";

/// Prompt for the inner-thought side channel.
pub fn thought_prompt(user_text: &str) -> String {
    format!("Think briefly about: '{}'", user_text)
}

pub const THOUGHT_SYSTEM: &str = "One short inner voice sentence.";
