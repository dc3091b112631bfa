//! Keyword-based sentiment heuristics.
//!
//! Maps inbound text to a feedback scalar for the hormone engine. Kept in
//! core so the orchestrator and tests share one word list. A proper
//! classifier could replace this without touching the band table.

const NEGATIVE: &[&str] = &[
    "bad", "hate", "terrible", "angry", "awful", "horrible", "annoying", "worst",
];

const POSITIVE: &[&str] = &[
    "good", "love", "great", "happy", "wonderful", "amazing", "thanks", "thank you",
];

/// Derive a feedback signal in [-1, 1] from raw user text.
///
/// Any negative keyword wins (-0.7), otherwise any positive keyword (0.8),
/// otherwise a mildly positive default (0.1): merely being spoken to is a
/// small reward.
pub fn sentiment_signal(text: &str) -> f32 {
    let lower = text.to_lowercase();
    if NEGATIVE.iter().any(|w| lower.contains(w)) {
        -0.7
    } else if POSITIVE.iter().any(|w| lower.contains(w)) {
        0.8
    } else {
        0.1
    }
}
