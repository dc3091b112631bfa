//! Profile fact extraction: a best-effort fast-model call that pulls a
//! user-declared name and concrete preferences out of an inbound message.
//!
//! Runs fire-and-forget alongside the main reply path; ordering relative to
//! the reply is explicitly not guaranteed. Any failure degrades to "nothing
//! extracted".

use crate::llm::{GenOptions, TextGenerator};
use anyhow::Result;
use serde::Deserialize;

/// What the extractor found. Either field may be absent.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ExtractedProfile {
    pub new_name: Option<String>,
    pub preference: Option<String>,
}

const EXTRACTION_SYSTEM_PROMPT: &str = "You are an information extraction module. \
Reply with JSON only, no prose.";

/// Names that are greetings or pronouns, not introductions.
const NAME_JUNK: &[&str] = &["hello", "hi", "hey", "you", "ai", "nova"];

/// Generic labels that mean the model extracted nothing concrete.
const PREFERENCE_JUNK: &[&str] = &["user preference", "name change", "fact", "preference"];

fn extraction_prompt(text: &str) -> String {
    format!(
        "TEXT: \"{}\"\n\n\
         INSTRUCTION:\n\
         1. Extract ONLY concrete persona facts (hobbies, preferences, job, age, specific interests).\n\
         2. Extract ONLY the name if the user explicitly introduces themselves.\n\
         3. If they just say 'Hi' or 'Hello', do NOT extract a name.\n\
         4. Do NOT use generic labels like 'user preference'.\n\
         5. If nothing is found, return nulls.\n\n\
         OUTPUT FORMAT: JSON\n\
         {{\"new_name\": string or null, \"preference\": string or null}}",
        text
    )
}

/// Extract profile facts from an inbound message.
///
/// Never fails: extraction errors are logged and produce an empty result.
pub async fn extract_profile_facts(
    generator: &dyn TextGenerator,
    text: &str,
) -> ExtractedProfile {
    match extract_inner(generator, text).await {
        Ok(extracted) => extracted,
        Err(e) => {
            tracing::warn!("fact extraction failed (non-fatal): {}", e);
            ExtractedProfile::default()
        }
    }
}

async fn extract_inner(generator: &dyn TextGenerator, text: &str) -> Result<ExtractedProfile> {
    // Greetings and one-word messages carry no facts.
    if text.trim().len() < 5 {
        return Ok(ExtractedProfile::default());
    }

    let opts = GenOptions {
        temperature: Some(0.1),
        ..GenOptions::fast()
    };
    let response = generator
        .generate(EXTRACTION_SYSTEM_PROMPT, &extraction_prompt(text), opts)
        .await?;

    Ok(filter_extracted(parse_extraction(&response)))
}

/// Parse the model output, tolerating markdown fences and surrounding prose.
fn parse_extraction(text: &str) -> ExtractedProfile {
    let trimmed = text.trim();

    if let Ok(extracted) = serde_json::from_str::<ExtractedProfile>(trimmed) {
        return extracted;
    }

    // JSON embedded in a code block or prose: take the outermost braces.
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(extracted) = serde_json::from_str::<ExtractedProfile>(&trimmed[start..=end])
            {
                return extracted;
            }
        }
    }

    tracing::debug!("could not parse extraction response: {}", trimmed);
    ExtractedProfile::default()
}

/// Drop junk names and vacuous preferences.
fn filter_extracted(mut extracted: ExtractedProfile) -> ExtractedProfile {
    if let Some(name) = extracted.new_name.take() {
        let name = name.trim().to_string();
        let lower = name.to_lowercase();
        if name.chars().count() >= 2 && !NAME_JUNK.contains(&lower.as_str()) {
            extracted.new_name = Some(name);
        }
    }

    if let Some(pref) = extracted.preference.take() {
        let pref = pref.trim().to_string();
        let lower = pref.to_lowercase();
        let junky = PREFERENCE_JUNK.iter().any(|j| lower.contains(j));
        if pref.chars().count() >= 5 && !junky {
            extracted.preference = Some(pref);
        }
    }

    extracted
}
