pub mod extraction;
pub mod llm;
pub mod ollama;
pub mod prompts;

pub use extraction::{extract_profile_facts, ExtractedProfile};
pub use llm::{summarize, GenOptions, ModelTier, StreamEvent, TextGenerator};
pub use ollama::OllamaClient;
