pub mod config;
pub mod error;
pub mod hormone;
pub mod sentiment;

pub use config::{BehaviorConfig, HormoneConfig, LlmConfig, MemoryConfig, SomaConfig};
pub use error::SomaError;
pub use hormone::{
    AgentState, Diagnostics, HormoneDeltas, HormoneEngine, HormoneState, HORMONE_HISTORY_CAP,
};
pub use sentiment::sentiment_signal;
