pub mod agent;
pub mod dream;
pub mod interrupt;
pub mod lifecycle;
pub mod status;

pub use agent::{SomaAgent, TurnEvent, FALLBACK_REPLY};
pub use interrupt::InterruptToken;
pub use lifecycle::spawn_lifecycle;
pub use status::{AgentEvent, AgentStatus, ProfileSummary, StatusSnapshot};
