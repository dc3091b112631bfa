use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SomaConfig {
    pub llm: LlmConfig,
    pub hormones: HormoneConfig,
    pub memory: MemoryConfig,
    pub behavior: BehaviorConfig,
}

impl SomaConfig {
    /// Load config from a TOML file, falling back to defaults for missing
    /// fields. Env var overrides are applied after parsing.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: SomaConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file doesn't exist, return defaults with
    /// env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SOMA_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("SOMA_FAST_MODEL") {
            self.llm.fast_model = v;
        }
        if let Ok(v) = std::env::var("OLLAMA_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("SOMA_TEMPERATURE") {
            if let Ok(n) = v.parse() {
                self.llm.temperature = n;
            }
        }
        if let Ok(v) = std::env::var("SOMA_DB_PATH") {
            self.memory.db_path = v;
        }
        if let Ok(v) = std::env::var("SOMA_STORE_PATH") {
            self.memory.store_path = v;
        }
        if let Ok(v) = std::env::var("SOMA_PROFILE_PATH") {
            self.memory.profile_path = v;
        }
        if let Ok(v) = std::env::var("SOMA_TICK_SECS") {
            if let Ok(n) = v.parse() {
                self.behavior.tick_interval_secs = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Primary chat model.
    pub model: String,
    /// Lower-latency variant used for summaries, inner thoughts and dreams.
    pub fast_model: String,
    pub base_url: String,
    pub temperature: f32,
    pub fast_temperature: f32,
    pub context_window: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "neural-chat".to_string(),
            fast_model: "phi3:mini".to_string(),
            base_url: "http://localhost:11434".to_string(),
            temperature: 0.8,
            fast_temperature: 1.0,
            context_window: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HormoneConfig {
    pub stress_baseline: f32,
    pub reward_baseline: f32,
    pub stability_baseline: f32,
    /// Per-update fraction of the distance to baseline that is recovered.
    pub decay_rate: f32,
    pub stress_threshold: f32,
    pub reward_threshold: f32,
    pub stability_threshold: f32,
}

impl Default for HormoneConfig {
    fn default() -> Self {
        Self {
            stress_baseline: 0.1,
            reward_baseline: 0.5,
            stability_baseline: 0.7,
            decay_rate: 0.05,
            stress_threshold: 0.6,
            reward_threshold: 0.3,
            stability_threshold: 0.75,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Short-term buffer capacity in turns.
    pub buffer_capacity: usize,
    /// Neighbors requested per retrieval.
    pub top_k: usize,
    /// Maximum cosine distance for a retrieved memory to count as relevant.
    pub retrieval_threshold: f32,
    /// JSON file backing the linear-scan store.
    pub store_path: String,
    /// SQLite file backing the durable store.
    pub db_path: String,
    pub profile_path: String,
    /// Prefer the durable store; fall back to the linear store when it
    /// cannot be opened.
    pub durable: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10,
            top_k: 3,
            retrieval_threshold: 0.5,
            store_path: "soma_memory.json".to_string(),
            db_path: "soma.db".to_string(),
            profile_path: "profile.json".to_string(),
            durable: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub tick_interval_secs: u64,
    /// Idle window (min, max) within which a proactive turn may fire.
    pub proactive_idle_min_secs: u64,
    pub proactive_idle_max_secs: u64,
    pub dream_idle_min_secs: u64,
    /// Dreams only happen below this stress level.
    pub dream_stress_threshold: f32,
    pub evolve_cooldown_secs: u64,
    pub initial_complexity: u8,
    pub min_complexity: u8,
    pub max_complexity: u8,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 2,
            proactive_idle_min_secs: 30,
            proactive_idle_max_secs: 120,
            dream_idle_min_secs: 180,
            dream_stress_threshold: 0.4,
            evolve_cooldown_secs: 120,
            initial_complexity: 1,
            min_complexity: 1,
            max_complexity: 10,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = SomaConfig::default();
        assert_eq!(cfg.llm.model, "neural-chat");
        assert_eq!(cfg.memory.buffer_capacity, 10);
        assert!((cfg.hormones.decay_rate - 0.05).abs() < 1e-6);
        assert_eq!(cfg.behavior.tick_interval_secs, 2);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[llm]
model = "llama3"
"#;
        let cfg: SomaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.llm.model, "llama3");
        // Defaults for unspecified fields
        assert_eq!(cfg.llm.fast_model, "phi3:mini");
        assert_eq!(cfg.memory.top_k, 3);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[llm]
model = "llama3"
fast_model = "qwen2:0.5b"
base_url = "http://ollama:11434"
temperature = 0.5

[hormones]
stress_baseline = 0.2
decay_rate = 0.1
stress_threshold = 0.7

[memory]
buffer_capacity = 20
durable = false
db_path = "data/soma.db"

[behavior]
tick_interval_secs = 5
evolve_cooldown_secs = 60
"#;
        let cfg: SomaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.llm.base_url, "http://ollama:11434");
        assert!((cfg.hormones.stress_baseline - 0.2).abs() < 1e-6);
        assert_eq!(cfg.memory.buffer_capacity, 20);
        assert!(!cfg.memory.durable);
        assert_eq!(cfg.behavior.evolve_cooldown_secs, 60);
        // Untouched sections keep defaults
        assert!((cfg.hormones.reward_baseline - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("SOMA_MODEL", "mistral");
        std::env::set_var("SOMA_TICK_SECS", "7");

        let mut cfg = SomaConfig::default();
        cfg.apply_env_overrides();

        assert_eq!(cfg.llm.model, "mistral");
        assert_eq!(cfg.behavior.tick_interval_secs, 7);

        std::env::remove_var("SOMA_MODEL");
        std::env::remove_var("SOMA_TICK_SECS");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let cfg = SomaConfig::load_or_default("/nonexistent/soma.toml");
        assert_eq!(cfg.memory.profile_path, "profile.json");
    }
}
