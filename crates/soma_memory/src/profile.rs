//! Durable persona/fact store.
//!
//! Small enough to persist synchronously on every mutation: if the process
//! dies between turns, the profile is never more than one mutation stale.

use serde::{Deserialize, Serialize};
use soma_core::SomaError;
use std::collections::BTreeMap;
use std::path::PathBuf;

const DEFAULT_NAME: &str = "Nova";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    /// Learned user facts, insertion order, no duplicates.
    pub facts: Vec<String>,
    /// Any other keys callers choose to set.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            facts: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

pub struct ProfileStore {
    path: PathBuf,
    data: Profile,
}

impl ProfileStore {
    /// Load from disk, or start from the default persona. A corrupt file
    /// degrades to defaults with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "profile file corrupt ({}), using defaults", e);
                    Profile::default()
                }
            },
            Err(_) => Profile::default(),
        };
        Self { path, data }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn fact_count(&self) -> usize {
        self.data.facts.len()
    }

    pub fn facts(&self) -> &[String] {
        &self.data.facts
    }

    /// Set a key and persist before returning.
    pub fn update(&mut self, key: &str, value: &str) -> Result<(), SomaError> {
        if key == "name" {
            self.data.name = value.to_string();
        } else {
            self.data.extra.insert(key.to_string(), value.to_string());
        }
        self.save()
    }

    /// Record a fact and persist. No-op (and no write) if already present.
    pub fn add_fact(&mut self, fact: &str) -> Result<(), SomaError> {
        if self.data.facts.iter().any(|f| f == fact) {
            return Ok(());
        }
        self.data.facts.push(fact.to_string());
        self.save()
    }

    /// Identity line injected into every system prompt.
    pub fn core_prompt(&self) -> String {
        let facts = if self.data.facts.is_empty() {
            "none yet".to_string()
        } else {
            let skip = self.data.facts.len().saturating_sub(5);
            self.data.facts[skip..].join(", ")
        };
        format!("Your name is {}. Known user facts: {}.", self.data.name, facts)
    }

    fn save(&self) -> Result<(), SomaError> {
        let json = serde_json::to_string_pretty(&self.data)
            .map_err(|e| SomaError::Persistence(format!("serialize profile: {}", e)))?;
        std::fs::write(&self.path, json)
            .map_err(|e| SomaError::Persistence(format!("write {}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_profile() -> (tempfile::TempDir, ProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("profile.json"));
        (dir, store)
    }

    #[test]
    fn test_defaults() {
        let (_dir, store) = temp_profile();
        assert_eq!(store.name(), "Nova");
        assert_eq!(store.fact_count(), 0);
        assert_eq!(
            store.core_prompt(),
            "Your name is Nova. Known user facts: none yet."
        );
    }

    #[test]
    fn test_add_fact_dedup() {
        let (_dir, mut store) = temp_profile();
        store.add_fact("likes tea").unwrap();
        store.add_fact("likes tea").unwrap();
        assert_eq!(store.fact_count(), 1);
        assert_eq!(store.facts(), &["likes tea".to_string()]);
    }

    #[test]
    fn test_core_prompt_last_five_facts() {
        let (_dir, mut store) = temp_profile();
        for i in 0..7 {
            store.add_fact(&format!("fact {}", i)).unwrap();
        }
        let prompt = store.core_prompt();
        assert!(prompt.contains("fact 2"));
        assert!(prompt.contains("fact 6"));
        assert!(!prompt.contains("fact 1"));
    }

    #[test]
    fn test_update_name_and_extra_key() {
        let (_dir, mut store) = temp_profile();
        store.update("name", "Iris").unwrap();
        assert_eq!(store.name(), "Iris");
        store.update("favorite_color", "green").unwrap();
        assert_eq!(
            store.data.extra.get("favorite_color").map(String::as_str),
            Some("green")
        );
    }

    #[test]
    fn test_mutations_persist_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");

        {
            let mut store = ProfileStore::open(&path);
            store.update("name", "Iris").unwrap();
            store.add_fact("plays chess").unwrap();
        }

        let reopened = ProfileStore::open(&path);
        assert_eq!(reopened.name(), "Iris");
        assert_eq!(reopened.facts(), &["plays chess".to_string()]);
    }

    #[test]
    fn test_corrupt_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, "{{{").unwrap();
        let store = ProfileStore::open(&path);
        assert_eq!(store.name(), "Nova");
    }
}
