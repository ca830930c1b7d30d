//! Engine configuration

use mkt_document::NormalizerConfig;
use serde::{Deserialize, Serialize};

/// How an update lands in a version chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Merge into the existing document in place
    #[default]
    Mutate,
    /// Write a new version and deactivate the old one
    Fork,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Mode used when an update does not ask for one
    pub default_update_mode: UpdateMode,
    /// Persist the fix when a read finds several active versions
    pub repair_on_read: bool,
    /// Upper bound on parent hops when walking towards the brand
    pub max_hierarchy_depth: usize,
    /// Actor recorded for writes the engine makes on its own behalf
    pub system_actor: String,
    /// Read-time repair settings
    pub normalizer: NormalizerConfig,
}

impl EngineConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_default_update_mode(mut self, mode: UpdateMode) -> Self {
        self.default_update_mode = mode;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_repair_on_read(mut self, repair: bool) -> Self {
        self.repair_on_read = repair;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_hierarchy_depth(mut self, depth: usize) -> Self {
        self.max_hierarchy_depth = depth;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_system_actor(mut self, actor: impl Into<String>) -> Self {
        self.system_actor = actor.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_update_mode: UpdateMode::Mutate,
            repair_on_read: true,
            max_hierarchy_depth: 8,
            system_actor: "system".to_string(),
            normalizer: NormalizerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"default_update_mode": "fork", "max_hierarchy_depth": 3}"#).unwrap();
        assert_eq!(config.default_update_mode, UpdateMode::Fork);
        assert_eq!(config.max_hierarchy_depth, 3);
        assert!(config.repair_on_read);
        assert_eq!(config.system_actor, "system");
    }

    #[test]
    fn builders_override() {
        let config = EngineConfig::new()
            .with_repair_on_read(false)
            .with_system_actor("scheduler");
        assert!(!config.repair_on_read);
        assert_eq!(config.system_actor, "scheduler");
    }
}
