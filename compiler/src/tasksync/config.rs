//! Task-sync pass configuration
//!
//! Loadable from JSON so a host pipeline can carry it alongside its own
//! settings. Every field has a default, so a partial document is accepted.

use super::error::{TaskSyncError, TaskSyncResult};
use super::paths::DEFAULT_MAX_PATHS;
use serde::{Deserialize, Serialize};

/// How callee names are recognised as cooperative-group operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Match the versioned intrinsic name table
    #[default]
    Intrinsics,
    /// Match keywords anywhere after the first byte of the name
    Substring,
}

/// Predicate deciding which group member runs a region in a given iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnGuard {
    /// `(rank & size) == 0`; independent of the iteration
    #[default]
    RankAndSize,
    /// `rank == iteration`
    RankEqualsIteration,
}

/// Configuration for the task-sync pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSyncConfig {
    /// Callee matching rule
    #[serde(default)]
    pub match_rule: MatchRule,

    /// Loop guard emitted in each region header
    #[serde(default)]
    pub turn_guard: TurnGuard,

    /// Upper bound on enumerated control-flow paths per function
    #[serde(default = "default_max_paths")]
    pub max_paths: usize,

    /// Run the IR verifier after each rewritten kernel
    #[serde(default = "default_verify_after")]
    pub verify_after: bool,

    /// Drop the sync calls once their loops are in place
    #[serde(default)]
    pub erase_sync_calls: bool,
}

fn default_max_paths() -> usize {
    DEFAULT_MAX_PATHS
}
fn default_verify_after() -> bool {
    true
}

impl Default for TaskSyncConfig {
    fn default() -> Self {
        Self {
            match_rule: MatchRule::default(),
            turn_guard: TurnGuard::default(),
            max_paths: default_max_paths(),
            verify_after: default_verify_after(),
            erase_sync_calls: false,
        }
    }
}

impl TaskSyncConfig {
    /// Substring matching and the rank/size guard, for output compatibility
    /// with existing pipelines
    pub fn legacy() -> Self {
        Self {
            match_rule: MatchRule::Substring,
            ..Self::default()
        }
    }

    /// Guard that hands each iteration to exactly one group member
    pub fn corrected() -> Self {
        Self {
            turn_guard: TurnGuard::RankEqualsIteration,
            ..Self::default()
        }
    }

    /// Parse from a JSON document
    pub fn from_json(json: &str) -> TaskSyncResult<Self> {
        serde_json::from_str(json).map_err(|e| TaskSyncError::Config(e.to_string()))
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> TaskSyncResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| TaskSyncError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let legacy = TaskSyncConfig::legacy();
        assert_eq!(legacy.match_rule, MatchRule::Substring);
        assert_eq!(legacy.turn_guard, TurnGuard::RankAndSize);

        let corrected = TaskSyncConfig::corrected();
        assert_eq!(corrected.match_rule, MatchRule::Intrinsics);
        assert_eq!(corrected.turn_guard, TurnGuard::RankEqualsIteration);
        assert!(corrected.verify_after);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            TaskSyncConfig::from_json(r#"{ "turn_guard": "rank_equals_iteration", "max_paths": 8 }"#)
                .unwrap();
        assert_eq!(config.turn_guard, TurnGuard::RankEqualsIteration);
        assert_eq!(config.max_paths, 8);
        assert_eq!(config.match_rule, MatchRule::Intrinsics);
        assert!(config.verify_after);
        assert!(!config.erase_sync_calls);
    }

    #[test]
    fn test_json_round_trip() {
        let config = TaskSyncConfig {
            erase_sync_calls: true,
            ..TaskSyncConfig::legacy()
        };
        let json = config.to_json().unwrap();
        assert!(json.contains("\"substring\""));
        assert_eq!(TaskSyncConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = TaskSyncConfig::from_json(r#"{ "turn_guard": "sometimes" }"#).unwrap_err();
        assert!(matches!(err, TaskSyncError::Config(_)));
    }
}
