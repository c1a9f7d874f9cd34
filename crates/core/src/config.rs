//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{InterlockError, InterlockResult};
use crate::types::DEFAULT_PRIORITY;

/// Thresholds used when deriving `healthy` and the health warnings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthPolicy {
    /// Unhealthy once `expired_locks / device_lock_count` exceeds this.
    pub max_expired_ratio: f64,
    pub active_lock_warning: u64,
    pub expired_lock_warning: u64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            max_expired_ratio: 0.3,
            active_lock_warning: 1000,
            expired_lock_warning: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub sweep_interval_ms: u64,
    pub default_priority: i32,
    /// Holder recorded for rule-driven locks when a trigger names no operator.
    pub system_actor: String,
    /// Whether stats-only operation is offered while the rule store is down.
    pub fallback_enabled: bool,
    /// Trigger executions kept in memory; the oldest are evicted first.
    pub max_executions: usize,
    pub health: HealthPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1000,
            default_priority: DEFAULT_PRIORITY,
            system_actor: "interlock-engine".to_string(),
            fallback_enabled: true,
            max_executions: 500,
            health: HealthPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> InterlockResult<Self> {
        let config: EngineConfig = serde_json::from_str(raw)
            .map_err(|e| InterlockError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> InterlockResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            InterlockError::Config(format!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn validate(&self) -> InterlockResult<()> {
        if self.sweep_interval_ms == 0 {
            return Err(InterlockError::Config(
                "sweepIntervalMs must be greater than zero".into(),
            ));
        }
        if self.max_executions == 0 {
            return Err(InterlockError::Config(
                "maxExecutions must be greater than zero".into(),
            ));
        }
        if self.system_actor.trim().is_empty() {
            return Err(InterlockError::Config("systemActor must not be empty".into()));
        }
        let ratio = self.health.max_expired_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(InterlockError::Config(format!(
                "health.maxExpiredRatio must be within [0, 1], got {ratio}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.default_priority, 5);
    }

    #[test]
    fn partial_override() {
        let config =
            EngineConfig::from_json_str(r#"{"sweepIntervalMs": 250, "health": {"expiredLockWarning": 5}}"#)
                .unwrap();
        assert_eq!(config.sweep_interval_ms, 250);
        assert_eq!(config.health.expired_lock_warning, 5);
        assert_eq!(config.health.active_lock_warning, 1000);
    }

    #[test]
    fn rejects_zero_interval() {
        let err = EngineConfig::from_json_str(r#"{"sweepIntervalMs": 0}"#).unwrap_err();
        assert!(matches!(err, InterlockError::Config(_)));
    }

    #[test]
    fn rejects_empty_execution_history() {
        let err = EngineConfig::from_json_str(r#"{"maxExecutions": 0}"#).unwrap_err();
        assert!(matches!(err, InterlockError::Config(_)));
        assert_eq!(EngineConfig::default().max_executions, 500);
    }

    #[test]
    fn rejects_ratio_out_of_range() {
        let mut config = EngineConfig::default();
        config.health.max_expired_ratio = 1.5;
        assert!(config.validate().is_err());
    }
}
