//! Scenario files: a fixture, an optional config and a list of steps run in
//! order against one engine.
//!
//! ```json
//! {
//!   "areas": { "lab": ["A", "B", "C"] },
//!   "rules": [],
//!   "steps": [
//!     { "op": "lock", "deviceId": "A", "lockType": "BUSINESS", "holder": "alice" },
//!     { "op": "areaMode", "areaId": "lab", "mode": "LOCKDOWN", "operator": "ops" },
//!     { "op": "wait", "ms": 1500 },
//!     { "op": "status", "deviceIds": ["A", "B"] },
//!     { "op": "executions", "deviceId": "A", "limit": 10 }
//!   ]
//! }
//! ```

use interlock_core::error::{InterlockError, InterlockResult};
use interlock_core::{EngineConfig, InterlockTrigger, LockRequest};
use interlock_engine::InterlockEngine;
use interlock_provider::Fixture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(flatten)]
    pub fixture: Fixture,
    #[serde(default)]
    pub config: Option<EngineConfig>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json_str(raw: &str) -> InterlockResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| InterlockError::Validation(format!("invalid scenario: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> InterlockResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            InterlockError::Config(format!("failed to read scenario '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    Lock(LockRequest),
    Release {
        device_id: String,
        holder: String,
    },
    ForceRelease {
        device_id: String,
        reason: String,
        operator: String,
    },
    Status {
        device_ids: Vec<String>,
    },
    Trigger(InterlockTrigger),
    AreaMode {
        area_id: String,
        mode: String,
        #[serde(default)]
        reason: String,
        #[serde(default)]
        operator: String,
    },
    AreaStatus {
        area_id: String,
    },
    Preview(InterlockTrigger),
    Wait {
        ms: u64,
    },
    Executions {
        #[serde(default)]
        device_id: Option<String>,
        #[serde(default)]
        success: Option<bool>,
        #[serde(default = "default_page_size")]
        limit: usize,
    },
    Cleanup,
    Statistics,
}

fn default_page_size() -> usize {
    50
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Lock(_) => "lock",
            Step::Release { .. } => "release",
            Step::ForceRelease { .. } => "forceRelease",
            Step::Status { .. } => "status",
            Step::Trigger(_) => "trigger",
            Step::AreaMode { .. } => "areaMode",
            Step::AreaStatus { .. } => "areaStatus",
            Step::Preview(_) => "preview",
            Step::Wait { .. } => "wait",
            Step::Executions { .. } => "executions",
            Step::Cleanup => "cleanup",
            Step::Statistics => "statistics",
        }
    }
}

/// Outcome of one step. Errors are recorded, not propagated, so the rest of
/// the scenario still runs.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: usize,
    pub op: &'static str,
    pub ok: bool,
    pub result: Value,
}

pub async fn run_steps(engine: &InterlockEngine, steps: &[Step]) -> Vec<StepRecord> {
    let mut records = Vec::with_capacity(steps.len());

    for (idx, step) in steps.iter().enumerate() {
        let (ok, result) = match run_step(engine, step).await {
            Ok(value) => (true, value),
            Err(e) => {
                tracing::warn!(step = idx, op = step.name(), error = %e, "step failed");
                (false, json!({ "error": e.to_string(), "retryable": e.is_retryable() }))
            }
        };
        tracing::debug!(step = idx, op = step.name(), ok, "step done");
        records.push(StepRecord {
            step: idx,
            op: step.name(),
            ok,
            result,
        });
    }
    records
}

async fn run_step(engine: &InterlockEngine, step: &Step) -> InterlockResult<Value> {
    let value = match step {
        Step::Lock(request) => to_value(&engine.request_lock(request.clone()).await?)?,
        Step::Release { device_id, holder } => {
            json!({ "success": engine.release_lock(device_id, holder)? })
        }
        Step::ForceRelease {
            device_id,
            reason,
            operator,
        } => json!({ "success": engine.force_release_lock(device_id, reason, operator).await? }),
        Step::Status { device_ids } => to_value(&engine.batch_lock_status(device_ids.as_slice())?)?,
        Step::Trigger(trigger) => to_value(&engine.process_trigger(trigger.clone()).await?)?,
        Step::AreaMode {
            area_id,
            mode,
            reason,
            operator,
        } => to_value(&engine.set_area_mode(area_id, mode, reason, operator).await?)?,
        Step::AreaStatus { area_id } => to_value(&engine.area_lock_status(area_id).await?)?,
        Step::Preview(trigger) => to_value(&engine.preview_trigger(trigger).await?)?,
        Step::Wait { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            json!({ "waitedMs": ms })
        }
        Step::Executions {
            device_id,
            success,
            limit,
        } => to_value(&engine.executions(device_id.as_deref(), *success, *limit))?,
        Step::Cleanup => {
            let summary = engine.cleanup().await;
            json!({ "releasedCount": summary.released })
        }
        Step::Statistics => to_value(&engine.statistics())?,
    };
    Ok(value)
}

fn to_value<T: Serialize>(value: &T) -> InterlockResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| InterlockError::Internal(format!("failed to serialize step result: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use interlock_provider::MemoryAuditSink;
    use std::sync::Arc;

    const SCENARIO: &str = r#"{
        "areas": { "lab": ["A", "B", "C"] },
        "rules": [
            {
                "ruleId": "seal-lab",
                "priority": 3,
                "condition": { "triggerType": "AREA_INTERLOCK", "areaId": "lab" },
                "actions": [ { "target": { "area": "lab" }, "action": "LOCK" } ]
            }
        ],
        "config": { "sweepIntervalMs": 50 },
        "steps": [
            { "op": "lock", "deviceId": "C", "lockType": "SAFETY", "holder": "fire-system", "priority": 1 },
            { "op": "trigger", "triggerId": "t-1", "triggerType": "AREA_INTERLOCK", "affectedAreaId": "lab" },
            { "op": "status", "deviceIds": ["A", "B", "C"] },
            { "op": "release", "deviceId": "C", "holder": "bob" },
            { "op": "forceRelease", "deviceId": "C", "reason": "", "operator": "ops" },
            { "op": "cleanup" },
            { "op": "executions", "deviceId": "C", "success": false }
        ]
    }"#;

    #[test]
    fn parses_all_step_shapes() {
        let scenario = Scenario::from_json_str(SCENARIO).unwrap();
        assert_eq!(scenario.fixture.rules.len(), 1);
        assert_eq!(scenario.config.unwrap().sweep_interval_ms, 50);
        let ops: Vec<_> = scenario.steps.iter().map(Step::name).collect();
        assert_eq!(
            ops,
            vec!["lock", "trigger", "status", "release", "forceRelease", "cleanup", "executions"]
        );
    }

    #[test]
    fn bundled_scenario_parses() {
        let scenario =
            Scenario::from_json_str(include_str!("../../../scenarios/lab-lockdown.json")).unwrap();
        assert_eq!(scenario.fixture.rule_store().unwrap().len(), 2);
        assert_eq!(scenario.steps.len(), 16);
    }

    #[tokio::test]
    async fn runs_steps_and_records_failures() {
        let scenario = Scenario::from_json_str(SCENARIO).unwrap();
        let engine = InterlockEngine::new(
            scenario.config.clone().unwrap_or_default(),
            Arc::new(scenario.fixture.rule_store().unwrap()),
            Arc::new(scenario.fixture.topology()),
            Arc::new(MemoryAuditSink::new()),
        )
        .unwrap();

        let records = run_steps(&engine, &scenario.steps).await;
        assert_eq!(records.len(), 7);
        assert!(records[0].ok);
        assert_eq!(records[1].result["overallSuccess"], false);
        assert_eq!(records[2].result[0]["status"], "UNLOCKED");
        assert_eq!(records[2].result[2]["holder"], "fire-system");
        assert_eq!(records[3].result["success"], false);
        assert!(!records[4].ok);
        assert_eq!(records[5].result["releasedCount"], 0);
        assert_eq!(records[6].result[0]["triggerId"], "t-1");
        assert_eq!(records[6].result[0]["blockedBy"][0], "C");
    }
}
