//! `InterlockEngine`: the operation surface offered to operators and
//! automation pipelines.

use chrono::Utc;
use interlock_core::error::{InterlockError, InterlockResult};
use interlock_core::types::{require_id, DATA_MODE, DATA_OPERATOR, DATA_REASON};
use interlock_core::{
    AreaMode, AuditEvent, EngineConfig, InterlockTrigger, LockRequest, LockStatus, PlannedAction,
    TriggerType,
};
use interlock_provider::{AreaTopology, AuditSink, RuleStore};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::coordinator::{AreaCoordinator, BatchActor, BatchOutcome};
use crate::evaluator::RuleEvaluator;
use crate::history::{ExecutionLog, ExecutionRecord};
use crate::registry::{AcquireOutcome, LockRegistry};
use crate::stats::{HealthReport, StatisticsCollector, StatisticsSnapshot};
use crate::sweeper::{ExpirySweeper, SweepSummary, SweeperHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcquireStatus {
    Granted,
    Upgraded,
    Preempted,
    AlreadyHeld,
    Denied,
}

/// Answer to `request_lock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockResponse {
    pub granted: bool,
    pub status: AcquireStatus,
    /// Present when the request was not granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_holder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preempted_holder: Option<String>,
}

impl From<&AcquireOutcome> for LockResponse {
    fn from(outcome: &AcquireOutcome) -> Self {
        let (status, preempted_holder) = match outcome {
            AcquireOutcome::Granted(_) => (AcquireStatus::Granted, None),
            AcquireOutcome::Upgraded { .. } => (AcquireStatus::Upgraded, None),
            AcquireOutcome::Preempted { previous, .. } => {
                (AcquireStatus::Preempted, Some(previous.holder.clone()))
            }
            AcquireOutcome::AlreadyHeld(_) => (AcquireStatus::AlreadyHeld, None),
            AcquireOutcome::Denied(_) => (AcquireStatus::Denied, None),
        };
        let granted = outcome.granted();
        Self {
            granted,
            status,
            current_holder: (!granted).then(|| outcome.current_holder().to_string()),
            preempted_holder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaLockStatus {
    pub area_id: String,
    pub total_devices: usize,
    pub locked_devices: Vec<String>,
    pub lock_ratio: f64,
}

/// One planned action checked against current lock state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStep {
    #[serde(flatten)]
    pub action: PlannedAction,
    pub would_succeed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_holder: Option<String>,
}

pub struct InterlockEngine {
    config: EngineConfig,
    stats: Arc<StatisticsCollector>,
    registry: Arc<LockRegistry>,
    evaluator: RuleEvaluator,
    coordinator: AreaCoordinator,
    sweeper: Arc<ExpirySweeper>,
    executions: ExecutionLog,
    topology: Arc<dyn AreaTopology>,
    audit: Arc<dyn AuditSink>,
}

impl InterlockEngine {
    pub fn new(
        config: EngineConfig,
        rules: Arc<dyn RuleStore>,
        topology: Arc<dyn AreaTopology>,
        audit: Arc<dyn AuditSink>,
    ) -> InterlockResult<Self> {
        config.validate()?;

        let stats = Arc::new(StatisticsCollector::new(
            config.health.clone(),
            config.fallback_enabled,
        ));
        let registry = Arc::new(LockRegistry::new(stats.clone()));
        let evaluator = RuleEvaluator::new(rules, topology.clone(), config.default_priority);
        let coordinator = AreaCoordinator::new(registry.clone());
        let sweeper = Arc::new(ExpirySweeper::new(
            registry.clone(),
            audit.clone(),
            config.sweep_interval(),
        ));
        let executions = ExecutionLog::new(config.max_executions);

        tracing::info!(
            sweep_interval_ms = config.sweep_interval_ms,
            default_priority = config.default_priority,
            system_actor = %config.system_actor,
            "interlock engine ready"
        );
        Ok(Self {
            config,
            stats,
            registry,
            evaluator,
            coordinator,
            sweeper,
            executions,
            topology,
            audit,
        })
    }

    pub fn registry(&self) -> &Arc<LockRegistry> {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Single-device operations
    // -----------------------------------------------------------------------

    pub async fn request_lock(&self, request: LockRequest) -> InterlockResult<LockResponse> {
        let outcome = self.registry.acquire(&request, Utc::now())?;
        let response = LockResponse::from(&outcome);
        if let AcquireOutcome::Preempted { audit, .. } = outcome {
            self.emit(vec![audit]).await;
        }
        Ok(response)
    }

    pub fn release_lock(&self, device_id: &str, holder: &str) -> InterlockResult<bool> {
        self.registry.release(device_id, holder)
    }

    /// Always `true` once the input is valid; an unlocked device is a no-op.
    pub async fn force_release_lock(
        &self,
        device_id: &str,
        reason: &str,
        operator: &str,
    ) -> InterlockResult<bool> {
        require_id("reason", reason)?;
        require_id("operator", operator)?;

        if let Some(event) = self
            .registry
            .force_release(device_id, reason, operator, Utc::now())?
        {
            self.emit(vec![event]).await;
        }
        Ok(true)
    }

    pub fn lock_status(&self, device_id: &str) -> InterlockResult<LockStatus> {
        self.registry.status(device_id)
    }

    pub fn batch_lock_status<S: AsRef<str>>(&self, device_ids: &[S]) -> InterlockResult<Vec<LockStatus>> {
        device_ids
            .iter()
            .map(|id| self.registry.status(id.as_ref()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Rule-driven operations
    // -----------------------------------------------------------------------

    /// Evaluates the trigger and applies the plan as one batch. Fails closed
    /// when a collaborator is unreachable: no lock is touched. Every call,
    /// failed or not, lands in the execution history.
    pub async fn process_trigger(&self, trigger: InterlockTrigger) -> InterlockResult<BatchOutcome> {
        let actor = self.actor_for(&trigger);
        let result = self.run_trigger(&trigger, &actor).await;
        self.record_execution(&trigger, &actor, &result);

        let outcome = result?;
        self.emit(outcome.audit.clone()).await;
        Ok(outcome)
    }

    /// Applies an area-wide mode through a synthesized `AREA_INTERLOCK`
    /// trigger.
    pub async fn set_area_mode(
        &self,
        area_id: &str,
        mode: &str,
        reason: &str,
        operator: &str,
    ) -> InterlockResult<BatchOutcome> {
        require_id("areaId", area_id)?;
        let parsed: AreaMode = mode.parse()?;
        tracing::info!(area_id, mode = ?parsed, operator, "area mode requested");

        let mut trigger = InterlockTrigger::new(
            format!("area-mode-{}", Uuid::new_v4()),
            TriggerType::AreaInterlock,
        )
        .area(area_id)
        .data(DATA_MODE, mode.trim());
        if !reason.trim().is_empty() {
            trigger = trigger.data(DATA_REASON, reason);
        }
        if !operator.trim().is_empty() {
            trigger = trigger.data(DATA_OPERATOR, operator);
        }
        self.process_trigger(trigger).await
    }

    /// Evaluates the trigger and checks each planned step without mutating
    /// anything.
    pub async fn preview_trigger(&self, trigger: &InterlockTrigger) -> InterlockResult<Vec<PreviewStep>> {
        let planned = self.plan(trigger).await?;
        let actor = self.actor_for(trigger);

        Ok(planned
            .into_iter()
            .map(|action| {
                let blocker =
                    self.registry
                        .peek_blocker(&action.device_id, &actor.holder, action.claim());
                PreviewStep {
                    would_succeed: blocker.is_none(),
                    blocking_holder: blocker.map(|lock| lock.holder),
                    action,
                }
            })
            .collect())
    }

    pub async fn area_lock_status(&self, area_id: &str) -> InterlockResult<AreaLockStatus> {
        require_id("areaId", area_id)?;
        let members = self
            .topology
            .members_of_area(area_id)
            .await
            .inspect_err(|e| self.note_collaborator_failure(e))?;

        let mut locked_devices = Vec::new();
        for device_id in &members {
            if self.registry.status(device_id)?.is_locked() {
                locked_devices.push(device_id.clone());
            }
        }
        let lock_ratio = match members.len() {
            0 => 0.0,
            n => locked_devices.len() as f64 / n as f64,
        };
        Ok(AreaLockStatus {
            area_id: area_id.to_string(),
            total_devices: members.len(),
            locked_devices,
            lock_ratio,
        })
    }

    // -----------------------------------------------------------------------
    // Maintenance and observability
    // -----------------------------------------------------------------------

    /// Runs one expiry pass immediately.
    pub async fn cleanup(&self) -> SweepSummary {
        self.sweeper.sweep().await
    }

    /// Starts the periodic sweeper. Must be called inside a tokio runtime.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        self.sweeper.clone().spawn()
    }

    /// Recorded trigger executions, newest first. `device_id` keeps records
    /// whose plan named that device; `success` keeps one outcome.
    pub fn executions(
        &self,
        device_id: Option<&str>,
        success: Option<bool>,
        limit: usize,
    ) -> Vec<ExecutionRecord> {
        self.executions.query(device_id, success, limit)
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    pub fn health(&self) -> HealthReport {
        self.stats.health()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn run_trigger(
        &self,
        trigger: &InterlockTrigger,
        actor: &BatchActor,
    ) -> InterlockResult<BatchOutcome> {
        let planned = self.plan(trigger).await?;
        let outcome = self.coordinator.apply_batch(&planned, actor, Utc::now())?;
        tracing::info!(
            trigger_id = %trigger.trigger_id,
            trigger_type = %trigger.trigger_type,
            actions = planned.len(),
            success = outcome.overall_success,
            "trigger processed"
        );
        Ok(outcome)
    }

    fn record_execution(
        &self,
        trigger: &InterlockTrigger,
        actor: &BatchActor,
        result: &InterlockResult<BatchOutcome>,
    ) {
        let (success, devices, blocked_by, error) = match result {
            Ok(outcome) => (
                outcome.overall_success,
                outcome.results.iter().map(|r| r.device_id.clone()).collect(),
                outcome.blocked_by.clone(),
                None,
            ),
            Err(e) => (
                false,
                trigger.device_id.iter().cloned().collect(),
                Vec::new(),
                Some(e.to_string()),
            ),
        };
        self.stats.record_execution(success);
        let sequence = self.executions.push(ExecutionRecord {
            sequence: 0,
            trigger_id: trigger.trigger_id.clone(),
            trigger_type: trigger.trigger_type,
            actor: actor.holder.clone(),
            success,
            devices,
            blocked_by,
            error,
            executed_at: Utc::now(),
        });
        tracing::debug!(sequence, trigger_id = %trigger.trigger_id, success, "execution recorded");
    }

    async fn plan(&self, trigger: &InterlockTrigger) -> InterlockResult<Vec<PlannedAction>> {
        let planned = self
            .evaluator
            .evaluate(trigger)
            .await
            .inspect_err(|e| self.note_collaborator_failure(e))?;
        self.stats.set_rule_store_reachable(true);
        Ok(planned)
    }

    fn note_collaborator_failure(&self, err: &InterlockError) {
        if !err.is_collaborator_failure() {
            return;
        }
        self.stats.record_collaborator_failure();
        if matches!(err, InterlockError::RuleStoreUnavailable(_)) {
            self.stats.set_rule_store_reachable(false);
        }
        tracing::warn!(error = %err, "collaborator unavailable");
    }

    fn actor_for(&self, trigger: &InterlockTrigger) -> BatchActor {
        let holder = trigger
            .data_value(DATA_OPERATOR)
            .unwrap_or(self.config.system_actor.as_str());
        let reason = trigger
            .data_value(DATA_REASON)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} trigger {}", trigger.trigger_type, trigger.trigger_id));
        BatchActor::new(holder, reason)
    }

    async fn emit(&self, events: Vec<AuditEvent>) {
        dispatch_audit(self.audit.as_ref(), &self.stats, events).await;
    }
}

/// Sends audit events after every device section has been released. A failed
/// write is logged and counted, and the lock decision stands.
pub(crate) async fn dispatch_audit(
    sink: &dyn AuditSink,
    stats: &StatisticsCollector,
    events: Vec<AuditEvent>,
) {
    for event in events {
        if let Err(e) = sink.record(&event).await {
            stats.record_audit_failure();
            tracing::warn!(
                device_id = %event.device_id,
                kind = ?event.kind,
                error = %e,
                "audit write failed"
            );
        }
    }
}
