//! All-or-nothing application of planned actions.
//!
//! Steps run in `device_id` order, one device critical section at a time, so
//! two overlapping batches always contend in the same order. The first denial
//! aborts the batch: applied steps are undone in reverse order and the
//! remaining steps are only inspected, never applied.

use chrono::{DateTime, Utc};
use interlock_core::error::InterlockResult;
use interlock_core::types::require_id;
use interlock_core::{AuditEvent, DeviceLock, LockAction, LockRequest, LockType, PlannedAction};
use serde::Serialize;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::registry::{AcquireOutcome, LockRegistry, Revocation};

/// Who a batch acts as. Locks it installs are held by `holder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchActor {
    pub holder: String,
    pub reason: String,
}

impl BatchActor {
    pub fn new(holder: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "outcome",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum StepOutcome {
    Locked,
    Preempted { previous_holder: String },
    Unlocked,
    Revoked { previous_holder: String },
    /// The actor already held the device, or there was nothing to unlock.
    AlreadySatisfied,
    Denied {
        holder: String,
        lock_type: LockType,
        priority: i32,
    },
    /// Applied, then undone because a later step was denied.
    RolledBack,
    /// Not applied because an earlier step was denied.
    NotAttempted,
}

impl StepOutcome {
    fn denied_by(lock: &DeviceLock) -> Self {
        StepOutcome::Denied {
            holder: lock.holder.clone(),
            lock_type: lock.lock_type,
            priority: lock.priority,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, StepOutcome::Denied { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResult {
    pub device_id: String,
    pub action: LockAction,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub overall_success: bool,
    pub results: Vec<DeviceResult>,
    /// Devices whose current holder stopped the batch.
    pub blocked_by: Vec<String>,
    /// Events for holders displaced by a committed batch. Empty on failure.
    #[serde(skip)]
    pub audit: Vec<AuditEvent>,
}

impl BatchOutcome {
    fn empty() -> Self {
        Self {
            overall_success: true,
            results: Vec::new(),
            blocked_by: Vec::new(),
            audit: Vec::new(),
        }
    }
}

pub struct AreaCoordinator {
    registry: Arc<LockRegistry>,
}

impl AreaCoordinator {
    pub fn new(registry: Arc<LockRegistry>) -> Self {
        Self { registry }
    }

    pub fn apply_batch(
        &self,
        actions: &[PlannedAction],
        actor: &BatchActor,
        now: DateTime<Utc>,
    ) -> InterlockResult<BatchOutcome> {
        require_id("holder", &actor.holder)?;
        for action in actions {
            require_id("deviceId", &action.device_id)?;
        }
        if actions.is_empty() {
            return Ok(BatchOutcome::empty());
        }

        let mut order: Vec<&PlannedAction> = actions.iter().collect();
        order.sort_by(|a, b| a.device_id.cmp(&b.device_id));

        let mut batch = AreaLockBatch::new(&self.registry, actor);
        let mut results = Vec::with_capacity(order.len());
        let mut audit = Vec::new();
        let mut denied_at = None;

        for (pos, planned) in order.iter().enumerate() {
            let (outcome, event) = match batch.apply(pos, planned, now) {
                Ok(step) => step,
                Err(e) => {
                    batch.rollback();
                    self.registry.stats().record_batch_rollback();
                    tracing::error!(device_id = %planned.device_id, error = %e, "batch aborted on registry error");
                    return Err(e);
                }
            };
            audit.extend(event);
            let denied = outcome.is_denied();
            results.push(DeviceResult {
                device_id: planned.device_id.clone(),
                action: planned.action,
                outcome,
            });
            if denied {
                denied_at = Some(pos);
                break;
            }
        }

        let Some(denied_at) = denied_at else {
            tracing::info!(
                holder = %actor.holder,
                steps = results.len(),
                displaced = audit.len(),
                "batch committed"
            );
            return Ok(BatchOutcome {
                overall_success: true,
                results,
                blocked_by: Vec::new(),
                audit,
            });
        };

        for pos in batch.rollback() {
            results[pos].outcome = StepOutcome::RolledBack;
        }

        let mut blocked_by = vec![order[denied_at].device_id.clone()];
        for planned in &order[denied_at + 1..] {
            let outcome = match self
                .registry
                .peek_blocker(&planned.device_id, &actor.holder, planned.claim())
            {
                Some(lock) => {
                    if !blocked_by.contains(&planned.device_id) {
                        blocked_by.push(planned.device_id.clone());
                    }
                    StepOutcome::denied_by(&lock)
                }
                None => StepOutcome::NotAttempted,
            };
            results.push(DeviceResult {
                device_id: planned.device_id.clone(),
                action: planned.action,
                outcome,
            });
        }

        self.registry.stats().record_batch_rollback();
        tracing::warn!(
            holder = %actor.holder,
            blocked_by = ?blocked_by,
            dropped_audit = audit.len(),
            "batch rolled back"
        );
        Ok(BatchOutcome {
            overall_success: false,
            results,
            blocked_by,
            audit: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Batch internals
// ---------------------------------------------------------------------------

enum Undo {
    /// Drop the lock the batch installed.
    Release,
    /// Put a displaced lock back; over the actor's own lock when
    /// `over_actor` is set.
    Reinstate { previous: DeviceLock, over_actor: bool },
}

struct AppliedStep {
    pos: usize,
    device_id: String,
    undo: Undo,
}

/// Undo log for one in-flight batch.
struct AreaLockBatch<'a> {
    registry: &'a LockRegistry,
    actor: &'a BatchActor,
    applied: SmallVec<[AppliedStep; 16]>,
}

impl<'a> AreaLockBatch<'a> {
    fn new(registry: &'a LockRegistry, actor: &'a BatchActor) -> Self {
        Self {
            registry,
            actor,
            applied: SmallVec::new(),
        }
    }

    fn apply(
        &mut self,
        pos: usize,
        planned: &PlannedAction,
        now: DateTime<Utc>,
    ) -> InterlockResult<(StepOutcome, Option<AuditEvent>)> {
        match planned.action {
            LockAction::Lock => {
                let request = LockRequest::new(&planned.device_id, planned.lock_type, &self.actor.holder)
                    .reason(&self.actor.reason)
                    .priority(planned.priority)
                    .timeout_ms(planned.timeout_ms);

                Ok(match self.registry.acquire(&request, now)? {
                    AcquireOutcome::Granted(_) => {
                        self.record(pos, planned, Undo::Release);
                        (StepOutcome::Locked, None)
                    }
                    AcquireOutcome::Upgraded { previous, .. } => {
                        self.record(
                            pos,
                            planned,
                            Undo::Reinstate {
                                previous,
                                over_actor: true,
                            },
                        );
                        (StepOutcome::Locked, None)
                    }
                    AcquireOutcome::Preempted {
                        previous, audit, ..
                    } => {
                        let outcome = StepOutcome::Preempted {
                            previous_holder: previous.holder.clone(),
                        };
                        self.record(
                            pos,
                            planned,
                            Undo::Reinstate {
                                previous,
                                over_actor: true,
                            },
                        );
                        (outcome, Some(audit))
                    }
                    AcquireOutcome::AlreadyHeld(_) => (StepOutcome::AlreadySatisfied, None),
                    AcquireOutcome::Denied(lock) => (StepOutcome::denied_by(&lock), None),
                })
            }
            LockAction::Unlock => {
                Ok(
                    match self.registry.revoke(
                        &planned.device_id,
                        &self.actor.holder,
                        planned.claim(),
                        now,
                    )? {
                        Revocation::Vacant => (StepOutcome::AlreadySatisfied, None),
                        Revocation::Released(own) => {
                            self.record(
                                pos,
                                planned,
                                Undo::Reinstate {
                                    previous: own,
                                    over_actor: false,
                                },
                            );
                            (StepOutcome::Unlocked, None)
                        }
                        Revocation::Revoked { previous, audit } => {
                            let outcome = StepOutcome::Revoked {
                                previous_holder: previous.holder.clone(),
                            };
                            self.record(
                                pos,
                                planned,
                                Undo::Reinstate {
                                    previous,
                                    over_actor: false,
                                },
                            );
                            (outcome, Some(audit))
                        }
                        Revocation::Denied(lock) => (StepOutcome::denied_by(&lock), None),
                    },
                )
            }
        }
    }

    fn record(&mut self, pos: usize, planned: &PlannedAction, undo: Undo) {
        self.applied.push(AppliedStep {
            pos,
            device_id: planned.device_id.clone(),
            undo,
        });
    }

    /// Undoes every applied step, newest first. Returns the positions undone.
    fn rollback(&mut self) -> Vec<usize> {
        let mut undone = Vec::with_capacity(self.applied.len());
        while let Some(step) = self.applied.pop() {
            let result = match step.undo {
                Undo::Release => self.registry.release(&step.device_id, &self.actor.holder),
                Undo::Reinstate {
                    previous,
                    over_actor,
                } => {
                    let over = over_actor.then_some(self.actor.holder.as_str());
                    self.registry.reinstate(previous, over)
                }
            };
            match result {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(device_id = %step.device_id, "rollback found device changed by another caller");
                }
                Err(e) => {
                    tracing::error!(device_id = %step.device_id, error = %e, "rollback step failed");
                }
            }
            undone.push(step.pos);
        }
        undone
    }
}
