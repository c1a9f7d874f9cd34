//! Background expiry of timed-out locks.
//!
//! Each pass collects past-due device ids first and then expires them one at
//! a time, so a sweep never holds more than one device's entry at once.

use chrono::{DateTime, Utc};
use interlock_core::error::{InterlockError, InterlockResult};
use interlock_core::{AuditEvent, AuditKind};
use interlock_provider::AuditSink;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::dispatch_audit;
use crate::registry::LockRegistry;

/// Operator recorded on expiry audit events.
pub const SWEEPER_OPERATOR: &str = "expiry-sweeper";

const EXPIRY_REASON: &str = "lock timeout elapsed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub released: usize,
    pub swept_at: DateTime<Utc>,
}

pub struct ExpirySweeper {
    registry: Arc<LockRegistry>,
    audit: Arc<dyn AuditSink>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(registry: Arc<LockRegistry>, audit: Arc<dyn AuditSink>, interval: Duration) -> Self {
        Self {
            registry,
            audit,
            interval,
        }
    }

    /// One pass against an explicit clock. Audit events are returned, not sent.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> (SweepSummary, Vec<AuditEvent>) {
        let mut events = Vec::new();

        for device_id in self.registry.expiry_candidates(now) {
            match self.registry.expire(&device_id, now) {
                Ok(Some(lock)) => events.push(AuditEvent::for_lock(
                    AuditKind::Expiry,
                    &lock,
                    EXPIRY_REASON,
                    SWEEPER_OPERATOR,
                    now,
                )),
                // Released or re-acquired since the scan.
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(device_id = %device_id, error = %e, "expiry check failed");
                }
            }
        }

        let summary = SweepSummary {
            released: events.len(),
            swept_at: now,
        };
        (summary, events)
    }

    /// One pass against the wall clock, then audit dispatch.
    pub async fn sweep(&self) -> SweepSummary {
        let (summary, events) = self.sweep_at(Utc::now());
        if summary.released > 0 {
            tracing::info!(released = summary.released, "sweep expired locks");
        }
        dispatch_audit(self.audit.as_ref(), self.registry.stats(), events).await;
        summary
    }

    /// Runs [`sweep`](Self::sweep) every interval until the handle is shut down.
    pub fn spawn(self: Arc<Self>) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_ms = self.interval.as_millis() as u64, "expiry sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("expiry sweeper stopped");
        });

        SweeperHandle {
            stop: stop_tx,
            task,
        }
    }
}

/// Owner of a running sweeper task.
pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signals the loop and waits for the in-flight pass to finish.
    pub async fn shutdown(self) -> InterlockResult<()> {
        // The receiver is gone only if the task already ended.
        let _ = self.stop.send(true);
        self.task
            .await
            .map_err(|e| InterlockError::Internal(format!("sweeper task failed: {e}")))
    }
}
