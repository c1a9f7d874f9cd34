//! Export of engine state as flat rows.
//!
//! Three row schemas:
//! - [`StatisticsRow`]: one per export, the counter snapshot
//! - [`LockRow`]: one per held lock
//! - [`AuditRow`]: one per audit event
//!
//! The only backend is the NDJSON stream in [`json_stream`].

pub mod json_stream;

use chrono::{DateTime, Utc};
use interlock_core::{AuditEvent, DeviceLock};
use serde::Serialize;

use crate::reporter::Report;

// ---------------------------------------------------------------------------
// Serializable row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatisticsRow {
    pub row_type: &'static str,
    pub status: String,
    pub healthy: bool,
    pub total_lock_requests: u64,
    pub active_lock_count: u64,
    pub device_lock_count: u64,
    pub expired_locks: u64,
    pub preemption_count: u64,
    pub force_release_count: u64,
    pub released_locks: u64,
    pub denied_requests: u64,
    pub batch_rollbacks: u64,
    pub audit_failures: u64,
    pub trigger_executions: u64,
    pub failed_executions: u64,
    pub warning_count: u32,
    pub run_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LockRow {
    pub row_type: &'static str,
    pub device_id: String,
    pub lock_type: String,
    pub holder: String,
    pub reason: String,
    pub priority: i32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditRow {
    pub row_type: &'static str,
    pub kind: String,
    pub device_id: String,
    pub previous_holder: String,
    pub previous_lock_type: String,
    pub reason: String,
    pub operator: String,
    pub event_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl LockRow {
    pub fn from_lock(lock: &DeviceLock, created_at: DateTime<Utc>) -> Self {
        LockRow {
            row_type: "lock",
            device_id: lock.device_id.clone(),
            lock_type: lock.lock_type.to_string(),
            holder: lock.holder.clone(),
            reason: lock.reason.clone(),
            priority: lock.priority,
            acquired_at: lock.acquired_at,
            expires_at: lock.expires_at,
            created_at,
        }
    }
}

impl AuditRow {
    pub fn from_event(event: &AuditEvent, created_at: DateTime<Utc>) -> Self {
        let kind = serde_json::to_value(event.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{:?}", event.kind));
        AuditRow {
            row_type: "audit",
            kind,
            device_id: event.device_id.clone(),
            previous_holder: event.previous_holder.clone(),
            previous_lock_type: event.previous_lock_type.to_string(),
            reason: event.reason.clone(),
            operator: event.operator.clone(),
            event_time: event.timestamp,
            created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder: Report → Rows
// ---------------------------------------------------------------------------

impl Report {
    /// Flatten the report into sink-ready rows.
    pub fn to_rows(&self) -> (StatisticsRow, Vec<LockRow>) {
        let stats = &self.health.statistics;
        let now = self.generated_at;

        let summary = StatisticsRow {
            row_type: "statistics",
            status: if self.health.healthy { "UP" } else { "DEGRADED" }.to_string(),
            healthy: self.health.healthy,
            total_lock_requests: stats.total_lock_requests,
            active_lock_count: stats.active_lock_count,
            device_lock_count: stats.device_lock_count,
            expired_locks: stats.expired_locks,
            preemption_count: stats.preemption_count,
            force_release_count: stats.force_release_count,
            released_locks: stats.released_locks,
            denied_requests: stats.denied_requests,
            batch_rollbacks: stats.batch_rollbacks,
            audit_failures: stats.audit_failures,
            trigger_executions: stats.trigger_executions,
            failed_executions: stats.failed_executions,
            warning_count: self.health.checks.len() as u32,
            run_time_ms: self.run_time.as_millis() as u64,
            created_at: now,
        };

        let locks = self
            .locks
            .iter()
            .map(|lock| LockRow::from_lock(lock, now))
            .collect();

        (summary, locks)
    }
}
