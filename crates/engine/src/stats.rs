//! Lock counters and the derived health verdict.
//!
//! The registry reports every transition here. Counters are plain atomics, so
//! recording never contends with device critical sections beyond a single
//! `fetch_add`.

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use interlock_core::HealthPolicy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// How a `LOCKED` entry left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Released,
    Expired,
    ForceReleased,
    Preempted,
}

#[derive(Debug)]
pub struct StatisticsCollector {
    total_lock_requests: AtomicU64,
    active_lock_count: AtomicU64,
    devices_seen: DashSet<String>,
    expired_locks: AtomicU64,
    preemption_count: AtomicU64,
    force_release_count: AtomicU64,
    released_locks: AtomicU64,
    denied_requests: AtomicU64,
    batch_rollbacks: AtomicU64,
    collaborator_failures: AtomicU64,
    audit_failures: AtomicU64,
    invariant_violations: AtomicU64,
    trigger_executions: AtomicU64,
    failed_executions: AtomicU64,
    rule_store_reachable: AtomicBool,
    fallback_enabled: bool,
    policy: HealthPolicy,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSnapshot {
    pub total_lock_requests: u64,
    pub active_lock_count: u64,
    /// Distinct devices ever locked.
    pub device_lock_count: u64,
    pub expired_locks: u64,
    pub preemption_count: u64,
    pub force_release_count: u64,
    pub released_locks: u64,
    pub denied_requests: u64,
    pub batch_rollbacks: u64,
    pub collaborator_failures: u64,
    pub audit_failures: u64,
    pub invariant_violations: u64,
    /// Triggers processed, area-mode changes included.
    pub trigger_executions: u64,
    pub failed_executions: u64,
    pub healthy: bool,
    pub fallback_available: bool,
    pub rule_store_reachable: bool,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Up,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub healthy: bool,
    pub checks: Vec<String>,
    pub statistics: StatisticsSnapshot,
}

impl StatisticsCollector {
    pub fn new(policy: HealthPolicy, fallback_enabled: bool) -> Self {
        Self {
            total_lock_requests: AtomicU64::new(0),
            active_lock_count: AtomicU64::new(0),
            devices_seen: DashSet::new(),
            expired_locks: AtomicU64::new(0),
            preemption_count: AtomicU64::new(0),
            force_release_count: AtomicU64::new(0),
            released_locks: AtomicU64::new(0),
            denied_requests: AtomicU64::new(0),
            batch_rollbacks: AtomicU64::new(0),
            collaborator_failures: AtomicU64::new(0),
            audit_failures: AtomicU64::new(0),
            invariant_violations: AtomicU64::new(0),
            trigger_executions: AtomicU64::new(0),
            failed_executions: AtomicU64::new(0),
            rule_store_reachable: AtomicBool::new(true),
            fallback_enabled,
            policy,
        }
    }

    pub(crate) fn record_request(&self) {
        self.total_lock_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// The device is registered before the gauge moves, so a concurrent
    /// snapshot never sees more active locks than devices.
    pub(crate) fn record_installed(&self, device_id: &str) {
        if !self.devices_seen.contains(device_id) {
            self.devices_seen.insert(device_id.to_string());
        }
        self.active_lock_count.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn record_terminated(&self, how: Termination) {
        // Saturating: a miscount must not wrap the gauge to u64::MAX.
        let _ = self
            .active_lock_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
        let counter = match how {
            Termination::Released => &self.released_locks,
            Termination::Expired => &self.expired_locks,
            Termination::ForceReleased => &self.force_release_count,
            Termination::Preempted => &self.preemption_count,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denied(&self) {
        self.denied_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_rollback(&self) {
        self.batch_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invariant_violation(&self) {
        self.invariant_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_execution(&self, success: bool) {
        self.trigger_executions.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_executions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_collaborator_failure(&self) {
        self.collaborator_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit_failure(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_rule_store_reachable(&self, reachable: bool) {
        self.rule_store_reachable.store(reachable, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let active = self.active_lock_count.load(Ordering::Acquire);
        let devices = self.devices_seen.len() as u64;
        let expired = self.expired_locks.load(Ordering::Relaxed);

        StatisticsSnapshot {
            total_lock_requests: self.total_lock_requests.load(Ordering::Relaxed),
            active_lock_count: active,
            device_lock_count: devices,
            expired_locks: expired,
            preemption_count: self.preemption_count.load(Ordering::Relaxed),
            force_release_count: self.force_release_count.load(Ordering::Relaxed),
            released_locks: self.released_locks.load(Ordering::Relaxed),
            denied_requests: self.denied_requests.load(Ordering::Relaxed),
            batch_rollbacks: self.batch_rollbacks.load(Ordering::Relaxed),
            collaborator_failures: self.collaborator_failures.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
            invariant_violations: self.invariant_violations.load(Ordering::Relaxed),
            trigger_executions: self.trigger_executions.load(Ordering::Relaxed),
            failed_executions: self.failed_executions.load(Ordering::Relaxed),
            healthy: self.is_healthy(active, devices, expired),
            fallback_available: self.fallback_enabled,
            rule_store_reachable: self.rule_store_reachable.load(Ordering::Relaxed),
            captured_at: Utc::now(),
        }
    }

    /// Snapshot plus human-readable warnings.
    pub fn health(&self) -> HealthReport {
        let statistics = self.snapshot();
        let mut checks = Vec::new();

        if statistics.active_lock_count > self.policy.active_lock_warning {
            checks.push(format!(
                "too many active locks: {}",
                statistics.active_lock_count
            ));
        }
        if statistics.expired_locks > self.policy.expired_lock_warning {
            checks.push(format!(
                "too many expired locks: {}",
                statistics.expired_locks
            ));
        }
        if statistics.invariant_violations > 0 {
            checks.push(format!(
                "registry invariant violations: {}",
                statistics.invariant_violations
            ));
        }
        if !statistics.rule_store_reachable {
            checks.push("rule store unreachable on last trigger".to_string());
        }

        HealthReport {
            status: if statistics.healthy {
                HealthStatus::Up
            } else {
                HealthStatus::Degraded
            },
            healthy: statistics.healthy,
            checks,
            statistics,
        }
    }

    fn is_healthy(&self, active: u64, devices: u64, expired: u64) -> bool {
        if active > devices {
            return false;
        }
        devices == 0 || (expired as f64 / devices as f64) <= self.policy.max_expired_ratio
    }
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new(HealthPolicy::default(), true)
    }
}
