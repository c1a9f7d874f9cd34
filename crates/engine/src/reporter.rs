//! Human-readable engine report.
//!
//! Combines the health verdict, the counters and the currently held locks
//! into one boxed text block for terminal output.

use chrono::{DateTime, Utc};
use interlock_core::DeviceLock;

use crate::engine::InterlockEngine;
use crate::stats::{HealthReport, HealthStatus};

#[derive(Debug)]
pub struct Report {
    pub health: HealthReport,
    pub locks: Vec<DeviceLock>,
    pub generated_at: DateTime<Utc>,
    pub run_time: std::time::Duration,
}

impl Report {
    pub fn build(engine: &InterlockEngine, run_time: std::time::Duration) -> Self {
        Report {
            health: engine.health(),
            locks: engine.registry().snapshot_all(),
            generated_at: Utc::now(),
            run_time,
        }
    }

    pub fn render(&self) -> String {
        let stats = &self.health.statistics;
        let mut out = String::new();

        out.push('\n');
        out.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        out.push_str("║                   INTERLOCK ENGINE REPORT                    ║\n");
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        let status = match self.health.status {
            HealthStatus::Up => "UP",
            HealthStatus::Degraded => "DEGRADED",
        };
        push_row(&mut out, "Status:", status);
        push_row(&mut out, "Lock requests:", stats.total_lock_requests);
        push_row(&mut out, "Active locks:", stats.active_lock_count);
        push_row(&mut out, "Devices ever locked:", stats.device_lock_count);
        push_row(&mut out, "Released:", stats.released_locks);
        push_row(&mut out, "Expired:", stats.expired_locks);
        push_row(&mut out, "Preemptions:", stats.preemption_count);
        push_row(&mut out, "Force releases:", stats.force_release_count);
        push_row(&mut out, "Denied requests:", stats.denied_requests);
        push_row(&mut out, "Batch rollbacks:", stats.batch_rollbacks);
        push_row(&mut out, "Audit failures:", stats.audit_failures);
        push_row(
            &mut out,
            "Trigger executions:",
            format!("{} ({} failed)", stats.trigger_executions, stats.failed_executions),
        );
        push_row(&mut out, "Fallback available:", stats.fallback_available);
        out.push_str(&format!(
            "║  {:<20}{:>39?} ║\n",
            "Run time:", self.run_time
        ));
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        if self.health.checks.is_empty() {
            out.push_str("║  All health checks passed.                                   ║\n");
        } else {
            out.push_str("║  WARNINGS                                                    ║\n");
            for check in &self.health.checks {
                out.push_str(&format!("║   - {check}\n"));
            }
        }
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        if self.locks.is_empty() {
            out.push_str("║  No devices locked.                                          ║\n");
        } else {
            out.push_str("║  HELD LOCKS                                                  ║\n");
            for lock in &self.locks {
                let expiry = match lock.remaining_ms(self.generated_at) {
                    Some(ms) => format!("{ms} ms left"),
                    None => "indefinite".to_string(),
                };
                out.push_str(&format!(
                    "║   {} [{} p{}] by {} ({})\n",
                    lock.device_id, lock.lock_type, lock.priority, lock.holder, expiry
                ));
            }
        }

        out.push_str("╚══════════════════════════════════════════════════════════════╝\n");
        out
    }
}

fn push_row(out: &mut String, label: &str, value: impl std::fmt::Display) {
    out.push_str(&format!("║  {label:<20}{value:>39} ║\n"));
}
