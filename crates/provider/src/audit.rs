//! Audit sink that writes to the `tracing` pipeline.

use async_trait::async_trait;
use interlock_core::error::InterlockResult;
use interlock_core::{AuditEvent, AuditKind};

use crate::AuditSink;

/// Emits each audit event as a structured event on target `interlock::audit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> InterlockResult<()> {
        match event.kind {
            AuditKind::Expiry => tracing::info!(
                target: "interlock::audit",
                kind = ?event.kind,
                device_id = %event.device_id,
                previous_holder = %event.previous_holder,
                timestamp = %event.timestamp,
                "lock expired"
            ),
            _ => tracing::warn!(
                target: "interlock::audit",
                kind = ?event.kind,
                device_id = %event.device_id,
                previous_holder = %event.previous_holder,
                lock_type = %event.previous_lock_type,
                operator = %event.operator,
                reason = %event.reason,
                timestamp = %event.timestamp,
                "lock taken from holder"
            ),
        }
        Ok(())
    }
}
