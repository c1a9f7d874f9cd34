//! Collaborator abstractions consumed by the interlock engine.
//!
//! The engine never owns rules, topology or audit storage. It reads and
//! writes them through these traits, and never while holding a device's
//! critical section.

pub mod audit;
pub mod fixture;
pub mod memory;

use async_trait::async_trait;
use interlock_core::error::InterlockResult;
use interlock_core::{AuditEvent, InterlockRule, TriggerType};

pub use audit::TracingAuditSink;
pub use fixture::Fixture;
pub use memory::{InMemoryRuleStore, InMemoryTopology, MemoryAuditSink};

/// Source of interlock rules.
///
/// Implementations return rules in insertion order; an outage is reported as
/// `InterlockError::RuleStoreUnavailable`.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn get_enabled_rules(
        &self,
        trigger_type: TriggerType,
        device_id: Option<&str>,
        area_id: Option<&str>,
    ) -> InterlockResult<Vec<InterlockRule>>;
}

/// Device membership of areas.
#[async_trait]
pub trait AreaTopology: Send + Sync {
    async fn members_of_area(&self, area_id: &str) -> InterlockResult<Vec<String>>;
}

/// Fire-and-forget audit trail. A failed write never affects a lock outcome.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> InterlockResult<()>;
}
