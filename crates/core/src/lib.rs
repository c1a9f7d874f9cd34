//! Domain models, engine configuration, and error definitions.
//!
//! Foundation crate -- no async dependencies.

pub mod config;
pub mod error;
pub mod types;

pub use config::{EngineConfig, HealthPolicy};
pub use error::{InterlockError, InterlockResult};
pub use types::{
    ActionTarget, AreaMode, AuditEvent, AuditKind, Claim, DeviceLock, InterlockRule,
    InterlockTrigger, LockAction, LockRequest, LockState, LockStatus, LockType, PlannedAction,
    RuleAction, TriggerCondition, TriggerType,
};
