//! Lock registry, expiry sweeper, rule evaluation, area coordination,
//! execution history, statistics, reporting and data sinks.

pub mod coordinator;
pub mod engine;
pub mod evaluator;
pub mod history;
pub mod registry;
pub mod reporter;
pub mod sink;
pub mod stats;
pub mod sweeper;

pub use coordinator::{AreaCoordinator, BatchActor, BatchOutcome, DeviceResult, StepOutcome};
pub use engine::{AcquireStatus, AreaLockStatus, InterlockEngine, LockResponse, PreviewStep};
pub use evaluator::RuleEvaluator;
pub use history::{ExecutionLog, ExecutionRecord};
pub use registry::{AcquireOutcome, LockRegistry, Revocation};
pub use stats::{HealthReport, HealthStatus, StatisticsCollector, StatisticsSnapshot};
pub use sweeper::{ExpirySweeper, SweepSummary, SweeperHandle};
