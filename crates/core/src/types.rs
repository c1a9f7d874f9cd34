//! Domain types for the interlock engine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{InterlockError, InterlockResult};

/// Priority assigned when a caller does not supply one. Lower is more urgent.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Upper bound on `timeout_ms` (one year).
pub const MAX_TIMEOUT_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// Audit reason attached to a lock that lost a preemption.
pub const PREEMPTION_REASON: &str = "preempted by higher-priority request";

/// Trigger payload keys understood by the engine.
pub const DATA_MODE: &str = "mode";
pub const DATA_REASON: &str = "reason";
pub const DATA_OPERATOR: &str = "operator";
pub const DATA_LOCK_TYPE: &str = "lockType";

// ---------------------------------------------------------------------------
// Lock classification
// ---------------------------------------------------------------------------

/// SAFETY outranks every other type regardless of numeric priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockType {
    Safety,
    Business,
    Maintenance,
}

impl LockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::Safety => "SAFETY",
            LockType::Business => "BUSINESS",
            LockType::Maintenance => "MAINTENANCE",
        }
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockType {
    type Err = InterlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SAFETY" => Ok(LockType::Safety),
            "BUSINESS" => Ok(LockType::Business),
            "MAINTENANCE" => Ok(LockType::Maintenance),
            other => Err(InterlockError::Validation(format!(
                "unknown lock type '{other}'"
            ))),
        }
    }
}

/// `UNLOCKED -> LOCKED -> {RELEASED, EXPIRED, FORCE_RELEASED} -> UNLOCKED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockState {
    Unlocked,
    Locked,
    Released,
    Expired,
    ForceReleased,
}

/// Strength of a lock claim, compared when deciding preemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub lock_type: LockType,
    pub priority: i32,
}

impl Claim {
    pub fn new(lock_type: LockType, priority: i32) -> Self {
        Self {
            lock_type,
            priority,
        }
    }

    /// True if `self` may displace a lock currently held with `held`.
    ///
    /// SAFETY beats non-SAFETY, non-SAFETY never beats SAFETY, and within the
    /// same class a strictly lower priority value wins. Ties never preempt.
    pub fn outranks(&self, held: &Claim) -> bool {
        let mine = self.lock_type == LockType::Safety;
        let theirs = held.lock_type == LockType::Safety;
        match (mine, theirs) {
            (true, false) => true,
            (false, true) => false,
            _ => self.priority < held.priority,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and locks
// ---------------------------------------------------------------------------

/// Input to a single-device acquire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRequest {
    pub device_id: String,
    pub lock_type: LockType,
    pub holder: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// `0` means the lock never expires on its own.
    #[serde(default)]
    pub timeout_ms: u64,
}

impl LockRequest {
    pub fn new(
        device_id: impl Into<String>,
        lock_type: LockType,
        holder: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            lock_type,
            holder: holder.into(),
            reason: String::new(),
            priority: DEFAULT_PRIORITY,
            timeout_ms: 0,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn claim(&self) -> Claim {
        Claim::new(self.lock_type, self.priority)
    }

    pub fn validate(&self) -> InterlockResult<()> {
        require_id("deviceId", &self.device_id)?;
        require_id("holder", &self.holder)?;
        check_timeout(self.timeout_ms)
    }
}

/// The unit of mutual exclusion. Exactly one may be `LOCKED` per device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLock {
    pub device_id: String,
    pub lock_type: LockType,
    pub holder: String,
    pub reason: String,
    pub priority: i32,
    pub acquired_at: DateTime<Utc>,
    /// `None` means never.
    pub expires_at: Option<DateTime<Utc>>,
    pub state: LockState,
}

impl DeviceLock {
    /// Builds a fresh `LOCKED` entry. The request must already be validated.
    pub fn from_request(request: &LockRequest, now: DateTime<Utc>) -> Self {
        let expires_at = match request.timeout_ms {
            0 => None,
            ms => Some(now + Duration::milliseconds(ms.min(MAX_TIMEOUT_MS) as i64)),
        };
        Self {
            device_id: request.device_id.clone(),
            lock_type: request.lock_type,
            holder: request.holder.clone(),
            reason: request.reason.clone(),
            priority: request.priority,
            acquired_at: now,
            expires_at,
            state: LockState::Locked,
        }
    }

    pub fn claim(&self) -> Claim {
        Claim::new(self.lock_type, self.priority)
    }

    pub fn is_locked(&self) -> bool {
        self.state == LockState::Locked
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// Milliseconds until expiry, `None` for indefinite locks.
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        self.expires_at
            .map(|at| (at - now).num_milliseconds().max(0) as u64)
    }

    pub fn with_state(mut self, state: LockState) -> Self {
        self.state = state;
        self
    }
}

/// Read-only view of one device slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockStatus {
    Unlocked {
        #[serde(rename = "deviceId")]
        device_id: String,
    },
    Locked(DeviceLock),
}

impl LockStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockStatus::Locked(_))
    }

    pub fn holder(&self) -> Option<&str> {
        match self {
            LockStatus::Unlocked { .. } => None,
            LockStatus::Locked(lock) => Some(&lock.holder),
        }
    }
}

// ---------------------------------------------------------------------------
// Rules and triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    DeviceEvent,
    AreaInterlock,
    Manual,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerType::DeviceEvent => "DEVICE_EVENT",
            TriggerType::AreaInterlock => "AREA_INTERLOCK",
            TriggerType::Manual => "MANUAL",
        })
    }
}

/// Trigger type plus a device/area predicate and an optional area mode.
///
/// With neither `device_id` nor `area_id` set, the condition matches every
/// trigger of its type. A condition with a `mode` only matches triggers whose
/// `mode` data parses to the same [`AreaMode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerCondition {
    pub trigger_type: TriggerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<AreaMode>,
}

impl TriggerCondition {
    pub fn matches(&self, trigger: &InterlockTrigger) -> bool {
        self.matches_target(
            trigger.trigger_type,
            trigger.device_id.as_deref(),
            trigger.affected_area_id.as_deref(),
        ) && self.matches_mode(trigger.area_mode())
    }

    /// A condition without a mode accepts any trigger mode, or none.
    pub fn matches_mode(&self, mode: Option<AreaMode>) -> bool {
        match self.mode {
            None => true,
            Some(wanted) => mode == Some(wanted),
        }
    }

    /// Exact device match, or area match when an area is supplied.
    pub fn matches_target(
        &self,
        trigger_type: TriggerType,
        device_id: Option<&str>,
        area_id: Option<&str>,
    ) -> bool {
        if self.trigger_type != trigger_type {
            return false;
        }
        if self.device_id.is_none() && self.area_id.is_none() {
            return true;
        }

        let device_match = device_id.is_some() && self.device_id.as_deref() == device_id;
        let area_match = area_id.is_some() && self.area_id.as_deref() == area_id;
        device_match || area_match
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockAction {
    Lock,
    Unlock,
}

/// What a rule action applies to. Areas expand to their member devices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionTarget {
    Device(String),
    Area(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAction {
    pub target: ActionTarget,
    pub action: LockAction,
    #[serde(default = "default_lock_type")]
    pub lock_type: LockType,
    #[serde(default)]
    pub timeout_ms: u64,
}

/// Interlock rule as read from the external rule store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterlockRule {
    pub rule_id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub condition: TriggerCondition,
    pub actions: Vec<RuleAction>,
    /// Insertion order assigned by the store; breaks priority ties.
    #[serde(default)]
    pub created_seq: u64,
}

impl InterlockRule {
    pub fn validate(&self) -> InterlockResult<()> {
        require_id("ruleId", &self.rule_id)?;
        if self.actions.is_empty() {
            return Err(InterlockError::Validation(format!(
                "rule '{}' has no actions",
                self.rule_id
            )));
        }
        for action in &self.actions {
            match &action.target {
                ActionTarget::Device(id) => require_id("action deviceId", id)?,
                ActionTarget::Area(id) => require_id("action areaId", id)?,
            }
            check_timeout(action.timeout_ms)?;
        }
        Ok(())
    }
}

/// Ephemeral event that may fire interlock rules. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterlockTrigger {
    pub trigger_id: String,
    pub trigger_type: TriggerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_area_id: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl InterlockTrigger {
    pub fn new(trigger_id: impl Into<String>, trigger_type: TriggerType) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            trigger_type,
            device_id: None,
            affected_area_id: None,
            data: BTreeMap::new(),
        }
    }

    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn area(mut self, area_id: impl Into<String>) -> Self {
        self.affected_area_id = Some(area_id.into());
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn data_value(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// The `mode` data value as an [`AreaMode`]. Unparseable values yield
    /// `None`; [`InterlockTrigger::validate`] rejects them up front.
    pub fn area_mode(&self) -> Option<AreaMode> {
        self.data_value(DATA_MODE).and_then(|raw| raw.parse().ok())
    }

    pub fn validate(&self) -> InterlockResult<()> {
        require_id("triggerId", &self.trigger_id)?;
        if self.trigger_type == TriggerType::AreaInterlock {
            if let Some(raw) = self.data_value(DATA_MODE) {
                raw.parse::<AreaMode>()?;
            }
        }
        if let Some(device_id) = &self.device_id {
            require_id("deviceId", device_id)?;
        }
        if let Some(area_id) = &self.affected_area_id {
            require_id("affectedAreaId", area_id)?;
        }

        let missing = match self.trigger_type {
            TriggerType::DeviceEvent if self.device_id.is_none() => Some("deviceId"),
            TriggerType::AreaInterlock if self.affected_area_id.is_none() => {
                Some("affectedAreaId")
            }
            TriggerType::Manual if self.device_id.is_none() && self.affected_area_id.is_none() => {
                Some("deviceId or affectedAreaId")
            }
            _ => None,
        };
        match missing {
            Some(field) => Err(InterlockError::Validation(format!(
                "{} trigger '{}' requires {field}",
                self.trigger_type, self.trigger_id
            ))),
            None => Ok(()),
        }
    }
}

/// One concrete device step produced by rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedAction {
    pub device_id: String,
    pub action: LockAction,
    pub lock_type: LockType,
    pub priority: i32,
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_rule_id: Option<String>,
}

impl PlannedAction {
    pub fn claim(&self) -> Claim {
        Claim::new(self.lock_type, self.priority)
    }
}

/// Area-wide mode accepted by `SetAreaMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AreaMode {
    #[serde(alias = "LOCK", alias = "LOCKED")]
    Lockdown,
    #[serde(alias = "UNLOCK", alias = "OPEN")]
    Normal,
}

impl AreaMode {
    pub fn action(&self) -> LockAction {
        match self {
            AreaMode::Lockdown => LockAction::Lock,
            AreaMode::Normal => LockAction::Unlock,
        }
    }
}

impl FromStr for AreaMode {
    type Err = InterlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOCK" | "LOCKDOWN" | "LOCKED" => Ok(AreaMode::Lockdown),
            "UNLOCK" | "NORMAL" | "OPEN" => Ok(AreaMode::Normal),
            other => Err(InterlockError::Validation(format!(
                "unknown area mode '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    ForceRelease,
    Preemption,
    Expiry,
    /// A rule UNLOCK action displaced another holder.
    RuleRevocation,
}

/// Record handed to the audit collaborator after a lock was taken from its
/// holder by someone else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub device_id: String,
    pub previous_holder: String,
    pub previous_lock_type: LockType,
    pub reason: String,
    pub operator: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn for_lock(
        kind: AuditKind,
        lock: &DeviceLock,
        reason: impl Into<String>,
        operator: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            device_id: lock.device_id.clone(),
            previous_holder: lock.holder.clone(),
            previous_lock_type: lock.lock_type,
            reason: reason.into(),
            operator: operator.into(),
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_enabled() -> bool {
    true
}

fn default_lock_type() -> LockType {
    LockType::Business
}

/// Rejects empty or whitespace-only identifiers.
pub fn require_id(field: &str, value: &str) -> InterlockResult<()> {
    if value.trim().is_empty() {
        return Err(InterlockError::Validation(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

fn check_timeout(timeout_ms: u64) -> InterlockResult<()> {
    if timeout_ms > MAX_TIMEOUT_MS {
        return Err(InterlockError::Validation(format!(
            "timeoutMs {timeout_ms} exceeds maximum {MAX_TIMEOUT_MS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_outranks_any_numeric_priority() {
        let safety = Claim::new(LockType::Safety, 9);
        let business = Claim::new(LockType::Business, 1);
        assert!(safety.outranks(&business));
        assert!(!business.outranks(&safety));
    }

    #[test]
    fn equal_class_needs_strictly_lower_priority() {
        let held = Claim::new(LockType::Business, 5);
        assert!(Claim::new(LockType::Business, 4).outranks(&held));
        assert!(!Claim::new(LockType::Business, 5).outranks(&held));
        assert!(!Claim::new(LockType::Maintenance, 6).outranks(&held));
        assert!(Claim::new(LockType::Maintenance, 2).outranks(&held));

        let safety_held = Claim::new(LockType::Safety, 1);
        assert!(!Claim::new(LockType::Safety, 1).outranks(&safety_held));
        assert!(Claim::new(LockType::Safety, 0).outranks(&safety_held));
    }

    #[test]
    fn zero_timeout_never_expires() {
        let now = Utc::now();
        let req = LockRequest::new("door-1", LockType::Business, "alice");
        let lock = DeviceLock::from_request(&req, now);
        assert_eq!(lock.expires_at, None);
        assert!(!lock.is_expired_at(now + Duration::days(3650)));
        assert_eq!(lock.remaining_ms(now), None);
    }

    #[test]
    fn finite_timeout_expires_at_deadline() {
        let now = Utc::now();
        let req = LockRequest::new("door-2", LockType::Business, "carol").timeout_ms(5000);
        let lock = DeviceLock::from_request(&req, now);
        assert!(!lock.is_expired_at(now + Duration::milliseconds(4999)));
        assert!(lock.is_expired_at(now + Duration::milliseconds(5000)));
        assert_eq!(lock.remaining_ms(now + Duration::milliseconds(1000)), Some(4000));
    }

    #[test]
    fn request_validation_rejects_blank_ids() {
        assert!(LockRequest::new(" ", LockType::Business, "alice")
            .validate()
            .is_err());
        assert!(LockRequest::new("door-1", LockType::Business, "")
            .validate()
            .is_err());
        assert!(LockRequest::new("door-1", LockType::Business, "alice")
            .timeout_ms(MAX_TIMEOUT_MS + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn trigger_validation_by_type() {
        assert!(InterlockTrigger::new("t1", TriggerType::DeviceEvent)
            .validate()
            .is_err());
        assert!(InterlockTrigger::new("t1", TriggerType::DeviceEvent)
            .device("door-1")
            .validate()
            .is_ok());
        assert!(InterlockTrigger::new("t2", TriggerType::AreaInterlock)
            .device("door-1")
            .validate()
            .is_err());
        assert!(InterlockTrigger::new("t3", TriggerType::Manual)
            .area("lobby")
            .validate()
            .is_ok());
        assert!(InterlockTrigger::new("", TriggerType::Manual)
            .area("lobby")
            .validate()
            .is_err());
    }

    #[test]
    fn condition_matches_device_or_area() {
        let by_device = TriggerCondition {
            trigger_type: TriggerType::DeviceEvent,
            device_id: Some("door-1".into()),
            area_id: None,
            mode: None,
        };
        let by_area = TriggerCondition {
            trigger_type: TriggerType::DeviceEvent,
            device_id: None,
            area_id: Some("lobby".into()),
            mode: None,
        };

        let t = InterlockTrigger::new("t", TriggerType::DeviceEvent).device("door-1");
        assert!(by_device.matches(&t));
        assert!(!by_area.matches(&t));

        let t = InterlockTrigger::new("t", TriggerType::DeviceEvent)
            .device("door-9")
            .area("lobby");
        assert!(!by_device.matches(&t));
        assert!(by_area.matches(&t));

        let t = InterlockTrigger::new("t", TriggerType::Manual).device("door-1");
        assert!(!by_device.matches(&t));
    }

    #[test]
    fn mode_condition_requires_matching_mode() {
        let on_lockdown = TriggerCondition {
            trigger_type: TriggerType::AreaInterlock,
            device_id: None,
            area_id: Some("lab".into()),
            mode: Some(AreaMode::Lockdown),
        };
        let base = InterlockTrigger::new("t", TriggerType::AreaInterlock).area("lab");

        assert!(on_lockdown.matches(&base.clone().data(DATA_MODE, "lock")));
        assert!(on_lockdown.matches(&base.clone().data(DATA_MODE, " LOCKDOWN ")));
        assert!(!on_lockdown.matches(&base.clone().data(DATA_MODE, "normal")));
        assert!(!on_lockdown.matches(&base));

        let any_mode = TriggerCondition {
            mode: None,
            ..on_lockdown
        };
        assert!(any_mode.matches(&base.clone().data(DATA_MODE, "normal")));
        assert!(any_mode.matches(&base));
    }

    #[test]
    fn unknown_area_mode_fails_validation() {
        let trigger = InterlockTrigger::new("t", TriggerType::AreaInterlock)
            .area("lab")
            .data(DATA_MODE, "party");
        assert!(matches!(trigger.validate(), Err(InterlockError::Validation(_))));
    }

    #[test]
    fn rule_without_actions_is_invalid() {
        let rule = InterlockRule {
            rule_id: "r1".into(),
            enabled: true,
            priority: 1,
            condition: TriggerCondition {
                trigger_type: TriggerType::Manual,
                device_id: None,
                area_id: None,
                mode: None,
            },
            actions: vec![],
            created_seq: 0,
        };
        assert!(matches!(rule.validate(), Err(InterlockError::Validation(_))));
    }

    #[test]
    fn area_mode_parses_aliases() {
        assert_eq!("lockdown".parse::<AreaMode>().unwrap(), AreaMode::Lockdown);
        assert_eq!("LOCK".parse::<AreaMode>().unwrap(), AreaMode::Lockdown);
        assert_eq!("normal".parse::<AreaMode>().unwrap(), AreaMode::Normal);
        assert!("party".parse::<AreaMode>().is_err());
    }

    #[test]
    fn lock_status_serializes_with_tag() {
        let status = LockStatus::Unlocked {
            device_id: "door-1".into(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "UNLOCKED");
        assert_eq!(json["deviceId"], "door-1");
    }

    #[test]
    fn rule_deserializes_with_defaults() {
        let rule: InterlockRule = serde_json::from_str(
            r#"{
                "ruleId": "airlock",
                "condition": { "triggerType": "DEVICE_EVENT", "deviceId": "door-a" },
                "actions": [ { "target": { "device": "door-b" }, "action": "LOCK" } ]
            }"#,
        )
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.priority, DEFAULT_PRIORITY);
        assert_eq!(rule.actions[0].lock_type, LockType::Business);
        assert_eq!(rule.actions[0].target, ActionTarget::Device("door-b".into()));
    }
}
