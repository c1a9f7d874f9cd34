//! In-memory collaborators for development, the CLI runner, and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use interlock_core::error::{InterlockError, InterlockResult};
use interlock_core::{AuditEvent, InterlockRule, TriggerType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{AreaTopology, AuditSink, RuleStore};

// ---------------------------------------------------------------------------
// Rule store
// ---------------------------------------------------------------------------

/// Ordered rule list. `created_seq` is assigned here on insert.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<InterlockRule>>,
    next_seq: AtomicU64,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and appends a rule. Rule ids are unique.
    pub fn insert(&self, mut rule: InterlockRule) -> InterlockResult<u64> {
        rule.validate()?;
        let mut rules = self.write()?;
        if rules.iter().any(|r| r.rule_id == rule.rule_id) {
            return Err(InterlockError::Validation(format!(
                "rule '{}' already exists",
                rule.rule_id
            )));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        rule.created_seq = seq;
        tracing::debug!(rule_id = %rule.rule_id, seq, "rule inserted");
        rules.push(rule);
        Ok(seq)
    }

    /// Returns `false` if no rule has this id.
    pub fn set_enabled(&self, rule_id: &str, enabled: bool) -> InterlockResult<bool> {
        let mut rules = self.write()?;
        match rules.iter_mut().find(|r| r.rule_id == rule_id) {
            Some(rule) => {
                rule.enabled = enabled;
                tracing::info!(rule_id, enabled, "rule toggled");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove(&self, rule_id: &str) -> InterlockResult<Option<InterlockRule>> {
        let mut rules = self.write()?;
        let removed = rules
            .iter()
            .position(|r| r.rule_id == rule_id)
            .map(|idx| rules.remove(idx));
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.rules.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> InterlockResult<RwLockReadGuard<'_, Vec<InterlockRule>>> {
        self.rules
            .read()
            .map_err(|_| InterlockError::RuleStoreUnavailable("rule list lock poisoned".into()))
    }

    fn write(&self) -> InterlockResult<RwLockWriteGuard<'_, Vec<InterlockRule>>> {
        self.rules
            .write()
            .map_err(|_| InterlockError::RuleStoreUnavailable("rule list lock poisoned".into()))
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn get_enabled_rules(
        &self,
        trigger_type: TriggerType,
        device_id: Option<&str>,
        area_id: Option<&str>,
    ) -> InterlockResult<Vec<InterlockRule>> {
        let rules = self.read()?;
        Ok(rules
            .iter()
            .filter(|r| r.enabled && r.condition.matches_target(trigger_type, device_id, area_id))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// Area -> member devices. Unknown areas have no members.
#[derive(Debug, Default)]
pub struct InMemoryTopology {
    areas: DashMap<String, Vec<String>>,
}

impl InMemoryTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_area<I, S>(self, area_id: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_area(area_id, members);
        self
    }

    pub fn set_area<I, S>(&self, area_id: impl Into<String>, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.areas
            .insert(area_id.into(), members.into_iter().map(Into::into).collect());
    }
}

#[async_trait]
impl AreaTopology for InMemoryTopology {
    async fn members_of_area(&self, area_id: &str) -> InterlockResult<Vec<String>> {
        Ok(self
            .areas
            .get(area_id)
            .map(|members| members.clone())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Keeps every audit event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> InterlockResult<()> {
        self.events
            .lock()
            .map_err(|_| InterlockError::Audit("audit buffer poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}
