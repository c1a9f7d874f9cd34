//! Trigger to planned-action resolution.
//!
//! Pure with respect to lock state: the evaluator reads the rule store and the
//! area topology and never touches the registry.

use interlock_core::error::InterlockResult;
use interlock_core::types::DATA_LOCK_TYPE;
use interlock_core::{
    ActionTarget, AreaMode, InterlockRule, InterlockTrigger, LockType, PlannedAction, TriggerType,
};
use interlock_provider::{AreaTopology, RuleStore};
use std::sync::Arc;

pub struct RuleEvaluator {
    rules: Arc<dyn RuleStore>,
    topology: Arc<dyn AreaTopology>,
    default_priority: i32,
}

impl RuleEvaluator {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        topology: Arc<dyn AreaTopology>,
        default_priority: i32,
    ) -> Self {
        Self {
            rules,
            topology,
            default_priority,
        }
    }

    /// Plans the device actions a trigger calls for.
    ///
    /// Matching rules run in `(priority, created_seq)` order and each rule's
    /// actions keep their declared order. An `AREA_INTERLOCK` trigger carrying
    /// a `mode` only keeps rule actions that agree with that mode; when none
    /// are left it is planned from the mode alone.
    pub async fn evaluate(&self, trigger: &InterlockTrigger) -> InterlockResult<Vec<PlannedAction>> {
        trigger.validate()?;

        let rules = self.matching_rules(trigger).await?;
        let mut planned = Vec::new();
        for rule in &rules {
            planned.extend(self.expand_rule(rule).await?);
        }

        if let Some(mode) = requested_mode(trigger) {
            let before = planned.len();
            planned.retain(|action| action.action == mode.action());
            if planned.len() < before {
                tracing::debug!(
                    trigger_id = %trigger.trigger_id,
                    ?mode,
                    dropped = before - planned.len(),
                    "rule actions contradicting area mode dropped"
                );
            }
            if planned.is_empty() {
                return self.plan_area_mode(trigger, mode).await;
            }
        }

        tracing::debug!(
            trigger_id = %trigger.trigger_id,
            rules = rules.len(),
            actions = planned.len(),
            "trigger evaluated"
        );
        Ok(planned)
    }

    /// Enabled rules matching the trigger, in execution order. Every returned
    /// rule has passed validation.
    pub async fn matching_rules(&self, trigger: &InterlockTrigger) -> InterlockResult<Vec<InterlockRule>> {
        let mut rules = self
            .rules
            .get_enabled_rules(
                trigger.trigger_type,
                trigger.device_id.as_deref(),
                trigger.affected_area_id.as_deref(),
            )
            .await?;

        rules.retain(|rule| rule.enabled && rule.condition.matches(trigger));
        rules.sort_by_key(|rule| (rule.priority, rule.created_seq));
        for rule in &rules {
            rule.validate()?;
        }
        Ok(rules)
    }

    /// One planned action per device the rule's actions name.
    pub async fn expand_rule(&self, rule: &InterlockRule) -> InterlockResult<Vec<PlannedAction>> {
        let mut planned = Vec::with_capacity(rule.actions.len());
        for action in &rule.actions {
            let devices = match &action.target {
                ActionTarget::Device(id) => vec![id.clone()],
                ActionTarget::Area(area_id) => self.topology.members_of_area(area_id).await?,
            };
            planned.extend(devices.into_iter().map(|device_id| PlannedAction {
                device_id,
                action: action.action,
                lock_type: action.lock_type,
                priority: rule.priority,
                timeout_ms: action.timeout_ms,
                source_rule_id: Some(rule.rule_id.clone()),
            }));
        }
        Ok(planned)
    }

    async fn plan_area_mode(
        &self,
        trigger: &InterlockTrigger,
        mode: AreaMode,
    ) -> InterlockResult<Vec<PlannedAction>> {
        let Some(area_id) = trigger.affected_area_id.as_deref() else {
            return Ok(Vec::new());
        };
        let lock_type = match trigger.data_value(DATA_LOCK_TYPE) {
            Some(raw) => raw.parse()?,
            None => LockType::Business,
        };
        let members = self.topology.members_of_area(area_id).await?;

        tracing::debug!(
            trigger_id = %trigger.trigger_id,
            area_id,
            ?mode,
            members = members.len(),
            "planning area mode directly"
        );
        Ok(members
            .into_iter()
            .map(|device_id| PlannedAction {
                device_id,
                action: mode.action(),
                lock_type,
                priority: self.default_priority,
                timeout_ms: 0,
                source_rule_id: None,
            })
            .collect())
    }
}

/// Area mode carried by an `AREA_INTERLOCK` trigger, if any.
fn requested_mode(trigger: &InterlockTrigger) -> Option<AreaMode> {
    match trigger.trigger_type {
        TriggerType::AreaInterlock => trigger.area_mode(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interlock_core::types::DATA_MODE;
    use interlock_core::{LockAction, RuleAction, TriggerCondition};
    use interlock_provider::{InMemoryRuleStore, InMemoryTopology};

    fn rule(id: &str, priority: i32, condition: TriggerCondition, targets: Vec<ActionTarget>) -> InterlockRule {
        InterlockRule {
            rule_id: id.into(),
            enabled: true,
            priority,
            condition,
            actions: targets
                .into_iter()
                .map(|target| RuleAction {
                    target,
                    action: LockAction::Lock,
                    lock_type: LockType::Business,
                    timeout_ms: 0,
                })
                .collect(),
            created_seq: 0,
        }
    }

    fn on_device(device: &str) -> TriggerCondition {
        TriggerCondition {
            trigger_type: TriggerType::DeviceEvent,
            device_id: Some(device.into()),
            area_id: None,
            mode: None,
        }
    }

    fn evaluator(store: InMemoryRuleStore) -> RuleEvaluator {
        let topology = InMemoryTopology::new().with_area("vault", ["v-1", "v-2"]);
        RuleEvaluator::new(Arc::new(store), Arc::new(topology), 5)
    }

    #[tokio::test]
    async fn orders_by_priority_then_insertion() {
        let store = InMemoryRuleStore::new();
        store
            .insert(rule("late", 3, on_device("door-a"), vec![ActionTarget::Device("x".into())]))
            .unwrap();
        store
            .insert(rule("urgent", 1, on_device("door-a"), vec![ActionTarget::Device("y".into())]))
            .unwrap();
        store
            .insert(rule("later", 3, on_device("door-a"), vec![ActionTarget::Device("z".into())]))
            .unwrap();

        let trigger = InterlockTrigger::new("t1", TriggerType::DeviceEvent).device("door-a");
        let planned = evaluator(store).evaluate(&trigger).await.unwrap();
        let devices: Vec<_> = planned.iter().map(|p| p.device_id.as_str()).collect();
        assert_eq!(devices, vec!["y", "x", "z"]);
        assert_eq!(planned[0].priority, 1);
        assert_eq!(planned[1].source_rule_id.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn area_targets_expand_to_members() {
        let store = InMemoryRuleStore::new();
        store
            .insert(rule(
                "seal",
                2,
                on_device("door-a"),
                vec![ActionTarget::Area("vault".into()), ActionTarget::Device("door-b".into())],
            ))
            .unwrap();

        let trigger = InterlockTrigger::new("t1", TriggerType::DeviceEvent).device("door-a");
        let planned = evaluator(store).evaluate(&trigger).await.unwrap();
        let devices: Vec<_> = planned.iter().map(|p| p.device_id.as_str()).collect();
        assert_eq!(devices, vec!["v-1", "v-2", "door-b"]);
    }

    #[tokio::test]
    async fn area_mode_without_rules() {
        let trigger = InterlockTrigger::new("t1", TriggerType::AreaInterlock)
            .area("vault")
            .data(DATA_MODE, "lockdown");
        let planned = evaluator(InMemoryRuleStore::new())
            .evaluate(&trigger)
            .await
            .unwrap();
        assert_eq!(planned.len(), 2);
        assert!(planned.iter().all(|p| p.action == LockAction::Lock
            && p.lock_type == LockType::Business
            && p.priority == 5
            && p.source_rule_id.is_none()));

        let bad = InterlockTrigger::new("t2", TriggerType::AreaInterlock)
            .area("vault")
            .data(DATA_MODE, "party");
        assert!(evaluator(InMemoryRuleStore::new()).evaluate(&bad).await.is_err());
    }

    fn on_vault(mode: Option<AreaMode>) -> TriggerCondition {
        TriggerCondition {
            trigger_type: TriggerType::AreaInterlock,
            device_id: None,
            area_id: Some("vault".into()),
            mode,
        }
    }

    #[tokio::test]
    async fn contradicting_rule_actions_yield_to_mode() {
        let store = InMemoryRuleStore::new();
        store
            .insert(rule("seal", 2, on_vault(None), vec![ActionTarget::Area("vault".into())]))
            .unwrap();
        let evaluator = evaluator(store);

        let reopen = InterlockTrigger::new("t1", TriggerType::AreaInterlock)
            .area("vault")
            .data(DATA_MODE, "NORMAL");
        let planned = evaluator.evaluate(&reopen).await.unwrap();
        assert_eq!(planned.len(), 2);
        assert!(planned
            .iter()
            .all(|p| p.action == LockAction::Unlock && p.source_rule_id.is_none()));

        let seal = InterlockTrigger::new("t2", TriggerType::AreaInterlock)
            .area("vault")
            .data(DATA_MODE, "lockdown");
        let planned = evaluator.evaluate(&seal).await.unwrap();
        assert!(planned
            .iter()
            .all(|p| p.action == LockAction::Lock && p.source_rule_id.as_deref() == Some("seal")));
    }

    #[tokio::test]
    async fn mode_condition_selects_rule() {
        let store = InMemoryRuleStore::new();
        store
            .insert(rule(
                "seal-on-lockdown",
                2,
                on_vault(Some(AreaMode::Lockdown)),
                vec![ActionTarget::Device("v-1".into())],
            ))
            .unwrap();
        let evaluator = evaluator(store);

        let lockdown = InterlockTrigger::new("t1", TriggerType::AreaInterlock)
            .area("vault")
            .data(DATA_MODE, "LOCK");
        let planned = evaluator.evaluate(&lockdown).await.unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].source_rule_id.as_deref(), Some("seal-on-lockdown"));

        let normal = InterlockTrigger::new("t2", TriggerType::AreaInterlock)
            .area("vault")
            .data(DATA_MODE, "normal");
        assert!(evaluator.matching_rules(&normal).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_match_plans_nothing() {
        let trigger = InterlockTrigger::new("t1", TriggerType::Manual).device("door-z");
        let planned = evaluator(InMemoryRuleStore::new())
            .evaluate(&trigger)
            .await
            .unwrap();
        assert!(planned.is_empty());
    }

    #[tokio::test]
    async fn invalid_trigger_rejected() {
        let trigger = InterlockTrigger::new("t1", TriggerType::DeviceEvent);
        let err = evaluator(InMemoryRuleStore::new())
            .evaluate(&trigger)
            .await
            .unwrap_err();
        assert!(matches!(err, interlock_core::InterlockError::Validation(_)));
    }
}
