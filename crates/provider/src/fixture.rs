//! JSON fixture describing rules and area membership.
//!
//! ```json
//! {
//!   "rules": [ { "ruleId": "airlock", "condition": {...}, "actions": [...] } ],
//!   "areas": { "lobby": ["door-1", "door-2"] }
//! }
//! ```

use interlock_core::error::{InterlockError, InterlockResult};
use interlock_core::InterlockRule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::memory::{InMemoryRuleStore, InMemoryTopology};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    #[serde(default)]
    pub rules: Vec<InterlockRule>,
    #[serde(default)]
    pub areas: BTreeMap<String, Vec<String>>,
}

impl Fixture {
    pub fn from_json_str(raw: &str) -> InterlockResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| InterlockError::Validation(format!("invalid fixture: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> InterlockResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            InterlockError::Config(format!("failed to read fixture '{}': {e}", path.display()))
        })?;
        let fixture = Self::from_json_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            rules = fixture.rules.len(),
            areas = fixture.areas.len(),
            "fixture loaded"
        );
        Ok(fixture)
    }

    /// Builds a rule store, validating every rule in file order.
    pub fn rule_store(&self) -> InterlockResult<InMemoryRuleStore> {
        let store = InMemoryRuleStore::new();
        for rule in &self.rules {
            store.insert(rule.clone())?;
        }
        Ok(store)
    }

    pub fn topology(&self) -> InMemoryTopology {
        let topology = InMemoryTopology::new();
        for (area_id, members) in &self.areas {
            topology.set_area(area_id.clone(), members.iter().cloned());
        }
        topology
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AreaTopology, RuleStore};
    use interlock_core::TriggerType;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "rules": [
            {
                "ruleId": "mantrap-inner",
                "priority": 2,
                "condition": { "triggerType": "DEVICE_EVENT", "deviceId": "outer" },
                "actions": [ { "target": { "device": "inner" }, "action": "LOCK", "timeoutMs": 5000 } ]
            }
        ],
        "areas": { "lobby": ["door-1", "door-2", "door-3"] }
    }"#;

    #[tokio::test]
    async fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let fixture = Fixture::load(file.path()).unwrap();
        let store = fixture.rule_store().unwrap();
        let topology = fixture.topology();

        let rules = store
            .get_enabled_rules(TriggerType::DeviceEvent, Some("outer"), None)
            .await
            .unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].priority, 2);
        assert_eq!(topology.members_of_area("lobby").await.unwrap().len(), 3);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = Fixture::load("/nonexistent/interlock-fixture.json").unwrap_err();
        assert!(matches!(err, InterlockError::Config(_)));
    }

    #[test]
    fn malformed_json_is_validation_error() {
        let err = Fixture::from_json_str("{\"rules\": 7}").unwrap_err();
        assert!(matches!(err, InterlockError::Validation(_)));
    }
}
