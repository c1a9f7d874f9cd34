//! Bounded in-memory history of trigger executions.
//!
//! Every `process_trigger` call (area-mode changes included) appends one
//! record. Once `max_entries` is reached the oldest record is evicted.

use chrono::{DateTime, Utc};
use interlock_core::TriggerType;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Monotonic per engine, starting at 1.
    pub sequence: u64,
    pub trigger_id: String,
    pub trigger_type: TriggerType,
    pub actor: String,
    pub success: bool,
    /// Devices the plan named, in the order they were applied.
    pub devices: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn touches(&self, device_id: &str) -> bool {
        self.devices.iter().any(|d| d == device_id)
    }
}

#[derive(Debug)]
struct Ring {
    records: VecDeque<ExecutionRecord>,
    next_sequence: u64,
}

#[derive(Debug)]
pub struct ExecutionLog {
    inner: Mutex<Ring>,
    max_entries: usize,
}

impl ExecutionLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Ring {
                records: VecDeque::with_capacity(max_entries.min(1024)),
                next_sequence: 1,
            }),
            max_entries: max_entries.max(1),
        }
    }

    /// Stores `record` under the next sequence number and returns it.
    pub fn push(&self, mut record: ExecutionRecord) -> u64 {
        let mut ring = self.ring();
        record.sequence = ring.next_sequence;
        ring.next_sequence += 1;
        if ring.records.len() >= self.max_entries {
            ring.records.pop_front();
        }
        ring.records.push_back(record);
        ring.next_sequence - 1
    }

    /// Newest first, at most `limit` records.
    pub fn query(
        &self,
        device_id: Option<&str>,
        success: Option<bool>,
        limit: usize,
    ) -> Vec<ExecutionRecord> {
        self.ring()
            .records
            .iter()
            .rev()
            .filter(|r| device_id.map_or(true, |id| r.touches(id)))
            .filter(|r| success.map_or(true, |ok| r.success == ok))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ring().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Recovers from poisoning; every mutation leaves the ring consistent.
    fn ring(&self) -> MutexGuard<'_, Ring> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(trigger_id: &str, devices: &[&str], success: bool) -> ExecutionRecord {
        ExecutionRecord {
            sequence: 0,
            trigger_id: trigger_id.into(),
            trigger_type: TriggerType::AreaInterlock,
            actor: "ops".into(),
            success,
            devices: devices.iter().map(|d| d.to_string()).collect(),
            blocked_by: if success { vec![] } else { vec![devices[0].to_string()] },
            error: None,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let log = ExecutionLog::new(2);
        assert_eq!(log.push(record("t1", &["A"], true)), 1);
        log.push(record("t2", &["A"], true));
        log.push(record("t3", &["B"], false));

        assert_eq!(log.len(), 2);
        let ids: Vec<_> = log
            .query(None, None, 10)
            .into_iter()
            .map(|r| (r.sequence, r.trigger_id))
            .collect();
        assert_eq!(ids, vec![(3, "t3".to_string()), (2, "t2".to_string())]);
    }

    #[test]
    fn filters_by_device_and_status() {
        let log = ExecutionLog::new(10);
        log.push(record("t1", &["A", "B"], true));
        log.push(record("t2", &["B", "C"], false));
        log.push(record("t3", &["C"], true));

        let on_b: Vec<_> = log.query(Some("B"), None, 10).into_iter().map(|r| r.trigger_id).collect();
        assert_eq!(on_b, vec!["t2", "t1"]);

        let failed = log.query(None, Some(false), 10);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].blocked_by, vec!["B".to_string()]);

        assert_eq!(log.query(Some("C"), Some(true), 10)[0].trigger_id, "t3");
        assert_eq!(log.query(None, None, 1).len(), 1);
        assert!(log.query(Some("Z"), None, 10).is_empty());
    }

    #[test]
    fn serializes_camel_case_and_skips_empty() {
        let json = serde_json::to_value(record("t1", &["A"], true)).unwrap();
        assert_eq!(json["triggerId"], "t1");
        assert_eq!(json["triggerType"], "AREA_INTERLOCK");
        assert!(json.get("blockedBy").is_none());
        assert!(json.get("error").is_none());
    }
}
