//! Per-device lock table.
//!
//! Backed by a sharded [`DashMap`]: every mutation goes through
//! [`DashMap::entry`], which holds the write lock of exactly one shard for the
//! duration of the compare-and-swap. Unrelated devices hash to independent
//! shards and never wait on each other, and no method performs I/O while an
//! entry guard is alive.
//!
//! An entry in the map is always a `LOCKED` lock. Reaching a terminal state
//! removes the entry, so an absent key is the `UNLOCKED` state.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use interlock_core::error::{InterlockError, InterlockResult};
use interlock_core::types::{require_id, PREEMPTION_REASON};
use interlock_core::{AuditEvent, AuditKind, Claim, DeviceLock, LockRequest, LockState, LockStatus};
use std::sync::Arc;

use crate::stats::{StatisticsCollector, Termination};

/// Result of [`LockRegistry::acquire`]. Only `Granted`, `Upgraded` and
/// `Preempted` change state.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    Granted(DeviceLock),
    /// The previous holder was displaced. `previous` carries its terminal
    /// `FORCE_RELEASED` state.
    Preempted {
        lock: DeviceLock,
        previous: DeviceLock,
        audit: AuditEvent,
    },
    /// The holder replaced its own lock with a stronger claim. `previous` is
    /// the replaced lock; no one was displaced.
    Upgraded {
        lock: DeviceLock,
        previous: DeviceLock,
    },
    /// The requester already holds the device with an equal or stronger claim.
    AlreadyHeld(DeviceLock),
    Denied(DeviceLock),
}

impl AcquireOutcome {
    pub fn granted(&self) -> bool {
        matches!(
            self,
            AcquireOutcome::Granted(_)
                | AcquireOutcome::Upgraded { .. }
                | AcquireOutcome::Preempted { .. }
        )
    }

    /// The lock occupying the device after the call.
    pub fn current(&self) -> &DeviceLock {
        match self {
            AcquireOutcome::Granted(lock)
            | AcquireOutcome::Upgraded { lock, .. }
            | AcquireOutcome::Preempted { lock, .. }
            | AcquireOutcome::AlreadyHeld(lock)
            | AcquireOutcome::Denied(lock) => lock,
        }
    }

    pub fn current_holder(&self) -> &str {
        &self.current().holder
    }
}

/// Result of [`LockRegistry::revoke`], the registry side of a rule `UNLOCK`.
#[derive(Debug, Clone, PartialEq)]
pub enum Revocation {
    /// Nothing to unlock.
    Vacant,
    /// The actor's own lock was released.
    Released(DeviceLock),
    /// Another holder's lock was taken away.
    Revoked {
        previous: DeviceLock,
        audit: AuditEvent,
    },
    Denied(DeviceLock),
}

pub struct LockRegistry {
    locks: DashMap<String, DeviceLock>,
    stats: Arc<StatisticsCollector>,
}

impl LockRegistry {
    pub fn new(stats: Arc<StatisticsCollector>) -> Self {
        Self {
            locks: DashMap::new(),
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<StatisticsCollector> {
        &self.stats
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Installs a lock on an unlocked device, or preempts a weaker holder.
    pub fn acquire(
        &self,
        request: &LockRequest,
        now: DateTime<Utc>,
    ) -> InterlockResult<AcquireOutcome> {
        request.validate()?;
        self.stats.record_request();

        match self.locks.entry(request.device_id.clone()) {
            Entry::Vacant(slot) => {
                let lock = DeviceLock::from_request(request, now);
                slot.insert(lock.clone());
                self.stats.record_installed(&request.device_id);
                tracing::info!(
                    device_id = %request.device_id,
                    holder = %request.holder,
                    lock_type = %request.lock_type,
                    priority = request.priority,
                    timeout_ms = request.timeout_ms,
                    "lock granted"
                );
                Ok(AcquireOutcome::Granted(lock))
            }
            Entry::Occupied(mut slot) => {
                self.check_entry(slot.key(), slot.get())?;

                let stronger = request.claim().outranks(&slot.get().claim());
                if stronger && slot.get().holder == request.holder {
                    let lock = DeviceLock::from_request(request, now);
                    let previous = slot.insert(lock.clone());
                    drop(slot);

                    tracing::info!(
                        device_id = %request.device_id,
                        holder = %request.holder,
                        lock_type = %request.lock_type,
                        priority = request.priority,
                        previous_type = %previous.lock_type,
                        previous_priority = previous.priority,
                        "lock upgraded"
                    );
                    return Ok(AcquireOutcome::Upgraded { lock, previous });
                }

                if stronger {
                    let lock = DeviceLock::from_request(request, now);
                    let previous = slot.insert(lock.clone()).with_state(LockState::ForceReleased);
                    drop(slot);

                    self.stats.record_terminated(Termination::Preempted);
                    self.stats.record_installed(&request.device_id);
                    tracing::info!(
                        device_id = %request.device_id,
                        holder = %request.holder,
                        previous_holder = %previous.holder,
                        lock_type = %request.lock_type,
                        priority = request.priority,
                        "lock preempted"
                    );
                    let audit = AuditEvent::for_lock(
                        AuditKind::Preemption,
                        &previous,
                        PREEMPTION_REASON,
                        &request.holder,
                        now,
                    );
                    return Ok(AcquireOutcome::Preempted {
                        lock,
                        previous,
                        audit,
                    });
                }

                let held = slot.get().clone();
                drop(slot);
                if held.holder == request.holder {
                    tracing::debug!(device_id = %held.device_id, holder = %held.holder, "lock already held");
                    return Ok(AcquireOutcome::AlreadyHeld(held));
                }

                self.stats.record_denied();
                tracing::warn!(
                    device_id = %held.device_id,
                    requester = %request.holder,
                    holder = %held.holder,
                    held_type = %held.lock_type,
                    held_priority = held.priority,
                    "lock denied"
                );
                Ok(AcquireOutcome::Denied(held))
            }
        }
    }

    /// Releases the lock if `holder` owns it. Returns `false` otherwise, with
    /// the lock untouched.
    pub fn release(&self, device_id: &str, holder: &str) -> InterlockResult<bool> {
        require_id("deviceId", device_id)?;
        require_id("holder", holder)?;

        match self.locks.entry(device_id.to_string()) {
            Entry::Vacant(_) => Ok(false),
            Entry::Occupied(slot) => {
                self.check_entry(slot.key(), slot.get())?;
                if slot.get().holder != holder {
                    let owner = slot.get().holder.clone();
                    drop(slot);
                    tracing::warn!(device_id, holder, owner = %owner, "release by non-owner refused");
                    return Ok(false);
                }
                slot.remove();
                self.stats.record_terminated(Termination::Released);
                tracing::info!(device_id, holder, "lock released");
                Ok(true)
            }
        }
    }

    /// Clears any lock on the device. `None` when it was already unlocked.
    pub fn force_release(
        &self,
        device_id: &str,
        reason: &str,
        operator: &str,
        now: DateTime<Utc>,
    ) -> InterlockResult<Option<AuditEvent>> {
        require_id("deviceId", device_id)?;

        let previous = match self.locks.entry(device_id.to_string()) {
            Entry::Vacant(_) => None,
            Entry::Occupied(slot) => {
                self.check_entry(slot.key(), slot.get())?;
                Some(slot.remove().with_state(LockState::ForceReleased))
            }
        };

        let Some(previous) = previous else {
            tracing::debug!(device_id, operator, "force release on unlocked device");
            return Ok(None);
        };

        self.stats.record_terminated(Termination::ForceReleased);
        tracing::info!(
            device_id,
            operator,
            reason,
            previous_holder = %previous.holder,
            "lock force-released"
        );
        Ok(Some(AuditEvent::for_lock(
            AuditKind::ForceRelease,
            &previous,
            reason,
            operator,
            now,
        )))
    }

    /// Unlocks on behalf of `holder` acting with `claim`: its own lock is
    /// released, a weaker holder's lock is revoked, a stronger one is left
    /// alone.
    pub fn revoke(
        &self,
        device_id: &str,
        holder: &str,
        claim: Claim,
        now: DateTime<Utc>,
    ) -> InterlockResult<Revocation> {
        require_id("deviceId", device_id)?;

        let slot = match self.locks.entry(device_id.to_string()) {
            Entry::Vacant(_) => return Ok(Revocation::Vacant),
            Entry::Occupied(slot) => slot,
        };
        self.check_entry(slot.key(), slot.get())?;

        if slot.get().holder == holder {
            let own = slot.remove().with_state(LockState::Released);
            self.stats.record_terminated(Termination::Released);
            tracing::info!(device_id, holder, "lock released by rule");
            return Ok(Revocation::Released(own));
        }

        if !claim.outranks(&slot.get().claim()) {
            let held = slot.get().clone();
            drop(slot);
            self.stats.record_denied();
            tracing::warn!(device_id, actor = holder, holder = %held.holder, "rule unlock denied");
            return Ok(Revocation::Denied(held));
        }

        let previous = slot.remove().with_state(LockState::ForceReleased);
        self.stats.record_terminated(Termination::ForceReleased);
        tracing::info!(device_id, actor = holder, previous_holder = %previous.holder, "lock revoked by rule");
        let audit = AuditEvent::for_lock(
            AuditKind::RuleRevocation,
            &previous,
            "revoked by interlock rule",
            holder,
            now,
        );
        Ok(Revocation::Revoked { previous, audit })
    }

    /// Puts a displaced lock back during batch rollback.
    ///
    /// Fills a vacant slot unconditionally. An occupied slot is replaced only
    /// when `over_holder` names its current holder; otherwise someone else got
    /// there first and the slot is left alone (`false`).
    pub fn reinstate(&self, previous: DeviceLock, over_holder: Option<&str>) -> InterlockResult<bool> {
        let lock = previous.with_state(LockState::Locked);
        let device_id = lock.device_id.clone();

        match self.locks.entry(device_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(lock);
                self.stats.record_installed(&device_id);
            }
            Entry::Occupied(mut slot) => {
                self.check_entry(slot.key(), slot.get())?;
                if over_holder != Some(slot.get().holder.as_str()) {
                    let current = slot.get().holder.clone();
                    drop(slot);
                    tracing::warn!(device_id = %device_id, current = %current, "reinstate skipped, slot taken");
                    return Ok(false);
                }
                slot.insert(lock);
                self.stats.record_terminated(Termination::Released);
                self.stats.record_installed(&device_id);
            }
        }
        tracing::info!(device_id = %device_id, "lock reinstated");
        Ok(true)
    }

    /// Moves a past-due lock to `EXPIRED`. Only the sweeper calls this.
    pub fn expire(&self, device_id: &str, now: DateTime<Utc>) -> InterlockResult<Option<DeviceLock>> {
        match self.locks.entry(device_id.to_string()) {
            Entry::Vacant(_) => Ok(None),
            Entry::Occupied(slot) => {
                self.check_entry(slot.key(), slot.get())?;
                if !slot.get().is_expired_at(now) {
                    return Ok(None);
                }
                let expired = slot.remove().with_state(LockState::Expired);
                self.stats.record_terminated(Termination::Expired);
                tracing::info!(device_id, holder = %expired.holder, "lock expired");
                Ok(Some(expired))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn status(&self, device_id: &str) -> InterlockResult<LockStatus> {
        require_id("deviceId", device_id)?;
        let status = match self.locks.get(device_id) {
            Some(lock) => {
                self.check_entry(lock.key(), lock.value())?;
                LockStatus::Locked(lock.value().clone())
            }
            None => LockStatus::Unlocked {
                device_id: device_id.to_string(),
            },
        };
        tracing::debug!(device_id, locked = status.is_locked(), "status read");
        Ok(status)
    }

    /// The lock that would stop `holder` acting on the device with `claim`.
    pub fn peek_blocker(&self, device_id: &str, holder: &str, claim: Claim) -> Option<DeviceLock> {
        let held = self.locks.get(device_id)?;
        if held.holder == holder || claim.outranks(&held.claim()) {
            return None;
        }
        Some(held.value().clone())
    }

    /// Devices whose lock is past due at `now`. Shard guards are released
    /// before returning.
    pub fn expiry_candidates(&self, now: DateTime<Utc>) -> Vec<String> {
        self.locks
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Every held lock, ordered by device id.
    pub fn snapshot_all(&self) -> Vec<DeviceLock> {
        let mut locks: Vec<DeviceLock> = self.locks.iter().map(|e| e.value().clone()).collect();
        locks.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        locks
    }

    pub fn active_count(&self) -> usize {
        self.locks.len()
    }

    fn check_entry(&self, key: &str, lock: &DeviceLock) -> InterlockResult<()> {
        if lock.is_locked() && lock.device_id == key {
            return Ok(());
        }
        self.stats.record_invariant_violation();
        tracing::error!(
            device_id = key,
            stored_device = %lock.device_id,
            state = ?lock.state,
            "registry entry is not a LOCKED lock for its key"
        );
        Err(InterlockError::InvariantViolation(format!(
            "entry for '{key}' holds {:?} lock for '{}'",
            lock.state, lock.device_id
        )))
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, key: &str, lock: DeviceLock) {
        self.locks.insert(key.to_string(), lock);
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new(Arc::new(StatisticsCollector::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use interlock_core::LockType;

    fn req(device: &str, lock_type: LockType, holder: &str, priority: i32) -> LockRequest {
        LockRequest::new(device, lock_type, holder).priority(priority)
    }

    #[test]
    fn grant_then_deny_equal_priority() {
        let registry = LockRegistry::default();
        let now = Utc::now();

        let first = registry
            .acquire(&req("door-1", LockType::Business, "alice", 5), now)
            .unwrap();
        assert!(first.granted());

        let second = registry
            .acquire(&req("door-1", LockType::Business, "bob", 5), now)
            .unwrap();
        assert!(!second.granted());
        assert_eq!(second.current_holder(), "alice");
        assert_eq!(registry.stats().snapshot().denied_requests, 1);
    }

    #[test]
    fn safety_preempts_and_reports_previous() {
        let registry = LockRegistry::default();
        let now = Utc::now();
        registry
            .acquire(&req("door-1", LockType::Business, "alice", 1), now)
            .unwrap();

        let outcome = registry
            .acquire(&req("door-1", LockType::Safety, "fire-system", 9), now)
            .unwrap();
        match outcome {
            AcquireOutcome::Preempted {
                lock,
                previous,
                audit,
            } => {
                assert_eq!(lock.holder, "fire-system");
                assert_eq!(previous.holder, "alice");
                assert_eq!(previous.state, LockState::ForceReleased);
                assert_eq!(audit.reason, PREEMPTION_REASON);
                assert_eq!(audit.kind, AuditKind::Preemption);
            }
            other => panic!("expected preemption, got {other:?}"),
        }

        let snap = registry.stats().snapshot();
        assert_eq!(snap.preemption_count, 1);
        assert_eq!(snap.active_lock_count, 1);
    }

    #[test]
    fn own_lock_reported_as_already_held() {
        let registry = LockRegistry::default();
        let now = Utc::now();
        registry
            .acquire(&req("door-1", LockType::Business, "alice", 5), now)
            .unwrap();
        let again = registry
            .acquire(&req("door-1", LockType::Business, "alice", 5), now)
            .unwrap();
        assert!(matches!(again, AcquireOutcome::AlreadyHeld(_)));
        assert!(!again.granted());
    }

    #[test]
    fn own_stronger_claim_upgrades_in_place() {
        let registry = LockRegistry::default();
        let now = Utc::now();
        registry
            .acquire(&req("door-1", LockType::Business, "alice", 5), now)
            .unwrap();

        let outcome = registry
            .acquire(&req("door-1", LockType::Safety, "alice", 1), now)
            .unwrap();
        match &outcome {
            AcquireOutcome::Upgraded { lock, previous } => {
                assert_eq!(lock.lock_type, LockType::Safety);
                assert_eq!(previous.lock_type, LockType::Business);
                assert_eq!(previous.holder, "alice");
            }
            other => panic!("expected upgrade, got {other:?}"),
        }
        assert!(outcome.granted());

        let snap = registry.stats().snapshot();
        assert_eq!(snap.preemption_count, 0);
        assert_eq!(snap.active_lock_count, 1);
        assert_eq!(snap.device_lock_count, 1);
        match registry.status("door-1").unwrap() {
            LockStatus::Locked(lock) => assert_eq!(lock.priority, 1),
            other => panic!("expected locked, got {other:?}"),
        }
    }

    #[test]
    fn release_requires_owner() {
        let registry = LockRegistry::default();
        let now = Utc::now();
        registry
            .acquire(&req("door-1", LockType::Business, "alice", 5), now)
            .unwrap();

        assert!(!registry.release("door-1", "bob").unwrap());
        assert!(registry.status("door-1").unwrap().is_locked());
        assert!(registry.release("door-1", "alice").unwrap());
        assert!(!registry.status("door-1").unwrap().is_locked());
        assert!(!registry.release("door-1", "alice").unwrap());
    }

    #[test]
    fn force_release_is_idempotent() {
        let registry = LockRegistry::default();
        let now = Utc::now();
        registry
            .acquire(&req("door-1", LockType::Safety, "fire-system", 1), now)
            .unwrap();

        let audit = registry
            .force_release("door-1", "drill over", "ops", now)
            .unwrap()
            .unwrap();
        assert_eq!(audit.previous_holder, "fire-system");
        assert!(registry
            .force_release("door-1", "drill over", "ops", now)
            .unwrap()
            .is_none());
        assert_eq!(registry.stats().snapshot().force_release_count, 1);
    }

    #[test]
    fn expire_only_when_past_due() {
        let registry = LockRegistry::default();
        let now = Utc::now();
        registry
            .acquire(
                &req("door-2", LockType::Business, "carol", 5).timeout_ms(5000),
                now,
            )
            .unwrap();

        assert!(registry.expiry_candidates(now).is_empty());
        assert!(registry.expire("door-2", now).unwrap().is_none());

        let later = now + Duration::seconds(6);
        assert_eq!(registry.expiry_candidates(later), vec!["door-2".to_string()]);
        let expired = registry.expire("door-2", later).unwrap().unwrap();
        assert_eq!(expired.state, LockState::Expired);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn revoke_respects_claims() {
        let registry = LockRegistry::default();
        let now = Utc::now();
        registry
            .acquire(&req("door-1", LockType::Safety, "fire-system", 1), now)
            .unwrap();
        registry
            .acquire(&req("door-2", LockType::Business, "alice", 5), now)
            .unwrap();

        let weak = Claim::new(LockType::Business, 1);
        assert!(matches!(
            registry.revoke("door-1", "rules", weak, now).unwrap(),
            Revocation::Denied(_)
        ));
        assert!(matches!(
            registry.revoke("door-2", "rules", weak, now).unwrap(),
            Revocation::Revoked { .. }
        ));
        assert!(matches!(
            registry.revoke("door-3", "rules", weak, now).unwrap(),
            Revocation::Vacant
        ));
        assert!(matches!(
            registry.revoke("door-1", "fire-system", weak, now).unwrap(),
            Revocation::Released(_)
        ));
    }

    #[test]
    fn reinstate_only_over_named_holder() {
        let registry = LockRegistry::default();
        let now = Utc::now();
        registry
            .acquire(&req("door-1", LockType::Business, "alice", 5), now)
            .unwrap();
        let previous = match registry
            .acquire(&req("door-1", LockType::Business, "rules", 1), now)
            .unwrap()
        {
            AcquireOutcome::Preempted { previous, .. } => previous,
            other => panic!("expected preemption, got {other:?}"),
        };

        assert!(!registry.reinstate(previous.clone(), Some("bob")).unwrap());
        assert!(registry.reinstate(previous, Some("rules")).unwrap());
        let status = registry.status("door-1").unwrap();
        assert_eq!(status.holder(), Some("alice"));
    }

    #[test]
    fn corrupted_entry_surfaces_invariant_violation() {
        let registry = LockRegistry::default();
        let now = Utc::now();
        let lock = DeviceLock::from_request(&req("door-9", LockType::Business, "x", 5), now)
            .with_state(LockState::Released);
        registry.insert_raw("door-9", lock);

        let err = registry
            .acquire(&req("door-9", LockType::Business, "y", 5), now)
            .unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(registry.stats().snapshot().invariant_violations, 1);
    }

    #[test]
    fn blank_ids_rejected_before_mutation() {
        let registry = LockRegistry::default();
        let now = Utc::now();
        assert!(registry
            .acquire(&req("", LockType::Business, "alice", 5), now)
            .is_err());
        assert!(registry.release("door-1", " ").is_err());
        assert_eq!(registry.stats().snapshot().total_lock_requests, 0);
    }
}
