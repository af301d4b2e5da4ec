//! Entity registry: concurrent map from remote address to owned handle.
//!
//! The registry is the only owner of [`EntityHandle`]s. Scheduler loops
//! reconcile it against the observed remote list every realtime pass; all
//! five loops read it concurrently.

use super::handle::{EntityHandle, EntitySnapshot};
use crate::config::RegistryConfig;
use crate::error::EngineError;
use dashmap::DashMap;
use mirror_core::RemoteAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one reconciliation pass, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Handles created for newly observed addresses
    pub allocated: usize,
    /// Handles discarded and re-created after exceeding the fault window
    pub reallocated: usize,
}

/// Concurrent registry of mirrored entities.
pub struct EntityRegistry {
    entities: DashMap<RemoteAddr, Arc<EntityHandle>>,
    error_window: Duration,
    max_entities: usize,
}

impl EntityRegistry {
    /// Creates an empty registry with the given limits.
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            entities: DashMap::new(),
            error_window: Duration::from_millis(config.error_window_ms),
            max_entities: config.max_entities,
        }
    }

    /// Reconciles the registry against the observed remote entity list.
    ///
    /// Allocates handles for new addresses, discards and re-allocates
    /// handles whose consecutive-error timer exceeded the configured
    /// window (a faulting handle's remote layout can no longer be
    /// trusted, so it is never patched in place), and re-assigns ordinals
    /// in remote list order. Addresses absent from `observed` are
    /// retained until session disposal.
    ///
    /// An observed count above the configured maximum is a corrupt read
    /// and fails fast with [`EngineError::CorruptRead`].
    pub fn refresh(&self, observed: &[RemoteAddr]) -> Result<RefreshOutcome, EngineError> {
        if observed.len() > self.max_entities {
            return Err(EngineError::CorruptRead(format!(
                "observed entity count {} exceeds maximum {}",
                observed.len(),
                self.max_entities
            )));
        }

        let mut outcome = RefreshOutcome::default();
        for (ordinal, &addr) in observed.iter().enumerate() {
            match self.entities.get(&addr) {
                None => {
                    self.entities
                        .insert(addr, Arc::new(EntityHandle::new(addr, ordinal)));
                    outcome.allocated += 1;
                    debug!("allocated handle for entity {} (ordinal {})", addr, ordinal);
                }
                Some(existing) if existing.fault_exceeds(self.error_window) => {
                    drop(existing);
                    self.entities
                        .insert(addr, Arc::new(EntityHandle::new(addr, ordinal)));
                    outcome.reallocated += 1;
                    warn!(
                        "♻️ re-allocated handle for entity {} after sustained read faults",
                        addr
                    );
                }
                Some(existing) => {
                    existing.set_ordinal(ordinal);
                }
            }
        }
        Ok(outcome)
    }

    /// Number of registered entities.
    pub fn count(&self) -> usize {
        self.entities.len()
    }

    /// Looks up the handle for a remote address.
    pub fn get(&self, addr: RemoteAddr) -> Option<Arc<EntityHandle>> {
        self.entities.get(&addr).map(|e| Arc::clone(e.value()))
    }

    /// All registered handles, in no particular order.
    pub fn all(&self) -> Vec<Arc<EntityHandle>> {
        self.entities.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Handles that are currently both active and alive, ordered by
    /// ordinal so batched rounds stay aligned with the remote list.
    pub fn live_entities(&self) -> Vec<Arc<EntityHandle>> {
        let mut live: Vec<_> = self
            .entities
            .iter()
            .filter(|e| e.is_active() && e.is_alive())
            .map(|e| Arc::clone(e.value()))
            .collect();
        live.sort_by_key(|e| e.ordinal());
        live
    }

    /// Read-only snapshots of every registered entity, for consumers.
    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        self.entities.iter().map(|e| e.snapshot()).collect()
    }

    /// Empties the registry. Called once on session disposal.
    pub fn clear(&self) {
        self.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> EntityRegistry {
        EntityRegistry::new(&RegistryConfig::default())
    }

    #[test]
    fn allocates_new_and_retains_absent() {
        let reg = registry();
        let first = [RemoteAddr(1), RemoteAddr(2), RemoteAddr(3)];
        let outcome = reg.refresh(&first).expect("refresh");
        assert_eq!(outcome.allocated, 3);
        assert_eq!(reg.count(), 3);

        // Entity 2 vanishes from the observed list but stays registered.
        let second = [RemoteAddr(1), RemoteAddr(3)];
        let outcome = reg.refresh(&second).expect("refresh");
        assert_eq!(outcome.allocated, 0);
        assert_eq!(reg.count(), 3);
        assert!(reg.get(RemoteAddr(2)).is_some());
    }

    #[test]
    fn ordinals_follow_remote_order() {
        let reg = registry();
        reg.refresh(&[RemoteAddr(10), RemoteAddr(20)]).expect("refresh");
        // Remote order flips; ordinals follow.
        reg.refresh(&[RemoteAddr(20), RemoteAddr(10)]).expect("refresh");
        assert_eq!(reg.get(RemoteAddr(20)).expect("20").ordinal(), 0);
        assert_eq!(reg.get(RemoteAddr(10)).expect("10").ordinal(), 1);
    }

    #[test]
    fn corrupt_count_fails_fast() {
        let reg = registry();
        let observed: Vec<RemoteAddr> = (0..300).map(RemoteAddr).collect();
        assert!(matches!(
            reg.refresh(&observed),
            Err(EngineError::CorruptRead(_))
        ));
        assert_eq!(reg.count(), 0, "failed refresh allocates nothing");
    }

    #[test]
    fn empty_observed_list_is_valid() {
        let reg = registry();
        assert_eq!(reg.refresh(&[]).expect("refresh"), RefreshOutcome::default());
    }

    #[test]
    fn faulting_handle_is_reallocated_not_patched() {
        let reg = registry();
        reg.refresh(&[RemoteAddr(7)]).expect("refresh");
        let old = reg.get(RemoteAddr(7)).expect("handle");
        old.backdate_fault(Duration::from_millis(1600));

        let outcome = reg.refresh(&[RemoteAddr(7)]).expect("refresh");
        assert_eq!(outcome.reallocated, 1);
        let new = reg.get(RemoteAddr(7)).expect("handle");
        assert!(!Arc::ptr_eq(&old, &new), "handle must be a fresh allocation");
        assert!(!new.fault_exceeds(Duration::from_millis(0)));
    }

    #[test]
    fn handle_inside_fault_window_is_kept() {
        let reg = registry();
        reg.refresh(&[RemoteAddr(7)]).expect("refresh");
        let old = reg.get(RemoteAddr(7)).expect("handle");
        old.record_fault();

        let outcome = reg.refresh(&[RemoteAddr(7)]).expect("refresh");
        assert_eq!(outcome.reallocated, 0);
        assert!(Arc::ptr_eq(&old, &reg.get(RemoteAddr(7)).expect("handle")));
    }
}
