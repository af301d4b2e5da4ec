//! Per-entity visibility bookkeeping.
//!
//! One ephemeral [`VisRecord`] per eligible entity gates how often that
//! entity is re-checked. The map is owned and mutated by the single loop
//! that drives the visibility engine; nothing here is shared across
//! threads.

use super::tiers::PriorityTier;
use mirror_core::RemoteAddr;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Ephemeral per-entity visibility bookkeeping.
#[derive(Debug, Clone)]
pub struct VisRecord {
    /// Distance from the aim-source at last classification
    pub distance: f64,
    /// Angular offset from the aim direction at last classification
    pub angle_deg: f64,
    /// Assigned priority tier
    pub tier: PriorityTier,
    /// Attachment points sampled for this entity
    pub sample_count: usize,
    /// Minimum interval between remote checks
    pub min_interval: Duration,
    /// Completion time of the last resolved check, if any
    pub last_check: Option<Instant>,
    /// Result of the last resolved check
    pub last_visible: bool,
    /// Last time anything touched this record; drives the staleness sweep
    touched: Instant,
}

impl VisRecord {
    /// Whether the entity is eligible for a remote check at `now`.
    ///
    /// Strictly more than the minimum interval must have elapsed, so a
    /// pass re-run at zero elapsed time gates everything it just checked.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_check {
            None => true,
            Some(checked) => now.duration_since(checked) > self.min_interval,
        }
    }
}

/// The engine's record map plus sweep bookkeeping.
#[derive(Debug)]
pub(crate) struct RecordMap {
    records: HashMap<RemoteAddr, VisRecord>,
    last_sweep: Instant,
}

impl RecordMap {
    pub(crate) fn new() -> Self {
        Self {
            records: HashMap::new(),
            last_sweep: Instant::now(),
        }
    }

    /// Updates (or creates) the record for a classified candidate,
    /// preserving its check history. Touches the record.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn classify_touch(
        &mut self,
        addr: RemoteAddr,
        distance: f64,
        angle_deg: f64,
        tier: PriorityTier,
        sample_count: usize,
        min_interval: Duration,
        now: Instant,
    ) {
        self.records
            .entry(addr)
            .and_modify(|r| {
                r.distance = distance;
                r.angle_deg = angle_deg;
                r.tier = tier;
                r.sample_count = sample_count;
                r.min_interval = min_interval;
                r.touched = now;
            })
            .or_insert(VisRecord {
                distance,
                angle_deg,
                tier,
                sample_count,
                min_interval,
                last_check: None,
                last_visible: false,
                touched: now,
            });
    }

    /// Records a resolved check. `completed` is the callback-completion
    /// time, not the dispatch time; the stored timestamp never moves
    /// backwards.
    pub(crate) fn mark_checked(&mut self, addr: RemoteAddr, visible: bool, completed: Instant) {
        if let Some(record) = self.records.get_mut(&addr) {
            let monotone = match record.last_check {
                Some(prev) => prev.max(completed),
                None => completed,
            };
            record.last_check = Some(monotone);
            record.last_visible = visible;
            record.touched = monotone;
        }
    }

    pub(crate) fn get(&self, addr: RemoteAddr) -> Option<&VisRecord> {
        self.records.get(&addr)
    }

    /// Whether the entity was visible at its last resolved check.
    pub(crate) fn was_visible(&self, addr: RemoteAddr) -> bool {
        self.records
            .get(&addr)
            .map(|r| r.last_visible)
            .unwrap_or(false)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Runs the staleness purge when `sweep_interval` has elapsed since
    /// the last sweep. Returns how many records were purged.
    pub(crate) fn maybe_sweep(
        &mut self,
        now: Instant,
        sweep_interval: Duration,
        ttl: Duration,
    ) -> usize {
        if now.duration_since(self.last_sweep) < sweep_interval {
            return 0;
        }
        self.last_sweep = now;
        let before = self.records.len();
        self.records
            .retain(|_, r| now.duration_since(r.touched) <= ttl);
        let purged = before - self.records.len();
        if purged > 0 {
            debug!("purged {} stale visibility records", purged);
        }
        purged
    }

    #[cfg(test)]
    pub(crate) fn backdate_touch(&mut self, addr: RemoteAddr, age: Duration) {
        if let Some(record) = self.records.get_mut(&addr) {
            if let Some(past) = Instant::now().checked_sub(age) {
                record.touched = past;
            }
        }
    }
}
