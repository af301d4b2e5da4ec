//! The visibility priority engine.
//!
//! One `run_pass` call performs the full classify → gate → order → cap →
//! dispatch → resolve sequence over the current registry contents, then does
//! its periodic housekeeping. The engine (and its record map) is owned by
//! the single loop that drives it.

use super::record::{RecordMap, VisRecord};
use super::tiers::{classify_tier, PriorityTier};
use crate::config::{EntityLayout, VisibilityConfig};
use crate::entity::{EntityHandle, EntityRegistry};
use crate::error::EngineError;
use mirror_core::{BatchExecutor, BoneId, LineOfSight, ReadRound, RemoteAddr, Vec3};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// The viewer's aim origin, direction and current lock, published by the
/// fast loop and consumed by every visibility pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct AimSource {
    pub origin: Vec3,
    pub direction: Vec3,
    /// Remote address of the aim-locked entity, if any.
    pub locked_target: Option<RemoteAddr>,
}

/// Per-pass statistics, for tracing and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Candidates that survived classification
    pub candidates: usize,
    /// Candidates culled at the hard cutoff without a remote read
    pub culled: usize,
    /// Candidates actually dispatched this pass
    pub dispatched: usize,
    /// Attachment-point reads issued
    pub sampled_points: usize,
}

struct Planned {
    handle: Arc<EntityHandle>,
    distance: f64,
    tier: PriorityTier,
    previously_visible: bool,
    sample_count: usize,
}

/// Priority-adaptive visibility engine for one session.
pub struct VisibilityEngine {
    config: VisibilityConfig,
    layout: EntityLayout,
    los: Arc<dyn LineOfSight>,
    records: RecordMap,
}

impl VisibilityEngine {
    pub fn new(
        config: VisibilityConfig,
        layout: EntityLayout,
        los: Arc<dyn LineOfSight>,
    ) -> Self {
        Self {
            config,
            layout,
            los,
            records: RecordMap::new(),
        }
    }

    /// Runs one full visibility pass over the registry.
    ///
    /// Transient per-entity failures are logged and skipped; only a failed
    /// round-trip surfaces as an error (and is transient to the caller).
    pub async fn run_pass(
        &mut self,
        registry: &EntityRegistry,
        executor: &BatchExecutor,
        aim: AimSource,
        local_viewer: RemoteAddr,
    ) -> Result<PassStats, EngineError> {
        let now = Instant::now();
        let mut stats = PassStats::default();

        let mut planned = self.classify(registry, aim, local_viewer, now, &mut stats);

        // Gate: skip entities checked more recently than their tier allows.
        planned.retain(|p| {
            self.records
                .get(p.handle.addr())
                .map(|r| r.is_due(now))
                .unwrap_or(true)
        });

        // Order: previously-visible first, then tier, then distance.
        planned.sort_by(|a, b| {
            b.previously_visible
                .cmp(&a.previously_visible)
                .then(a.tier.cmp(&b.tier))
                .then(a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal))
        });

        // Cap: tighter while an aim-locked target exists.
        let cap = if aim.locked_target.is_some() {
            self.config.pass_cap_aim_locked
        } else {
            self.config.pass_cap
        };
        planned.truncate(cap);

        if !planned.is_empty() {
            let outcomes = self.dispatch(&planned, executor, aim, &mut stats).await?;
            let completed = Instant::now();
            for (addr, visible) in outcomes {
                self.records.mark_checked(addr, visible, completed);
            }
        }

        let purged = self.records.maybe_sweep(
            Instant::now(),
            Duration::from_millis(self.config.sweep_interval_ms),
            Duration::from_millis(self.config.record_ttl_ms),
        );
        if purged > 0 {
            debug!("visibility sweep purged {} records ({} live)", purged, self.records.len());
        }
        trace!(
            "visibility pass: {} candidates, {} culled, {} dispatched, {} points",
            stats.candidates,
            stats.culled,
            stats.dispatched,
            stats.sampled_points
        );
        Ok(stats)
    }

    /// Classification step: every active living candidate gets a tier (or
    /// is culled at the hard cutoff), and its record is touched.
    fn classify(
        &mut self,
        registry: &EntityRegistry,
        aim: AimSource,
        local_viewer: RemoteAddr,
        now: Instant,
        stats: &mut PassStats,
    ) -> Vec<Planned> {
        let full_samples = BoneId::SAMPLE_ORDER.len();
        let mut planned = Vec::new();

        for handle in registry.all() {
            let addr = handle.addr();
            if addr == local_viewer || !handle.is_active() || !handle.is_alive() {
                continue;
            }

            let pose = handle.pose();
            if !pose.position.is_finite() {
                warn!("skipping entity {} with non-finite position", addr);
                continue;
            }
            let distance = aim.origin.distance(pose.position);
            let angle_deg = aim.direction.angle_to_target(aim.origin, pose.position);
            let aim_locked = handle.is_aim_locked();
            let previously_visible = self.records.was_visible(addr);

            let Some(tier) = classify_tier(
                distance,
                aim_locked,
                previously_visible,
                handle.is_ai(),
                &self.config,
            ) else {
                // Beyond the hard cutoff: not visible, zero read slots.
                stats.culled += 1;
                handle.apply_visibility(false, HashMap::new());
                continue;
            };

            let mut sample_count =
                self.config.tier_sample_counts[tier.index()].min(full_samples);
            if aim_locked {
                // The locked target always samples every point.
                sample_count = full_samples;
            } else if aim.locked_target.is_some() && previously_visible {
                // An active lock forces full sampling on the previously
                // visible entity as well.
                sample_count = self.config.tier_sample_counts[PriorityTier::Close.index()]
                    .min(full_samples);
            }

            self.records.classify_touch(
                addr,
                distance,
                angle_deg,
                tier,
                sample_count,
                Duration::from_millis(self.config.tier_interval_ms[tier.index()]),
                now,
            );
            planned.push(Planned {
                handle,
                distance,
                tier,
                previously_visible,
                sample_count,
            });
        }
        stats.candidates = planned.len();
        planned
    }

    /// Builds the pass round, executes it and resolves results onto the
    /// handles inside the round callback. Returns (addr, visible) outcomes
    /// for record bookkeeping.
    async fn dispatch(
        &self,
        planned: &[Planned],
        executor: &BatchExecutor,
        aim: AimSource,
        stats: &mut PassStats,
    ) -> Result<Vec<(RemoteAddr, bool)>, EngineError> {
        let mut round = ReadRound::new(false);
        let mut slot = 0usize;
        let mut targets: Vec<(Arc<EntityHandle>, Vec<(usize, BoneId)>)> = Vec::new();

        for p in planned {
            let base = p.handle.addr().0;
            let mut slots = Vec::with_capacity(p.sample_count);
            let mut failed = false;
            for (bone_index, bone) in BoneId::SAMPLE_ORDER
                .iter()
                .take(p.sample_count)
                .enumerate()
            {
                let addr = base
                    + self.layout.bones_offset
                    + bone_index as u64 * self.layout.bone_stride
                    + self.layout.bone_position_offset;
                if let Err(e) = round.add_entry(slot, addr, 12) {
                    // Per-entity dispatch failure: log, drop the entity,
                    // keep the pass going.
                    warn!("dispatch failed for entity {}: {}", p.handle.addr(), e);
                    failed = true;
                    break;
                }
                slots.push((slot, *bone));
                slot += 1;
            }
            if !failed {
                targets.push((Arc::clone(&p.handle), slots));
            }
        }
        stats.dispatched = targets.len();
        stats.sampled_points = slot;

        let outcomes: Arc<Mutex<Vec<(RemoteAddr, bool)>>> =
            Arc::new(Mutex::new(Vec::with_capacity(targets.len())));
        let sink = Arc::clone(&outcomes);
        let los = Arc::clone(&self.los);
        let origin = aim.origin;

        round.on_complete(move |results| {
            for (handle, slots) in targets {
                let mut bones: HashMap<BoneId, bool> = HashMap::new();
                let mut any_visible = false;
                let mut resolved = 0usize;
                let total = slots.len();

                for (slot, bone) in slots {
                    match results.read_vec3(slot) {
                        Ok(position) => {
                            resolved += 1;
                            handle.set_bone_position(bone, position);
                            let clear = los.is_clear(origin, position);
                            bones.insert(bone, clear);
                            if clear {
                                any_visible = true;
                                for inherited in bone.inherited() {
                                    bones.insert(*inherited, true);
                                }
                            }
                        }
                        Err(e) => {
                            warn!("bone read failed for entity {}: {}", handle.addr(), e);
                            handle.record_fault();
                        }
                    }
                }

                if resolved == 0 {
                    // Resolve failure: fail closed.
                    warn!(
                        "visibility resolve failed for entity {}; forcing not-visible",
                        handle.addr()
                    );
                    handle.apply_visibility(false, HashMap::new());
                    sink.lock().expect("outcome sink").push((handle.addr(), false));
                    continue;
                }
                if resolved == total {
                    handle.clear_faults();
                }
                handle.apply_visibility(any_visible, bones);
                sink.lock().expect("outcome sink").push((handle.addr(), any_visible));
            }
        });

        executor.execute(vec![round]).await?;
        let collected = std::mem::take(&mut *outcomes.lock().expect("outcome sink"));
        Ok(collected)
    }

    /// Current record for an entity, for diagnostics and tests.
    pub fn record(&self, addr: RemoteAddr) -> Option<&VisRecord> {
        self.records.get(addr)
    }

    /// Number of live visibility records.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}
