//! Entity handle: the local read model of one mirrored entity.
//!
//! A handle is owned exclusively by the registry; scheduler loops and the
//! visibility engine receive `Arc<EntityHandle>` references for the length
//! of one pass. Fields are partitioned by writer loop (realtime writes the
//! pose, fast writes held-item state, misc writes flags and gear, the
//! visibility resolve callback writes visibility), so each guarded group
//! has exactly one writer and the guards are uncontended. Readers accept
//! eventually-consistent cross-field snapshots.

use mirror_core::{current_timestamp_ms, BoneId, RemoteAddr, Vec3};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

/// Position and facing of an entity. Written only by the realtime loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pose {
    pub position: Vec3,
    pub facing: Vec3,
}

/// Visibility state written only by the resolve callback.
#[derive(Debug, Default)]
struct VisibilityFlags {
    visible: bool,
    bones: HashMap<BoneId, bool>,
    updated_at: Option<Instant>,
}

/// The local mirror of one remote entity.
#[derive(Debug)]
pub struct EntityHandle {
    addr: RemoteAddr,
    /// Stable ordinal matching remote list order, re-assigned each refresh.
    ordinal: AtomicUsize,

    // Flag group: misc loop writer (aim_locked: fast loop writer).
    active: AtomicBool,
    alive: AtomicBool,
    is_ai: AtomicBool,
    aim_locked: AtomicBool,

    // Writer-partitioned field groups.
    pose: RwLock<Pose>,
    skeleton: RwLock<HashMap<BoneId, Vec3>>,
    held_item: RwLock<u64>,
    gear_mask: RwLock<u32>,
    visibility: RwLock<VisibilityFlags>,

    /// Start of the current run of consecutive read faults, if any.
    fault_started: Mutex<Option<Instant>>,
}

impl EntityHandle {
    /// Creates a fresh handle for a newly observed remote address.
    pub fn new(addr: RemoteAddr, ordinal: usize) -> Self {
        Self {
            addr,
            ordinal: AtomicUsize::new(ordinal),
            active: AtomicBool::new(false),
            alive: AtomicBool::new(false),
            is_ai: AtomicBool::new(false),
            aim_locked: AtomicBool::new(false),
            pose: RwLock::new(Pose::default()),
            skeleton: RwLock::new(HashMap::new()),
            held_item: RwLock::new(0),
            gear_mask: RwLock::new(0),
            visibility: RwLock::new(VisibilityFlags::default()),
            fault_started: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> RemoteAddr {
        self.addr
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal.load(Ordering::Acquire)
    }

    pub(crate) fn set_ordinal(&self, ordinal: usize) {
        self.ordinal.store(ordinal, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn is_ai(&self) -> bool {
        self.is_ai.load(Ordering::Acquire)
    }

    /// True when this entity is the viewer's current aim-locked target.
    pub fn is_aim_locked(&self) -> bool {
        self.aim_locked.load(Ordering::Acquire)
    }

    pub(crate) fn set_flags(&self, active: bool, alive: bool, is_ai: bool) {
        self.active.store(active, Ordering::Release);
        self.alive.store(alive, Ordering::Release);
        self.is_ai.store(is_ai, Ordering::Release);
    }

    pub(crate) fn set_aim_locked(&self, locked: bool) {
        self.aim_locked.store(locked, Ordering::Release);
    }

    /// Current pose. Cross-field consistency with other groups is eventual.
    pub fn pose(&self) -> Pose {
        *self.pose.read().expect("pose lock poisoned")
    }

    pub(crate) fn set_pose(&self, position: Vec3, facing: Vec3) {
        *self.pose.write().expect("pose lock poisoned") = Pose { position, facing };
    }

    /// Last observed position of a skeletal attachment point.
    pub fn bone_position(&self, bone: BoneId) -> Option<Vec3> {
        self.skeleton
            .read()
            .expect("skeleton lock poisoned")
            .get(&bone)
            .copied()
    }

    pub(crate) fn set_bone_position(&self, bone: BoneId, position: Vec3) {
        self.skeleton
            .write()
            .expect("skeleton lock poisoned")
            .insert(bone, position);
    }

    pub fn held_item(&self) -> u64 {
        *self.held_item.read().expect("held_item lock poisoned")
    }

    pub(crate) fn set_held_item(&self, item: u64) {
        *self.held_item.write().expect("held_item lock poisoned") = item;
    }

    pub fn gear_mask(&self) -> u32 {
        *self.gear_mask.read().expect("gear lock poisoned")
    }

    pub(crate) fn set_gear_mask(&self, mask: u32) {
        *self.gear_mask.write().expect("gear lock poisoned") = mask;
    }

    /// Aggregate visibility: OR of all tested attachment points from the
    /// most recent resolve.
    pub fn is_visible(&self) -> bool {
        self.visibility.read().expect("visibility lock poisoned").visible
    }

    /// Per-attachment-point visibility from the most recent resolve.
    pub fn is_bone_visible(&self, bone: BoneId) -> bool {
        self.visibility
            .read()
            .expect("visibility lock poisoned")
            .bones
            .get(&bone)
            .copied()
            .unwrap_or(false)
    }

    /// When the visibility group was last written, if ever.
    pub fn visibility_updated_at(&self) -> Option<Instant> {
        self.visibility.read().expect("visibility lock poisoned").updated_at
    }

    /// Writes a resolve result: aggregate flag, per-point flags and the
    /// completion timestamp. The timestamp is taken here, at write time,
    /// which keeps it monotone per entity.
    pub(crate) fn apply_visibility(&self, visible: bool, bones: HashMap<BoneId, bool>) {
        let mut vis = self.visibility.write().expect("visibility lock poisoned");
        vis.visible = visible;
        vis.bones = bones;
        vis.updated_at = Some(Instant::now());
    }

    /// Records one read fault, starting the consecutive-error timer if it
    /// is not already running.
    pub(crate) fn record_fault(&self) {
        let mut started = self.fault_started.lock().expect("fault lock poisoned");
        if started.is_none() {
            *started = Some(Instant::now());
        }
    }

    /// Clears the consecutive-error timer after a clean read.
    pub(crate) fn clear_faults(&self) {
        *self.fault_started.lock().expect("fault lock poisoned") = None;
    }

    /// True when the entity has been faulting continuously for longer than
    /// `window`; the registry responds by re-allocating the handle.
    pub fn fault_exceeds(&self, window: Duration) -> bool {
        self.fault_started
            .lock()
            .expect("fault lock poisoned")
            .map(|started| started.elapsed() > window)
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub(crate) fn backdate_fault(&self, age: Duration) {
        *self.fault_started.lock().expect("fault lock poisoned") =
            Instant::now().checked_sub(age);
    }

    /// Consumer-facing snapshot of whatever is currently stored.
    pub fn snapshot(&self) -> EntitySnapshot {
        let pose = self.pose();
        let vis = self.visibility.read().expect("visibility lock poisoned");
        EntitySnapshot {
            addr: self.addr,
            ordinal: self.ordinal(),
            active: self.is_active(),
            alive: self.is_alive(),
            is_ai: self.is_ai(),
            aim_locked: self.is_aim_locked(),
            position: pose.position,
            facing: pose.facing,
            visible: vis.visible,
            visible_bones: vis
                .bones
                .iter()
                .filter(|(_, v)| **v)
                .map(|(b, _)| *b)
                .collect(),
            captured_at_ms: current_timestamp_ms(),
        }
    }
}

/// Read-only view of an entity for out-of-scope consumers.
///
/// Consumers read whatever is currently stored; there is no call that waits
/// for fresh data.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySnapshot {
    pub addr: RemoteAddr,
    pub ordinal: usize,
    pub active: bool,
    pub alive: bool,
    pub is_ai: bool,
    pub aim_locked: bool,
    pub position: Vec3,
    pub facing: Vec3,
    pub visible: bool,
    pub visible_bones: Vec<BoneId>,
    pub captured_at_ms: u64,
}

impl EntitySnapshot {
    /// JSON rendering for out-of-process consumers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
