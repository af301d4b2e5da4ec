//! Engine configuration types and defaults.
//!
//! All tuning constants of the engine live here as plain serde structs with
//! documented defaults, so hosts can adjust cadences, bands and caps without
//! touching engine code. The defaults are the values the engine was tuned
//! against; nothing in the engine assumes them.

use serde::{Deserialize, Serialize};

/// Top-level configuration for one mirroring session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MirrorConfig {
    /// Entity registry limits and fault handling
    pub registry: RegistryConfig,

    /// Cadences of the five refresh loops
    pub cadence: CadenceConfig,

    /// Visibility priority engine tuning
    pub visibility: VisibilityConfig,

    /// Session lifecycle thresholds
    pub lifecycle: LifecycleConfig,

    /// Remote memory layout of the mirrored process
    pub layout: EntityLayout,
}

/// Entity registry limits and fault handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum plausible entity count; an observed list longer than this is
    /// a corrupt read and ends the session
    pub max_entities: usize,

    /// A handle whose consecutive-error timer exceeds this window is
    /// discarded and re-allocated rather than patched
    pub error_window_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_entities: 256,
            error_window_ms: 1500,
        }
    }
}

/// Cadences of the five refresh loops, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Throttle applied to the realtime loop when a pass found no work
    pub realtime_throttle_ms: u64,

    /// Transform validation, flags and gear refresh
    pub misc_ms: u64,

    /// Thrown-object state refresh
    pub grenade_ms: u64,

    /// Held-item and aim-source refresh
    pub fast_ms: u64,

    /// Slow-changing world interactables refresh (also carries the
    /// liveness confirmation)
    pub interactables_ms: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            realtime_throttle_ms: 1,
            misc_ms: 50,
            grenade_ms: 10,
            fast_ms: 100,
            interactables_ms: 750,
        }
    }
}

/// Visibility priority engine tuning.
///
/// Tier indices run 0 (highest priority) to 4 (lowest); `tier_interval_ms`
/// and `tier_sample_counts` are indexed by tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// Maximum candidates processed per pass
    pub pass_cap: usize,

    /// Pass cap while an aim-locked target exists
    pub pass_cap_aim_locked: usize,

    /// Minimum re-check interval per tier, in milliseconds
    pub tier_interval_ms: [u64; 5],

    /// Attachment points sampled per tier, trimmed from the front of the
    /// anatomical-importance order
    pub tier_sample_counts: [usize; 5],

    /// Outer edge of the close band
    pub close_range: f64,

    /// Outer edge of the medium band
    pub medium_range: f64,

    /// Hard cutoff: beyond this an entity is marked not-visible without a
    /// remote read
    pub far_range: f64,

    /// Wall-clock spacing of the stale-record sweep
    pub sweep_interval_ms: u64,

    /// Records untouched longer than this are purged by the sweep
    pub record_ttl_ms: u64,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            pass_cap: 8,
            pass_cap_aim_locked: 4,
            tier_interval_ms: [0, 8, 32, 128, 512],
            tier_sample_counts: [7, 7, 4, 2, 1],
            close_range: 40.0,
            medium_range: 120.0,
            far_range: 300.0,
            sweep_interval_ms: 5000,
            record_ttl_ms: 10_000,
        }
    }
}

/// Session lifecycle thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Consecutive failed identity confirmations before the session ends
    pub liveness_failure_threshold: u32,

    /// Delay between startup attempts while waiting for a live world
    pub startup_retry_ms: u64,

    /// Maximum startup attempts (0 = retry until cancelled)
    pub startup_max_retries: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            liveness_failure_threshold: 5,
            startup_retry_ms: 250,
            startup_max_retries: 0,
        }
    }
}

/// Remote memory layout of the mirrored process.
///
/// Field offsets are relative to an entity's base address. These are a
/// property of the remote build, not of this crate; the defaults match the
/// build the engine was developed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityLayout {
    /// Packed f32 triple: entity position
    pub position_offset: u64,

    /// Packed f32 triple: entity facing direction
    pub facing_offset: u64,

    /// u32 bitfield: bit 0 active, bit 1 alive, bit 2 AI-controlled
    pub flags_offset: u64,

    /// u64: held-item identifier
    pub held_item_offset: u64,

    /// u32: equipped gear mask
    pub gear_offset: u64,

    /// Base of the bone transform array
    pub bones_offset: u64,

    /// Stride between consecutive bone transforms
    pub bone_stride: u64,

    /// Offset of the packed f32 position triple inside a bone transform
    pub bone_position_offset: u64,

    /// Offsets inside the local viewer entity for the aim-source block
    pub aim_origin_offset: u64,
    pub aim_direction_offset: u64,

    /// u64: remote address of the aim-locked entity, zero when unlocked
    pub aim_target_offset: u64,

    /// Absolute address and length of the thrown-object state block
    pub projectile_block_addr: u64,
    pub projectile_block_len: usize,

    /// Absolute address and length of the delegated world-object state
    /// block (quest and loot state parsed by the host, never here)
    pub world_object_block_addr: u64,
    pub world_object_block_len: usize,

    /// Absolute address and length of the world-interactables block
    pub interactable_block_addr: u64,
    pub interactable_block_len: usize,
}

impl Default for EntityLayout {
    fn default() -> Self {
        Self {
            position_offset: 0x30,
            facing_offset: 0x3C,
            flags_offset: 0x48,
            held_item_offset: 0x50,
            gear_offset: 0x58,
            bones_offset: 0x80,
            bone_stride: 0x30,
            bone_position_offset: 0x24,
            aim_origin_offset: 0x160,
            aim_direction_offset: 0x16C,
            aim_target_offset: 0x178,
            projectile_block_addr: 0x1000,
            projectile_block_len: 512,
            world_object_block_addr: 0x3000,
            world_object_block_len: 768,
            interactable_block_addr: 0x2000,
            interactable_block_len: 1024,
        }
    }
}

/// Entity flag bits within the layout's flags field.
pub mod flags {
    pub const ACTIVE: u32 = 1 << 0;
    pub const ALIVE: u32 = 1 << 1;
    pub const AI_CONTROLLED: u32 = 1 << 2;
}
