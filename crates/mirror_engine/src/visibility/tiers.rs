//! Priority tier classification.
//!
//! Tier ordering is load-bearing: lower tiers are re-checked more often and
//! sampled more thoroughly, and candidate ordering sorts by tier ascending.

use crate::config::VisibilityConfig;
use serde::{Deserialize, Serialize};

/// Priority classification of one visibility candidate.
///
/// Ordered 0 (highest) to 4 (lowest). The tier selects both the minimum
/// re-check interval and the attachment-point sample count for the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PriorityTier {
    /// The current aim-locked entity. Reserved: assigned iff aim-locked.
    AimLocked = 0,
    /// Previously-visible entity (regardless of distance) or close band
    Close = 1,
    /// Medium band
    Medium = 2,
    /// Far band, up to the hard cutoff
    Far = 3,
    /// Low-value (non-human-controlled) entity, regardless of distance
    LowValue = 4,
}

impl PriorityTier {
    /// Index into the per-tier configuration arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Assigns a candidate's tier, or `None` when it lies beyond the hard
/// cutoff and must be culled without a remote read.
///
/// Precedence: aim-lock wins outright; the hard cutoff culls everything
/// else; a previously-visible entity keeps at least tier 1 regardless of
/// distance or value; remaining AI entities are low-value regardless of
/// distance; the rest fall into distance bands.
pub(crate) fn classify_tier(
    distance: f64,
    aim_locked: bool,
    previously_visible: bool,
    is_ai: bool,
    config: &VisibilityConfig,
) -> Option<PriorityTier> {
    if aim_locked {
        return Some(PriorityTier::AimLocked);
    }
    if distance > config.far_range {
        return None;
    }
    if previously_visible {
        return Some(PriorityTier::Close);
    }
    if is_ai {
        return Some(PriorityTier::LowValue);
    }
    if distance <= config.close_range {
        Some(PriorityTier::Close)
    } else if distance <= config.medium_range {
        Some(PriorityTier::Medium)
    } else {
        Some(PriorityTier::Far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> VisibilityConfig {
        VisibilityConfig::default()
    }

    #[test]
    fn aim_locked_is_tier_zero_regardless_of_distance() {
        assert_eq!(
            classify_tier(9999.0, true, false, false, &cfg()),
            Some(PriorityTier::AimLocked)
        );
    }

    #[test]
    fn tier_zero_requires_aim_lock() {
        for distance in [0.0, 10.0, 100.0, 250.0] {
            for prev in [false, true] {
                assert_ne!(
                    classify_tier(distance, false, prev, false, &cfg()),
                    Some(PriorityTier::AimLocked)
                );
            }
        }
    }

    #[test]
    fn previously_visible_keeps_at_least_tier_one() {
        // Far band distance, but visible last pass.
        assert_eq!(
            classify_tier(250.0, false, true, false, &cfg()),
            Some(PriorityTier::Close)
        );
        // Even for low-value entities.
        assert_eq!(
            classify_tier(250.0, false, true, true, &cfg()),
            Some(PriorityTier::Close)
        );
    }

    #[test]
    fn beyond_cutoff_is_culled() {
        assert_eq!(classify_tier(300.1, false, false, false, &cfg()), None);
        // Cutoff beats previous visibility and value.
        assert_eq!(classify_tier(300.1, false, true, true, &cfg()), None);
    }

    #[test]
    fn distance_bands() {
        assert_eq!(
            classify_tier(10.0, false, false, false, &cfg()),
            Some(PriorityTier::Close)
        );
        assert_eq!(
            classify_tier(80.0, false, false, false, &cfg()),
            Some(PriorityTier::Medium)
        );
        assert_eq!(
            classify_tier(200.0, false, false, false, &cfg()),
            Some(PriorityTier::Far)
        );
    }

    #[test]
    fn ai_is_low_value_at_any_distance() {
        assert_eq!(
            classify_tier(5.0, false, false, true, &cfg()),
            Some(PriorityTier::LowValue)
        );
        assert_eq!(
            classify_tier(200.0, false, false, true, &cfg()),
            Some(PriorityTier::LowValue)
        );
    }
}
