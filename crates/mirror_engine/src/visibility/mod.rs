//! Priority-adaptive visibility subsystem.
//!
//! Classifies candidates into priority tiers, gates re-checks by tier
//! interval, batches the geometric samples of a pass into one read round
//! and propagates results (with skeletal inheritance) onto entity handles.

mod engine;
mod record;
mod tiers;

pub use engine::{AimSource, PassStats, VisibilityEngine};
pub use record::VisRecord;
pub use tiers::PriorityTier;
