//! Seams for the external collaborators the engine depends on.
//!
//! Worldmirror owns none of these concerns: reading the remote entity list,
//! geometric line-of-sight testing and post-session cleanup all live behind
//! these traits in the host. Tests script them with in-memory fakes.

use crate::error::ReadError;
use crate::types::{RemoteAddr, SessionId, Vec3};
use async_trait::async_trait;

/// Source of the observed remote world: the canonical entity list plus the
/// identity check that confirms the tracked session still matches the live
/// remote world.
#[async_trait]
pub trait WorldSource: Send + Sync {
    /// Returns the remote entity list in remote order.
    ///
    /// Ordinals assigned by the registry mirror this order exactly.
    async fn observed_entities(&self) -> Result<Vec<RemoteAddr>, ReadError>;

    /// Re-reads the canonical current-world / current-local-entity identity
    /// and compares it against what this session was constructed for.
    ///
    /// `Ok(false)` means the identity no longer matches (world changed);
    /// `Err` counts as a failed confirmation as well.
    async fn confirm_identity(&self) -> Result<bool, ReadError>;

    /// Remote address of the local viewer entity, excluded from visibility
    /// candidacy.
    fn local_entity(&self) -> RemoteAddr;
}

/// Geometric visibility collaborator.
pub trait LineOfSight: Send + Sync {
    /// Point-to-point line-of-sight test.
    ///
    /// Must return `false` while uninitialized or when the result is
    /// indeterminate; the engine treats `false` as "not visible", never as
    /// an error.
    fn is_clear(&self, from: Vec3, to: Vec3) -> bool;
}

/// End-of-session cleanup hook.
///
/// Invoked exactly once per session on the transition to `Ended`; hosts hang
/// their stale-filter-group and notification-history cleanup here.
pub trait SessionCleanup: Send + Sync {
    fn on_session_ended(&self, session: SessionId);
}
