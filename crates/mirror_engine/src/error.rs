//! Error types and handling for the mirror engine.
//!
//! The taxonomy follows the engine's escalation policy: transient faults
//! are caught and logged at the pass that hit them, structural faults and
//! unhandled loop errors end the whole session.

use mirror_core::ReadError;

/// Enumeration of possible engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The remote state is structurally implausible (e.g. entity count out
    /// of range); partial corruption cannot be resolved in place
    #[error("corrupt remote read: {0}")]
    CorruptRead(String),

    /// Repeated liveness confirmations failed; the tracked session no
    /// longer matches the live remote world
    #[error("remote world identity lost")]
    IdentityLost,

    /// The session has already ended; nothing was scheduled
    #[error("session ended")]
    SessionEnded,

    /// A remote read failed; transient unless it keeps recurring
    #[error("remote read error: {0}")]
    Read(#[from] ReadError),

    /// Internal engine errors with no more specific category
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Transient errors are caught per-pass and retried on the next
    /// iteration; everything else escalates and ends the session.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Read(_))
    }
}
