//! Error types for the remote-read contract.
//!
//! These cover the transient failure class of the engine: individual slots
//! or whole round-trips failing without implying anything structural about
//! the mirrored world.

/// Errors surfaced by batched remote reads.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The remote round-trip itself failed; no slot produced data.
    #[error("remote transport error: {0}")]
    Transport(String),

    /// A slot was registered twice in the same round.
    #[error("duplicate slot {0} in round")]
    DuplicateSlot(usize),

    /// A result was requested for a slot the round never registered.
    #[error("slot {0} was not part of the round")]
    MissingSlot(usize),

    /// The remote read for this slot faulted; no data is available.
    #[error("read failed for slot {0}")]
    SlotFailed(usize),

    /// The slot returned fewer bytes than the requested decode needs.
    #[error("short read on slot {slot}: wanted {want} bytes, got {got}")]
    ShortRead { slot: usize, want: usize, got: usize },
}
