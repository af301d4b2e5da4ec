//! # Batched Read Rounds
//!
//! The scatter/gather contract that keeps remote round-trips rare: callers
//! build [`ReadRound`]s of slot-addressed read requests, attach one
//! completion callback per round, and hand the batch to a [`BatchExecutor`]
//! which performs a single [`RemoteMemory::read_many`] round-trip for all
//! rounds together.
//!
//! Callbacks run synchronously on the executing task, strictly after every
//! slot of their round has been resolved. There is no guaranteed completion
//! order *between* slots inside a round, but a callback never observes a
//! partially-populated [`RoundResults`].

use crate::error::ReadError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// One slot-addressed remote read: `len` bytes at `addr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Caller-chosen slot the result is keyed under within its round.
    pub slot: usize,
    /// Remote address to read from.
    pub addr: u64,
    /// Number of bytes to read.
    pub len: usize,
}

type CompletionFn = Box<dyn FnOnce(&RoundResults) + Send>;

/// An ordered batch of read requests completed together.
///
/// Rounds amortize round-trip cost: every entry of every round submitted to
/// one [`BatchExecutor::execute`] call shares a single remote round-trip.
pub struct ReadRound {
    needs_fresh_address: bool,
    entries: Vec<ReadRequest>,
    on_complete: Option<CompletionFn>,
}

impl ReadRound {
    /// Begins a new round.
    ///
    /// `needs_fresh_address` signals to the remote-read collaborator that
    /// address-translation caches must be bypassed for this round (used
    /// right after a handle re-allocation).
    pub fn new(needs_fresh_address: bool) -> Self {
        Self {
            needs_fresh_address,
            entries: Vec::new(),
            on_complete: None,
        }
    }

    /// Whether this round bypasses address-translation caches.
    pub fn needs_fresh_address(&self) -> bool {
        self.needs_fresh_address
    }

    /// Registers a read of `len` bytes at `addr` under `slot`.
    ///
    /// Slots are caller-chosen and must be unique within the round.
    pub fn add_entry(&mut self, slot: usize, addr: u64, len: usize) -> Result<(), ReadError> {
        if self.entries.iter().any(|e| e.slot == slot) {
            return Err(ReadError::DuplicateSlot(slot));
        }
        self.entries.push(ReadRequest { slot, addr, len });
        Ok(())
    }

    /// Attaches the completion callback. At most one per round; a later
    /// call replaces an earlier one.
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: FnOnce(&RoundResults) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries have been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fully-populated results of one round, keyed by slot.
///
/// Every getter reports per-slot failure as an error rather than returning
/// fabricated bytes; a faulted slot poisons only itself.
pub struct RoundResults {
    slots: HashMap<usize, Option<Vec<u8>>>,
}

impl RoundResults {
    fn new(entries: &[ReadRequest], data: Vec<Option<Vec<u8>>>) -> Self {
        let slots = entries
            .iter()
            .map(|e| e.slot)
            .zip(data)
            .collect::<HashMap<_, _>>();
        Self { slots }
    }

    /// Raw bytes of a slot.
    pub fn bytes(&self, slot: usize) -> Result<&[u8], ReadError> {
        match self.slots.get(&slot) {
            None => Err(ReadError::MissingSlot(slot)),
            Some(None) => Err(ReadError::SlotFailed(slot)),
            Some(Some(data)) => Ok(data),
        }
    }

    fn fixed<const N: usize>(&self, slot: usize) -> Result<[u8; N], ReadError> {
        let data = self.bytes(slot)?;
        if data.len() < N {
            return Err(ReadError::ShortRead {
                slot,
                want: N,
                got: data.len(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&data[..N]);
        Ok(out)
    }

    /// Decodes the slot as a little-endian `u32`.
    pub fn read_u32(&self, slot: usize) -> Result<u32, ReadError> {
        Ok(u32::from_le_bytes(self.fixed::<4>(slot)?))
    }

    /// Decodes the slot as a little-endian `u64`.
    pub fn read_u64(&self, slot: usize) -> Result<u64, ReadError> {
        Ok(u64::from_le_bytes(self.fixed::<8>(slot)?))
    }

    /// Decodes the slot as a little-endian `f32`.
    pub fn read_f32(&self, slot: usize) -> Result<f32, ReadError> {
        Ok(f32::from_le_bytes(self.fixed::<4>(slot)?))
    }

    /// Decodes the slot as three packed little-endian `f32` components,
    /// widened to the engine's double-precision [`Vec3`].
    ///
    /// [`Vec3`]: crate::types::Vec3
    pub fn read_vec3(&self, slot: usize) -> Result<crate::types::Vec3, ReadError> {
        let raw = self.fixed::<12>(slot)?;
        let component = |i: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&raw[i * 4..i * 4 + 4]);
            f32::from_le_bytes(b) as f64
        };
        Ok(crate::types::Vec3::new(component(0), component(1), component(2)))
    }
}

/// The primitive remote-read collaborator.
///
/// One call is one remote round-trip regardless of how many requests it
/// carries. Per-request failure is reported positionally as `None`;
/// transport-level failure fails the whole call.
#[async_trait]
pub trait RemoteMemory: Send + Sync {
    async fn read_many(
        &self,
        requests: &[ReadRequest],
    ) -> Result<Vec<Option<Vec<u8>>>, ReadError>;
}

/// Scatter/gather executor over a [`RemoteMemory`].
///
/// Flattens every entry of every submitted round into one `read_many` call,
/// splits the results back per round and invokes each round's completion
/// callback on the calling task before returning. The blocking shape is
/// deliberate: the calling loop suspends until all of its results have been
/// written, so it never schedules a second pass over stale data.
pub struct BatchExecutor {
    memory: Arc<dyn RemoteMemory>,
}

impl BatchExecutor {
    /// Creates an executor over the given remote-memory collaborator.
    pub fn new(memory: Arc<dyn RemoteMemory>) -> Self {
        Self { memory }
    }

    /// Executes all rounds in one remote round-trip.
    ///
    /// Empty rounds still get their callback (with an empty result set);
    /// an entirely empty batch skips the round-trip.
    pub async fn execute(&self, rounds: Vec<ReadRound>) -> Result<(), ReadError> {
        let total: usize = rounds.iter().map(ReadRound::len).sum();
        let mut flat = Vec::with_capacity(total);
        for round in &rounds {
            flat.extend_from_slice(&round.entries);
        }

        let data = if flat.is_empty() {
            Vec::new()
        } else {
            let data = self.memory.read_many(&flat).await?;
            if data.len() != flat.len() {
                return Err(ReadError::Transport(format!(
                    "remote returned {} results for {} requests",
                    data.len(),
                    flat.len()
                )));
            }
            data
        };
        trace!("round-trip resolved {} slots across {} rounds", total, rounds.len());

        let mut rest = data;
        for mut round in rounds {
            let tail = rest.split_off(round.entries.len());
            let results = RoundResults::new(&round.entries, rest);
            rest = tail;
            if let Some(callback) = round.on_complete.take() {
                callback(&results);
            }
        }
        Ok(())
    }
}
