//! Session phase and cancellation state.
//!
//! One `SessionState` is shared by all five scheduler loops, the visibility
//! engine and the lifecycle controller. It carries the tri-state session
//! phase and the single cancellation signal every loop checks at the top of
//! each iteration.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// Lifecycle phase of a mirroring session.
///
/// Transitions are strictly forward: `Starting -> Active -> Ended`. `Ended`
/// is terminal; a new world means a new session, never a reused one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    /// Constructed, but the registry has not yet confirmed a live world.
    Starting = 0,
    /// The world is confirmed live and all loops are running.
    Active = 1,
    /// The session is over; no further writes happen. Terminal.
    Ended = 2,
}

impl SessionPhase {
    fn from_u8(v: u8) -> SessionPhase {
        match v {
            0 => SessionPhase::Starting,
            1 => SessionPhase::Active,
            _ => SessionPhase::Ended,
        }
    }
}

/// Shared phase + cancellation state for one session.
///
/// Cloneable handle over atomics, so every loop holds its own copy. Phase
/// changes are monotone: an attempt to move backwards is ignored, which
/// makes `end()` safe to call from any loop that hits an unrecoverable
/// fault without coordinating with the others.
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: Arc<AtomicU8>,
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl SessionState {
    /// Creates a new session state in the `Starting` phase.
    pub fn new() -> Self {
        Self {
            phase: Arc::new(AtomicU8::new(SessionPhase::Starting as u8)),
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Current phase of the session.
    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Marks the session `Active`. Only valid from `Starting`; returns
    /// whether the transition happened.
    pub fn activate(&self) -> bool {
        let moved = self
            .phase
            .compare_exchange(
                SessionPhase::Starting as u8,
                SessionPhase::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if moved {
            info!("🌍 Session active - world confirmed live");
        }
        moved
    }

    /// Moves the session to `Ended` and raises cancellation.
    ///
    /// Idempotent. Returns `true` only for the call that performed the
    /// transition, so callers can hang exactly-once cleanup off it.
    pub fn end(&self) -> bool {
        let prev = self.phase.swap(SessionPhase::Ended as u8, Ordering::AcqRel);
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
        prev != SessionPhase::Ended as u8
    }

    /// True once cancellation has been raised.
    ///
    /// Loops check this at the top of every iteration; it never interrupts
    /// an in-flight blocking call.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// True once the session has reached the terminal phase.
    pub fn is_ended(&self) -> bool {
        self.phase() == SessionPhase::Ended
    }

    /// Resolves when cancellation is raised.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking, so a notify_waiters racing the
            // flag check cannot be missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
