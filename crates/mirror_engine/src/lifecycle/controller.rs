//! World lifecycle controller.
//!
//! `WorldSession` owns the fault/cancellation boundary of one mirroring
//! session: it confirms the world is live before going Active, spawns the
//! five refresh loops, ends the session on structural faults or explicit
//! disposal, and guarantees no writes happen after disposal.

use crate::config::MirrorConfig;
use crate::entity::{EntityRegistry, EntitySnapshot};
use crate::error::EngineError;
use crate::sync::{spawn_loops, SyncContext, WorldState};
use crate::visibility::VisibilityEngine;
use futures::stream::{FuturesUnordered, StreamExt};
use mirror_core::{
    BatchExecutor, LineOfSight, RemoteMemory, SessionCleanup, SessionId, SessionPhase,
    SessionState, WorldSource,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shared teardown handle: raises the session's cancellation and runs the
/// exactly-once cleanup hooks. Cloned into every loop so any of them can
/// end the session on an unhandled fault.
#[derive(Clone)]
pub(crate) struct SessionGuard {
    id: SessionId,
    state: SessionState,
    cleanup: Arc<Vec<Arc<dyn SessionCleanup>>>,
}

impl SessionGuard {
    pub(crate) fn end_session(&self, reason: &str) {
        // SessionState::end is idempotent and reports the actual
        // transition exactly once; cleanup hooks hang off that.
        if self.state.end() {
            info!("🛑 Session {} ended: {}", self.id, reason);
            for hook in self.cleanup.iter() {
                hook.on_session_ended(self.id);
            }
        }
    }
}

/// One mirroring session bound to one observed remote world.
///
/// Construction confirms a live world (`Starting -> Active`); `start()`
/// spawns the five refresh loops; `shutdown()` (or any structural fault)
/// moves the session to its terminal `Ended` state, joins the loops and
/// runs cleanup. A new world means a new `WorldSession`, never a reused
/// one.
pub struct WorldSession {
    id: SessionId,
    config: Arc<MirrorConfig>,
    state: SessionState,
    guard: SessionGuard,
    registry: Arc<EntityRegistry>,
    world_state: Arc<WorldState>,
    executor: Arc<BatchExecutor>,
    world: Arc<dyn WorldSource>,
    line_of_sight: Arc<dyn LineOfSight>,
    started: AtomicBool,
    loops: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WorldSession {
    /// Constructs a session and waits for the remote world to be live.
    ///
    /// Retries the initial observe/refresh cycle every
    /// `startup_retry_ms` until the registry confirms a non-zero entity
    /// count, bounded by `startup_max_retries` when that is non-zero.
    /// Returns with the session in the `Active` phase.
    pub async fn connect(
        config: MirrorConfig,
        memory: Arc<dyn RemoteMemory>,
        world: Arc<dyn WorldSource>,
        line_of_sight: Arc<dyn LineOfSight>,
        cleanup: Vec<Arc<dyn SessionCleanup>>,
    ) -> Result<Arc<WorldSession>, EngineError> {
        let id = SessionId::new();
        let config = Arc::new(config);
        let state = SessionState::new();
        let registry = Arc::new(EntityRegistry::new(&config.registry));
        let executor = Arc::new(BatchExecutor::new(memory));

        info!("🚀 Starting mirror session {}", id);

        let mut attempts = 0u32;
        loop {
            match world.observed_entities().await {
                Ok(observed) => {
                    registry.refresh(&observed)?;
                    if registry.count() > 0 {
                        break;
                    }
                }
                Err(e) => warn!("startup observation failed: {}", e),
            }
            attempts += 1;
            let max = config.lifecycle.startup_max_retries;
            if max != 0 && attempts >= max {
                return Err(EngineError::Internal(format!(
                    "no live world after {} startup attempts",
                    attempts
                )));
            }
            tokio::time::sleep(Duration::from_millis(config.lifecycle.startup_retry_ms)).await;
        }
        state.activate();

        let guard = SessionGuard {
            id,
            state: state.clone(),
            cleanup: Arc::new(cleanup),
        };
        Ok(Arc::new(WorldSession {
            id,
            config,
            state,
            guard,
            registry,
            world_state: Arc::new(WorldState::new()),
            executor,
            world,
            line_of_sight,
            started: AtomicBool::new(false),
            loops: tokio::sync::Mutex::new(Vec::new()),
        }))
    }

    /// Spawns the five refresh loops.
    ///
    /// Scheduling on an ended session schedules nothing and surfaces
    /// [`EngineError::SessionEnded`] so callers can tell why. A duplicate
    /// call on a live session is a no-op with a warning.
    pub async fn start(&self) -> Result<(), EngineError> {
        if self.state.is_ended() {
            warn!("refusing start() on ended session {}", self.id);
            return Err(EngineError::SessionEnded);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("ignoring duplicate start() on session {}", self.id);
            return Ok(());
        }

        let engine = VisibilityEngine::new(
            self.config.visibility.clone(),
            self.config.layout.clone(),
            Arc::clone(&self.line_of_sight),
        );
        let ctx = SyncContext {
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            executor: Arc::clone(&self.executor),
            world: Arc::clone(&self.world),
            state: Arc::clone(&self.world_state),
            session: self.state.clone(),
            guard: self.guard.clone(),
        };

        let handles = spawn_loops(ctx, engine);
        *self.loops.lock().await = handles;
        info!("⚙️ Session {}: five refresh loops running", self.id);
        Ok(())
    }

    /// Ends the session and joins all loops.
    ///
    /// Idempotent. Never interrupts an in-flight batched read; loops
    /// observe cancellation at the top of their next iteration.
    pub async fn shutdown(&self) {
        self.guard.end_session("explicit disposal");
        self.join_loops().await;
        self.registry.clear();
    }

    /// Waits for every spawned loop to exit.
    ///
    /// Returns immediately when `start()` was never called. Also invoked
    /// by [`WorldSession::shutdown`]; calling it directly waits for a
    /// fault-triggered teardown.
    pub async fn join_loops(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.loops.lock().await);
        if handles.is_empty() {
            return;
        }
        let mut joins: FuturesUnordered<JoinHandle<()>> = handles.into_iter().collect();
        while let Some(result) = joins.next().await {
            if let Err(e) = result {
                error!("loop task join error: {}", e);
            }
        }
        info!("✅ Session {}: all loops joined", self.id);
    }

    pub fn session_id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Registry handle for consumers that walk live entities directly.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Raw world-state cells (aim, projectiles, interactables).
    pub fn world_state(&self) -> &WorldState {
        &self.world_state
    }

    /// Read-only snapshots of every mirrored entity, as currently stored.
    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        self.registry.snapshot()
    }
}
