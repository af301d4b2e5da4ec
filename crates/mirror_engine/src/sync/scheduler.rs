//! Shared loop state and loop spawning.

use super::loops;
use crate::config::MirrorConfig;
use crate::entity::EntityRegistry;
use crate::lifecycle::SessionGuard;
use crate::visibility::{AimSource, VisibilityEngine};
use mirror_core::{current_timestamp_ms, BatchExecutor, SessionState, WorldSource};
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::error;

/// A raw remote state block mirrored as-is.
///
/// Semantic parsing of these blocks (quests, loot, projectiles) is
/// delegated to out-of-scope consumers; the engine only keeps them fresh.
#[derive(Debug, Clone, Default)]
pub struct RawBlock {
    pub bytes: Vec<u8>,
    pub captured_at_ms: u64,
}

/// Session-scoped world state written by the loops and read by consumers.
///
/// Each cell has exactly one writer loop (fast → aim, grenade →
/// projectiles, misc → world objects, interactables → interactables),
/// mirroring the entity handle's writer-partitioning rule.
#[derive(Debug, Default)]
pub struct WorldState {
    aim: RwLock<AimSource>,
    projectiles: RwLock<RawBlock>,
    world_objects: RwLock<RawBlock>,
    interactables: RwLock<RawBlock>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest published aim-source.
    pub fn aim(&self) -> AimSource {
        *self.aim.read().expect("aim lock poisoned")
    }

    pub(crate) fn set_aim(&self, aim: AimSource) {
        *self.aim.write().expect("aim lock poisoned") = aim;
    }

    pub fn projectiles(&self) -> RawBlock {
        self.projectiles.read().expect("projectiles lock poisoned").clone()
    }

    pub(crate) fn set_projectiles(&self, bytes: Vec<u8>) {
        *self.projectiles.write().expect("projectiles lock poisoned") = RawBlock {
            bytes,
            captured_at_ms: current_timestamp_ms(),
        };
    }

    pub fn world_objects(&self) -> RawBlock {
        self.world_objects.read().expect("world_objects lock poisoned").clone()
    }

    pub(crate) fn set_world_objects(&self, bytes: Vec<u8>) {
        *self.world_objects.write().expect("world_objects lock poisoned") = RawBlock {
            bytes,
            captured_at_ms: current_timestamp_ms(),
        };
    }

    pub fn interactables(&self) -> RawBlock {
        self.interactables.read().expect("interactables lock poisoned").clone()
    }

    pub(crate) fn set_interactables(&self, bytes: Vec<u8>) {
        *self.interactables.write().expect("interactables lock poisoned") = RawBlock {
            bytes,
            captured_at_ms: current_timestamp_ms(),
        };
    }
}

/// Everything a loop needs, cloned once per spawned task.
#[derive(Clone)]
pub(crate) struct SyncContext {
    pub config: Arc<MirrorConfig>,
    pub registry: Arc<EntityRegistry>,
    pub executor: Arc<BatchExecutor>,
    pub world: Arc<dyn WorldSource>,
    pub state: Arc<WorldState>,
    pub session: SessionState,
    pub guard: SessionGuard,
}

/// Spawns the five refresh loops as tokio tasks.
///
/// Each task's top-level handler converts an unhandled loop error into a
/// session teardown: no error crosses a loop boundary uncaught, and no
/// in-place recovery is attempted since partial corruption of the remote
/// layout cannot be safely resolved.
pub(crate) fn spawn_loops(
    ctx: SyncContext,
    engine: VisibilityEngine,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(5);

    {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = loops::realtime_loop(&ctx, engine).await {
                error!("💥 realtime loop fault: {}", e);
                ctx.guard.end_session("realtime loop fault");
            }
        }));
    }
    {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = loops::misc_loop(&ctx).await {
                error!("💥 misc loop fault: {}", e);
                ctx.guard.end_session("misc loop fault");
            }
        }));
    }
    {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = loops::grenade_loop(&ctx).await {
                error!("💥 grenade loop fault: {}", e);
                ctx.guard.end_session("grenade loop fault");
            }
        }));
    }
    {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = loops::fast_loop(&ctx).await {
                error!("💥 fast loop fault: {}", e);
                ctx.guard.end_session("fast loop fault");
            }
        }));
    }
    {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = loops::interactables_loop(&ctx).await {
                error!("💥 interactables loop fault: {}", e);
                ctx.guard.end_session("interactables loop fault");
            }
        }));
    }

    handles
}
