//! The five refresh loop bodies.
//!
//! Shared contract: cancellation is checked at the top of every iteration
//! and never mid-iteration; transient faults are logged and the pass
//! abandoned (retried next iteration); structural faults propagate out and
//! end the session. An in-flight executor call is never interrupted.

use super::scheduler::SyncContext;
use crate::config::flags;
use crate::error::EngineError;
use crate::visibility::{AimSource, VisibilityEngine};
use mirror_core::{ReadRound, RemoteAddr, SessionState};
use std::time::Duration;
use tokio::time::{interval, Interval};
use tracing::warn;

/// Waits for the next tick, or returns `true` when cancellation was raised
/// during the wait. The wait sits between passes, so cancellation still
/// never interrupts a pass mid-iteration.
async fn tick_or_cancelled(ticker: &mut Interval, session: &SessionState) -> bool {
    tokio::select! {
        _ = ticker.tick() => session.is_cancelled(),
        _ = session.cancelled() => true,
    }
}

/// Realtime loop: adaptive cadence, as fast as permitted.
///
/// Reconciles the registry against the observed remote list, refreshes
/// position/facing of all active living entities in one batched round,
/// then drives one visibility pass. Re-iterates immediately after a pass
/// that did work; throttles when the world is empty.
pub(crate) async fn realtime_loop(
    ctx: &SyncContext,
    mut engine: VisibilityEngine,
) -> Result<(), EngineError> {
    let throttle = Duration::from_millis(ctx.config.cadence.realtime_throttle_ms.max(1));
    loop {
        if ctx.session.is_cancelled() {
            break;
        }
        match realtime_pass(ctx, &mut engine).await {
            Ok(true) => tokio::task::yield_now().await,
            Ok(false) => tokio::time::sleep(throttle).await,
            Err(e) if e.is_transient() => {
                warn!("realtime pass abandoned: {}", e);
                tokio::time::sleep(throttle).await;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn realtime_pass(
    ctx: &SyncContext,
    engine: &mut VisibilityEngine,
) -> Result<bool, EngineError> {
    let observed = ctx.world.observed_entities().await?;
    let outcome = ctx.registry.refresh(&observed)?;

    let live = ctx.registry.live_entities();
    if live.is_empty() {
        return Ok(false);
    }

    let layout = &ctx.config.layout;
    // Freshly re-allocated handles must not be read through stale
    // address-translation caches.
    let mut round = ReadRound::new(outcome.reallocated > 0);
    for (i, entity) in live.iter().enumerate() {
        round.add_entry(i * 2, entity.addr().0 + layout.position_offset, 12)?;
        round.add_entry(i * 2 + 1, entity.addr().0 + layout.facing_offset, 12)?;
    }
    let targets = live.clone();
    round.on_complete(move |results| {
        for (i, handle) in targets.iter().enumerate() {
            match (results.read_vec3(i * 2), results.read_vec3(i * 2 + 1)) {
                (Ok(position), Ok(facing)) => {
                    handle.set_pose(position, facing);
                    handle.clear_faults();
                }
                _ => handle.record_fault(),
            }
        }
    });
    ctx.executor.execute(vec![round]).await?;

    let aim = ctx.state.aim();
    engine
        .run_pass(&ctx.registry, &ctx.executor, aim, ctx.world.local_entity())
        .await?;
    Ok(true)
}

/// Misc loop, fixed 50ms: transform validation, flags, gear and the
/// delegated world-object state block.
pub(crate) async fn misc_loop(ctx: &SyncContext) -> Result<(), EngineError> {
    let mut ticker = interval(Duration::from_millis(ctx.config.cadence.misc_ms));
    loop {
        if ctx.session.is_cancelled() {
            break;
        }
        if tick_or_cancelled(&mut ticker, &ctx.session).await {
            break;
        }
        match misc_pass(ctx).await {
            Ok(()) => {}
            Err(e) if e.is_transient() => warn!("misc pass abandoned: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn misc_pass(ctx: &SyncContext) -> Result<(), EngineError> {
    let all = ctx.registry.all();

    // Transform validation: a pose that went non-finite means the handle's
    // remote layout is suspect.
    for handle in &all {
        let pose = handle.pose();
        if !pose.position.is_finite() || !pose.facing.is_finite() {
            warn!("entity {} failed transform validation", handle.addr());
            handle.record_fault();
        }
    }

    let layout = &ctx.config.layout;
    let mut round = ReadRound::new(false);
    for (i, entity) in all.iter().enumerate() {
        round.add_entry(i * 2, entity.addr().0 + layout.flags_offset, 4)?;
        round.add_entry(i * 2 + 1, entity.addr().0 + layout.gear_offset, 4)?;
    }
    // The delegated world-object block rides the same round; parsing it is
    // the host's concern.
    let block_slot = all.len() * 2;
    let block_len = layout.world_object_block_len;
    if block_len > 0 {
        round.add_entry(block_slot, layout.world_object_block_addr, block_len)?;
    }
    if round.is_empty() {
        return Ok(());
    }

    let targets = all;
    let state = ctx.state.clone();
    round.on_complete(move |results| {
        for (i, handle) in targets.iter().enumerate() {
            match results.read_u32(i * 2) {
                Ok(bits) => handle.set_flags(
                    bits & flags::ACTIVE != 0,
                    bits & flags::ALIVE != 0,
                    bits & flags::AI_CONTROLLED != 0,
                ),
                Err(_) => handle.record_fault(),
            }
            if let Ok(mask) = results.read_u32(i * 2 + 1) {
                handle.set_gear_mask(mask);
            }
        }
        if block_len > 0 {
            if let Ok(bytes) = results.bytes(block_slot) {
                state.set_world_objects(bytes.to_vec());
            }
        }
    });
    ctx.executor.execute(vec![round]).await?;
    Ok(())
}

/// Grenade loop, fixed 10ms: thrown-object state block.
pub(crate) async fn grenade_loop(ctx: &SyncContext) -> Result<(), EngineError> {
    let mut ticker = interval(Duration::from_millis(ctx.config.cadence.grenade_ms));
    loop {
        if ctx.session.is_cancelled() {
            break;
        }
        if tick_or_cancelled(&mut ticker, &ctx.session).await {
            break;
        }
        match block_pass(
            ctx,
            ctx.config.layout.projectile_block_addr,
            ctx.config.layout.projectile_block_len,
            true,
        )
        .await
        {
            Ok(()) => {}
            Err(e) if e.is_transient() => warn!("grenade pass abandoned: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Reads one raw block into the matching world-state cell.
async fn block_pass(
    ctx: &SyncContext,
    addr: u64,
    len: usize,
    projectiles: bool,
) -> Result<(), EngineError> {
    if len == 0 {
        return Ok(());
    }
    let mut round = ReadRound::new(false);
    round.add_entry(0, addr, len)?;
    let state = ctx.state.clone();
    round.on_complete(move |results| {
        if let Ok(bytes) = results.bytes(0) {
            if projectiles {
                state.set_projectiles(bytes.to_vec());
            } else {
                state.set_interactables(bytes.to_vec());
            }
        }
    });
    ctx.executor.execute(vec![round]).await?;
    Ok(())
}

/// Fast loop, fixed 100ms: held items plus the locally-derived aim-source.
pub(crate) async fn fast_loop(ctx: &SyncContext) -> Result<(), EngineError> {
    let mut ticker = interval(Duration::from_millis(ctx.config.cadence.fast_ms));
    loop {
        if ctx.session.is_cancelled() {
            break;
        }
        if tick_or_cancelled(&mut ticker, &ctx.session).await {
            break;
        }
        match fast_pass(ctx).await {
            Ok(()) => {}
            Err(e) if e.is_transient() => warn!("fast pass abandoned: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn fast_pass(ctx: &SyncContext) -> Result<(), EngineError> {
    let live = ctx.registry.live_entities();
    let layout = &ctx.config.layout;
    let local = ctx.world.local_entity().0;

    let mut round = ReadRound::new(false);
    for (i, entity) in live.iter().enumerate() {
        round.add_entry(i, entity.addr().0 + layout.held_item_offset, 8)?;
    }
    // Aim-source block of the local viewer rides the same round.
    let origin_slot = live.len();
    round.add_entry(origin_slot, local + layout.aim_origin_offset, 12)?;
    round.add_entry(origin_slot + 1, local + layout.aim_direction_offset, 12)?;
    round.add_entry(origin_slot + 2, local + layout.aim_target_offset, 8)?;

    let targets = live;
    let state = ctx.state.clone();
    let registry = ctx.registry.clone();
    round.on_complete(move |results| {
        for (i, handle) in targets.iter().enumerate() {
            match results.read_u64(i) {
                Ok(item) => handle.set_held_item(item),
                Err(_) => handle.record_fault(),
            }
        }

        let origin = results.read_vec3(origin_slot);
        let direction = results.read_vec3(origin_slot + 1);
        let target = results.read_u64(origin_slot + 2);
        if let (Ok(origin), Ok(direction)) = (origin, direction) {
            let locked_target = match target {
                Ok(0) | Err(_) => None,
                Ok(addr) => Some(RemoteAddr(addr)),
            };
            state.set_aim(AimSource {
                origin,
                direction,
                locked_target,
            });
            for handle in registry.all() {
                handle.set_aim_locked(locked_target == Some(handle.addr()));
            }
        }
    });
    ctx.executor.execute(vec![round]).await?;
    Ok(())
}

/// Interactables loop, fixed 750ms: slow world interactables plus the
/// session liveness confirmation.
pub(crate) async fn interactables_loop(ctx: &SyncContext) -> Result<(), EngineError> {
    let mut ticker = interval(Duration::from_millis(ctx.config.cadence.interactables_ms));
    let threshold = ctx.config.lifecycle.liveness_failure_threshold;
    let mut consecutive_failures = 0u32;
    loop {
        if ctx.session.is_cancelled() {
            break;
        }
        if tick_or_cancelled(&mut ticker, &ctx.session).await {
            break;
        }

        match ctx.world.confirm_identity().await {
            Ok(true) => consecutive_failures = 0,
            Ok(false) => {
                consecutive_failures += 1;
                warn!(
                    "liveness confirmation mismatch ({}/{})",
                    consecutive_failures, threshold
                );
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    "liveness confirmation failed ({}/{}): {}",
                    consecutive_failures, threshold, e
                );
            }
        }
        if consecutive_failures >= threshold {
            return Err(EngineError::IdentityLost);
        }

        match block_pass(
            ctx,
            ctx.config.layout.interactable_block_addr,
            ctx.config.layout.interactable_block_len,
            false,
        )
        .await
        {
            Ok(()) => {}
            Err(e) if e.is_transient() => warn!("interactables pass abandoned: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
