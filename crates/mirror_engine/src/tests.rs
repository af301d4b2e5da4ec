// Include tests
#[cfg(test)]
mod tests {
    use crate::config::{flags, EntityLayout};
    use crate::entity::EntityRegistry;
    use crate::visibility::{AimSource, PriorityTier, VisibilityEngine};
    use crate::{EngineError, MirrorConfig, WorldSession};
    use async_trait::async_trait;
    use mirror_core::{
        BatchExecutor, BoneId, LineOfSight, ReadError, ReadRequest, RemoteAddr, RemoteMemory,
        SessionCleanup, SessionId, SessionPhase, Vec3, WorldSource,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const LOCAL: RemoteAddr = RemoteAddr(0x9000);

    /// Scripted remote memory: a flat address -> bytes map plus a request
    /// log for asserting on read traffic.
    struct FakeMemory {
        cells: Mutex<HashMap<u64, Vec<u8>>>,
        log: Mutex<Vec<ReadRequest>>,
    }

    impl FakeMemory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                cells: Mutex::new(HashMap::new()),
                log: Mutex::new(Vec::new()),
            })
        }

        fn put(&self, addr: u64, bytes: Vec<u8>) {
            self.cells.lock().unwrap().insert(addr, bytes);
        }

        fn put_u32(&self, addr: u64, value: u32) {
            self.put(addr, value.to_le_bytes().to_vec());
        }

        fn put_u64(&self, addr: u64, value: u64) {
            self.put(addr, value.to_le_bytes().to_vec());
        }

        fn put_vec3(&self, addr: u64, v: Vec3) {
            let mut bytes = Vec::with_capacity(12);
            bytes.extend_from_slice(&(v.x as f32).to_le_bytes());
            bytes.extend_from_slice(&(v.y as f32).to_le_bytes());
            bytes.extend_from_slice(&(v.z as f32).to_le_bytes());
            self.put(addr, bytes);
        }

        fn requests(&self) -> Vec<ReadRequest> {
            self.log.lock().unwrap().clone()
        }

        fn clear_log(&self) {
            self.log.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl RemoteMemory for FakeMemory {
        async fn read_many(
            &self,
            requests: &[ReadRequest],
        ) -> Result<Vec<Option<Vec<u8>>>, ReadError> {
            self.log.lock().unwrap().extend_from_slice(requests);
            let cells = self.cells.lock().unwrap();
            Ok(requests
                .iter()
                .map(|r| cells.get(&r.addr).cloned())
                .collect())
        }
    }

    /// Scripted world source: a mutable entity list, a switchable identity
    /// confirmation and a fixed local viewer address.
    struct FakeSource {
        entities: Mutex<Vec<RemoteAddr>>,
        identity_ok: AtomicBool,
    }

    impl FakeSource {
        fn new(entities: Vec<RemoteAddr>) -> Arc<Self> {
            Arc::new(Self {
                entities: Mutex::new(entities),
                identity_ok: AtomicBool::new(true),
            })
        }

        fn set_entities(&self, entities: Vec<RemoteAddr>) {
            *self.entities.lock().unwrap() = entities;
        }

        fn set_identity_ok(&self, ok: bool) {
            self.identity_ok.store(ok, Ordering::Release);
        }
    }

    #[async_trait]
    impl WorldSource for FakeSource {
        async fn observed_entities(&self) -> Result<Vec<RemoteAddr>, ReadError> {
            Ok(self.entities.lock().unwrap().clone())
        }

        async fn confirm_identity(&self) -> Result<bool, ReadError> {
            Ok(self.identity_ok.load(Ordering::Acquire))
        }

        fn local_entity(&self) -> RemoteAddr {
            LOCAL
        }
    }

    struct AlwaysClear;

    impl LineOfSight for AlwaysClear {
        fn is_clear(&self, _from: Vec3, _to: Vec3) -> bool {
            true
        }
    }

    /// Line-of-sight scripted by a predicate over the tested point.
    struct FnLos<F: Fn(Vec3, Vec3) -> bool + Send + Sync>(F);

    impl<F: Fn(Vec3, Vec3) -> bool + Send + Sync> LineOfSight for FnLos<F> {
        fn is_clear(&self, from: Vec3, to: Vec3) -> bool {
            (self.0)(from, to)
        }
    }

    struct CountingCleanup {
        calls: AtomicU32,
    }

    impl CountingCleanup {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Acquire)
        }
    }

    impl SessionCleanup for CountingCleanup {
        fn on_session_ended(&self, _session: SessionId) {
            self.calls.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn bone_addr(layout: &EntityLayout, base: u64, index: usize) -> u64 {
        base + layout.bones_offset + index as u64 * layout.bone_stride + layout.bone_position_offset
    }

    fn install_bones(memory: &FakeMemory, layout: &EntityLayout, base: u64, position: Vec3) {
        for i in 0..BoneId::SAMPLE_ORDER.len() {
            memory.put_vec3(bone_addr(layout, base, i), position);
        }
    }

    /// Installs a full entity in remote memory: pose, flags, gear, held
    /// item and all sampled attachment points at the entity's position.
    fn install_entity(memory: &FakeMemory, layout: &EntityLayout, base: u64, position: Vec3) {
        memory.put_vec3(base + layout.position_offset, position);
        memory.put_vec3(base + layout.facing_offset, Vec3::new(1.0, 0.0, 0.0));
        memory.put_u32(base + layout.flags_offset, flags::ACTIVE | flags::ALIVE);
        memory.put_u32(base + layout.gear_offset, 0);
        memory.put_u64(base + layout.held_item_offset, 1);
        install_bones(memory, layout, base, position);
    }

    /// Installs the local viewer's aim-source block: origin at the world
    /// origin, aiming down +x, no lock.
    fn install_aim_block(memory: &FakeMemory, layout: &EntityLayout, locked: u64) {
        memory.put_vec3(LOCAL.0 + layout.aim_origin_offset, Vec3::ZERO);
        memory.put_vec3(LOCAL.0 + layout.aim_direction_offset, Vec3::new(1.0, 0.0, 0.0));
        memory.put_u64(LOCAL.0 + layout.aim_target_offset, locked);
    }

    /// Registry pre-populated for direct engine tests: one live entity per
    /// (base, position) pair, flagged active and alive.
    fn seeded_registry(
        config: &MirrorConfig,
        entities: &[(u64, Vec3)],
    ) -> Arc<EntityRegistry> {
        let registry = Arc::new(EntityRegistry::new(&config.registry));
        let observed: Vec<RemoteAddr> = entities.iter().map(|(b, _)| RemoteAddr(*b)).collect();
        registry.refresh(&observed).expect("refresh failed");
        for (base, position) in entities {
            let handle = registry.get(RemoteAddr(*base)).expect("missing handle");
            handle.set_flags(true, true, false);
            handle.set_pose(*position, Vec3::new(1.0, 0.0, 0.0));
        }
        registry
    }

    fn forward_aim() -> AimSource {
        AimSource {
            origin: Vec3::ZERO,
            direction: Vec3::new(1.0, 0.0, 0.0),
            locked_target: None,
        }
    }

    async fn wait_for_ended(session: &WorldSession) {
        for _ in 0..300 {
            if session.phase() == SessionPhase::Ended {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session did not reach Ended in time");
    }

    // ---- visibility engine ----

    #[tokio::test(flavor = "multi_thread")]
    async fn aim_locked_target_gets_tier_zero_and_full_samples() {
        let config = MirrorConfig::default();
        let memory = FakeMemory::new();
        let executor = BatchExecutor::new(memory.clone());

        // Well past the hard cutoff; the lock still wins.
        let base = 0x10000u64;
        let position = Vec3::new(500.0, 0.0, 0.0);
        let registry = seeded_registry(&config, &[(base, position)]);
        registry.get(RemoteAddr(base)).unwrap().set_aim_locked(true);
        install_bones(&memory, &config.layout, base, position);

        let mut engine = VisibilityEngine::new(
            config.visibility.clone(),
            config.layout.clone(),
            Arc::new(AlwaysClear),
        );
        let mut aim = forward_aim();
        aim.locked_target = Some(RemoteAddr(base));

        let stats = engine
            .run_pass(&registry, &executor, aim, LOCAL)
            .await
            .unwrap();

        assert_eq!(stats.candidates, 1);
        assert_eq!(stats.culled, 0);
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.sampled_points, BoneId::SAMPLE_ORDER.len());
        assert_eq!(memory.requests().len(), BoneId::SAMPLE_ORDER.len());

        let record = engine.record(RemoteAddr(base)).expect("missing record");
        assert_eq!(record.tier, PriorityTier::AimLocked);
        assert_eq!(record.sample_count, BoneId::SAMPLE_ORDER.len());
        assert!(registry.get(RemoteAddr(base)).unwrap().is_visible());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn previously_visible_far_entity_promotes_to_close_tier() {
        let config = MirrorConfig::default();
        let memory = FakeMemory::new();
        let executor = BatchExecutor::new(memory.clone());

        let base = 0x10000u64;
        let position = Vec3::new(200.0, 0.0, 0.0);
        let registry = seeded_registry(&config, &[(base, position)]);
        install_bones(&memory, &config.layout, base, position);

        let mut engine = VisibilityEngine::new(
            config.visibility.clone(),
            config.layout.clone(),
            Arc::new(AlwaysClear),
        );

        let first = engine
            .run_pass(&registry, &executor, forward_aim(), LOCAL)
            .await
            .unwrap();
        assert_eq!(first.dispatched, 1);
        assert_eq!(
            engine.record(RemoteAddr(base)).unwrap().tier,
            PriorityTier::Far
        );

        // Past the close-tier interval, so the reclassified entity is due.
        tokio::time::sleep(Duration::from_millis(15)).await;
        let second = engine
            .run_pass(&registry, &executor, forward_aim(), LOCAL)
            .await
            .unwrap();
        assert_eq!(second.dispatched, 1);

        let record = engine.record(RemoteAddr(base)).unwrap();
        assert_eq!(record.tier, PriorityTier::Close);
        assert_eq!(record.sample_count, BoneId::SAMPLE_ORDER.len());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_check_timestamps_never_move_backwards() {
        let config = MirrorConfig::default();
        let memory = FakeMemory::new();
        let executor = BatchExecutor::new(memory.clone());

        let base = 0x10000u64;
        let position = Vec3::new(10.0, 0.0, 0.0);
        let registry = seeded_registry(&config, &[(base, position)]);
        install_bones(&memory, &config.layout, base, position);

        let mut engine = VisibilityEngine::new(
            config.visibility.clone(),
            config.layout.clone(),
            Arc::new(AlwaysClear),
        );

        let mut checks = Vec::new();
        for _ in 0..3 {
            engine
                .run_pass(&registry, &executor, forward_aim(), LOCAL)
                .await
                .unwrap();
            checks.push(
                engine
                    .record(RemoteAddr(base))
                    .and_then(|r| r.last_check)
                    .expect("no check recorded"),
            );
            tokio::time::sleep(Duration::from_millis(12)).await;
        }

        assert!(checks[0] < checks[1]);
        assert!(checks[1] < checks[2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn beyond_cutoff_is_culled_without_remote_reads() {
        let config = MirrorConfig::default();
        let memory = FakeMemory::new();
        let executor = BatchExecutor::new(memory.clone());

        let base = 0x10000u64;
        let position = Vec3::new(400.0, 0.0, 0.0);
        let registry = seeded_registry(&config, &[(base, position)]);
        install_bones(&memory, &config.layout, base, position);

        let mut engine = VisibilityEngine::new(
            config.visibility.clone(),
            config.layout.clone(),
            Arc::new(AlwaysClear),
        );
        let stats = engine
            .run_pass(&registry, &executor, forward_aim(), LOCAL)
            .await
            .unwrap();

        assert_eq!(stats.candidates, 0);
        assert_eq!(stats.culled, 1);
        assert_eq!(stats.dispatched, 0);
        assert!(memory.requests().is_empty());

        // Marked not-visible this pass, but no bookkeeping record is kept.
        let handle = registry.get(RemoteAddr(base)).unwrap();
        assert!(!handle.is_visible());
        assert!(handle.visibility_updated_at().is_some());
        assert!(engine.record(RemoteAddr(base)).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn immediate_rerun_dispatches_nothing() {
        let config = MirrorConfig::default();
        let memory = FakeMemory::new();
        let executor = BatchExecutor::new(memory.clone());

        // One aim-locked (zero-interval tier) and one close entity; both
        // must still gate on an immediate re-run.
        let locked = 0x10000u64;
        let close = 0x20000u64;
        let registry = seeded_registry(
            &config,
            &[
                (locked, Vec3::new(5.0, 0.0, 0.0)),
                (close, Vec3::new(10.0, 0.0, 0.0)),
            ],
        );
        registry.get(RemoteAddr(locked)).unwrap().set_aim_locked(true);
        install_bones(&memory, &config.layout, locked, Vec3::new(5.0, 0.0, 0.0));
        install_bones(&memory, &config.layout, close, Vec3::new(10.0, 0.0, 0.0));

        let mut engine = VisibilityEngine::new(
            config.visibility.clone(),
            config.layout.clone(),
            Arc::new(AlwaysClear),
        );
        let mut aim = forward_aim();
        aim.locked_target = Some(RemoteAddr(locked));

        let first = engine.run_pass(&registry, &executor, aim, LOCAL).await.unwrap();
        assert_eq!(first.dispatched, 2);
        memory.clear_log();

        let second = engine.run_pass(&registry, &executor, aim, LOCAL).await.unwrap();
        assert_eq!(second.candidates, 2);
        assert_eq!(second.dispatched, 0);
        assert!(memory.requests().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn neck_visibility_inherits_to_head() {
        let config = MirrorConfig::default();
        let memory = FakeMemory::new();
        let executor = BatchExecutor::new(memory.clone());

        let base = 0x10000u64;
        let position = Vec3::new(10.0, 1.0, 0.0);
        let registry = seeded_registry(&config, &[(base, position)]);
        // Neck pokes above the scripted wall, everything else is behind it.
        install_bones(&memory, &config.layout, base, position);
        memory.put_vec3(bone_addr(&config.layout, base, 0), Vec3::new(10.0, 5.0, 0.0));

        let mut engine = VisibilityEngine::new(
            config.visibility.clone(),
            config.layout.clone(),
            Arc::new(FnLos(|_from: Vec3, to: Vec3| to.y > 2.0)),
        );
        engine
            .run_pass(&registry, &executor, forward_aim(), LOCAL)
            .await
            .unwrap();

        let handle = registry.get(RemoteAddr(base)).unwrap();
        assert!(handle.is_visible());
        assert!(handle.is_bone_visible(BoneId::Neck));
        // Head is never sampled; it inherits from the neck.
        assert!(handle.is_bone_visible(BoneId::Head));
        assert!(!handle.is_bone_visible(BoneId::ForearmLeft));
        assert!(!handle.is_bone_visible(BoneId::PalmLeft));
        assert!(!handle.is_bone_visible(BoneId::Pelvis));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn aim_lock_tightens_cap_and_orders_dispatch() {
        let config = MirrorConfig::default();
        let memory = FakeMemory::new();
        let executor = BatchExecutor::new(memory.clone());
        let layout = config.layout.clone();

        // Ten candidates: the locked target, one previously-visible entity
        // and eight far-band entities competing for the remaining slots.
        let locked = 0x10000u64;
        let prev = 0x20000u64;
        let far_bases: Vec<u64> = (0..8).map(|i| 0x30000u64 + i * 0x1000).collect();

        let mut entities = vec![
            (locked, Vec3::new(5.0, 0.0, 0.0)),
            (prev, Vec3::new(50.0, 0.0, 0.0)),
        ];
        for (i, base) in far_bases.iter().enumerate() {
            // Out past the cutoff for the seeding pass.
            entities.push((*base, Vec3::new(400.0 + i as f64, 0.0, 0.0)));
        }
        let registry = seeded_registry(&config, &entities);
        registry.get(RemoteAddr(locked)).unwrap().set_aim_locked(true);
        for (base, position) in &entities {
            install_bones(&memory, &layout, *base, *position);
        }

        let mut engine = VisibilityEngine::new(
            config.visibility.clone(),
            layout.clone(),
            Arc::new(AlwaysClear),
        );
        let mut aim = forward_aim();
        aim.locked_target = Some(RemoteAddr(locked));

        // Seeding pass: the locked and medium-band entities become
        // previously-visible; the far eight are culled unread.
        let seed = engine.run_pass(&registry, &executor, aim, LOCAL).await.unwrap();
        assert_eq!(seed.dispatched, 2);
        assert_eq!(seed.culled, 8);

        // The eight move inside the far band.
        for (i, base) in far_bases.iter().enumerate() {
            let position = Vec3::new(200.0 + i as f64, 0.0, 0.0);
            registry
                .get(RemoteAddr(*base))
                .unwrap()
                .set_pose(position, Vec3::new(1.0, 0.0, 0.0));
            install_bones(&memory, &layout, *base, position);
        }
        memory.clear_log();
        tokio::time::sleep(Duration::from_millis(15)).await;

        let stats = engine.run_pass(&registry, &executor, aim, LOCAL).await.unwrap();
        assert_eq!(stats.candidates, 10);
        assert_eq!(stats.dispatched, config.visibility.pass_cap_aim_locked);
        assert_eq!(stats.sampled_points, 18);

        // Dispatch order: locked target (7 points), previously-visible
        // entity (full sampling while a lock exists, 7 points), then the
        // two nearest far entities at 2 points each.
        let mut expected = Vec::new();
        for i in 0..7 {
            expected.push(bone_addr(&layout, locked, i));
        }
        for i in 0..7 {
            expected.push(bone_addr(&layout, prev, i));
        }
        for base in &far_bases[..2] {
            for i in 0..2 {
                expected.push(bone_addr(&layout, *base, i));
            }
        }
        let actual: Vec<u64> = memory.requests().iter().map(|r| r.addr).collect();
        assert_eq!(actual, expected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_failure_fails_closed() {
        let config = MirrorConfig::default();
        let memory = FakeMemory::new();
        let executor = BatchExecutor::new(memory.clone());

        // No bone cells installed: every sampled read fails.
        let base = 0x10000u64;
        let registry = seeded_registry(&config, &[(base, Vec3::new(10.0, 0.0, 0.0))]);

        let mut engine = VisibilityEngine::new(
            config.visibility.clone(),
            config.layout.clone(),
            Arc::new(AlwaysClear),
        );
        let stats = engine
            .run_pass(&registry, &executor, forward_aim(), LOCAL)
            .await
            .unwrap();
        assert_eq!(stats.dispatched, 1);

        let handle = registry.get(RemoteAddr(base)).unwrap();
        assert!(!handle.is_visible());
        assert!(handle.visibility_updated_at().is_some());
        assert!(!engine.record(RemoteAddr(base)).unwrap().last_visible);
    }

    // ---- lifecycle ----

    fn session_fixture() -> (Arc<FakeMemory>, Arc<FakeSource>, Arc<CountingCleanup>, MirrorConfig) {
        let config = MirrorConfig::default();
        let memory = FakeMemory::new();
        let first = 0x10000u64;
        let second = 0x20000u64;
        install_entity(&memory, &config.layout, first, Vec3::new(10.0, 0.0, 0.0));
        install_entity(&memory, &config.layout, second, Vec3::new(20.0, 0.0, 0.0));
        install_aim_block(&memory, &config.layout, 0);
        let source = FakeSource::new(vec![RemoteAddr(first), RemoteAddr(second)]);
        (memory, source, CountingCleanup::new(), config)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_runs_cleanup_exactly_once() {
        let (memory, source, cleanup, config) = session_fixture();
        let session = WorldSession::connect(
            config,
            memory,
            source,
            Arc::new(AlwaysClear),
            vec![cleanup.clone()],
        )
        .await
        .expect("connect failed");
        assert_eq!(session.phase(), SessionPhase::Active);

        session.start().await.expect("start failed");
        tokio::time::sleep(Duration::from_millis(50)).await;

        session.shutdown().await;
        assert_eq!(session.phase(), SessionPhase::Ended);
        assert_eq!(cleanup.calls(), 1);
        assert_eq!(session.registry().count(), 0);

        // A second disposal is a no-op.
        session.shutdown().await;
        assert_eq!(cleanup.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_liveness_failures_end_the_session() {
        let (memory, source, cleanup, mut config) = session_fixture();
        config.cadence.interactables_ms = 10;
        config.lifecycle.liveness_failure_threshold = 3;

        let session = WorldSession::connect(
            config,
            memory,
            source.clone(),
            Arc::new(AlwaysClear),
            vec![cleanup.clone()],
        )
        .await
        .expect("connect failed");
        session.start().await.expect("start failed");

        source.set_identity_ok(false);
        wait_for_ended(&session).await;
        session.join_loops().await;
        assert_eq!(cleanup.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn implausible_entity_count_ends_the_session() {
        let (memory, source, cleanup, config) = session_fixture();
        let max = config.registry.max_entities;

        let session = WorldSession::connect(
            config,
            memory,
            source.clone(),
            Arc::new(AlwaysClear),
            vec![cleanup.clone()],
        )
        .await
        .expect("connect failed");
        session.start().await.expect("start failed");

        // A corrupt read of the entity list yields an out-of-range count.
        source.set_entities(
            (0..max as u64 + 1)
                .map(|i| RemoteAddr(0x100000 + i * 0x1000))
                .collect(),
        );
        wait_for_ended(&session).await;
        session.join_loops().await;
        assert_eq!(cleanup.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_after_shutdown_is_refused() {
        let (memory, source, cleanup, config) = session_fixture();
        let session = WorldSession::connect(
            config,
            memory,
            source,
            Arc::new(AlwaysClear),
            vec![cleanup.clone()],
        )
        .await
        .expect("connect failed");

        session.shutdown().await;
        assert_eq!(cleanup.calls(), 1);

        // Nothing gets scheduled; the refusal is surfaced to the caller.
        let result = session.start().await;
        assert!(matches!(result, Err(EngineError::SessionEnded)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.phase(), SessionPhase::Ended);
        assert_eq!(session.registry().count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn misc_cadence_refreshes_world_object_block() {
        let (memory, source, cleanup, config) = session_fixture();
        let block = vec![0xAB; config.layout.world_object_block_len];
        memory.put(config.layout.world_object_block_addr, block.clone());

        let session = WorldSession::connect(
            config,
            memory,
            source,
            Arc::new(AlwaysClear),
            vec![cleanup],
        )
        .await
        .expect("connect failed");
        session.start().await.expect("start failed");

        tokio::time::sleep(Duration::from_millis(120)).await;
        let first = session.world_state().world_objects();
        assert_eq!(first.bytes, block);
        assert!(first.captured_at_ms > 0);

        // The cell keeps refreshing on the misc cadence.
        tokio::time::sleep(Duration::from_millis(120)).await;
        let second = session.world_state().world_objects();
        assert!(second.captured_at_ms > first.captured_at_ms);

        session.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connect_gives_up_after_bounded_startup_retries() {
        let mut config = MirrorConfig::default();
        config.lifecycle.startup_retry_ms = 5;
        config.lifecycle.startup_max_retries = 3;
        let memory = FakeMemory::new();
        let source = FakeSource::new(Vec::new());

        let result = WorldSession::connect(
            config,
            memory,
            source,
            Arc::new(AlwaysClear),
            Vec::new(),
        )
        .await;
        assert!(matches!(result, Err(EngineError::Internal(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn session_mirrors_remote_world_end_to_end() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let (memory, source, cleanup, config) = session_fixture();
        let first = RemoteAddr(0x10000);
        let second = RemoteAddr(0x20000);

        let session = WorldSession::connect(
            config,
            memory,
            source,
            Arc::new(AlwaysClear),
            vec![cleanup.clone()],
        )
        .await
        .expect("connect failed");
        session.start().await.expect("start failed");

        // Let every loop complete at least one pass.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let snapshots = session.snapshot();
        assert_eq!(snapshots.len(), 2);
        for snapshot in &snapshots {
            assert!(snapshot.active);
            assert!(snapshot.alive);
            assert!(snapshot.visible, "entity {} never resolved visible", snapshot.addr);
        }
        let first_pos = snapshots
            .iter()
            .find(|s| s.addr == first)
            .unwrap()
            .position;
        assert!((first_pos.x - 10.0).abs() < 1e-6);
        let held = session.registry().get(second).unwrap().held_item();
        assert_eq!(held, 1);

        let json = snapshots[0].to_json();
        assert!(json.get("addr").is_some());
        assert!(json.get("visible").is_some());

        session.shutdown().await;
        assert_eq!(session.phase(), SessionPhase::Ended);
        assert_eq!(cleanup.calls(), 1);
    }
}
