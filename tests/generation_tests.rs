use dungeon_assembler::collision::CollisionBroadphase;
use dungeon_assembler::*;
use glam::Vec3;
use std::cell::RefCell;
use std::rc::Rc;

fn corridor(name: &str, half_length: f32) -> TileTemplate {
    TileTemplate::new(
        name,
        Bounds::new(Vec3::new(-1.0, 0.0, -half_length), Vec3::new(1.0, 3.0, half_length)),
    )
    .with_doorway(DoorwayTemplate::new("door", Vec3::new(0.0, 0.0, -half_length), -Vec3::Z))
    .with_doorway(DoorwayTemplate::new("door", Vec3::new(0.0, 0.0, half_length), Vec3::Z))
}

fn cross_room(name: &str) -> TileTemplate {
    TileTemplate::new(name, Bounds::new(Vec3::new(-3.0, 0.0, -3.0), Vec3::new(3.0, 3.0, 3.0)))
        .with_doorway(DoorwayTemplate::new("door", Vec3::new(0.0, 0.0, -3.0), -Vec3::Z))
        .with_doorway(DoorwayTemplate::new("door", Vec3::new(0.0, 0.0, 3.0), Vec3::Z))
        .with_doorway(DoorwayTemplate::new("door", Vec3::new(3.0, 0.0, 0.0), Vec3::X))
        .with_doorway(DoorwayTemplate::new("door", Vec3::new(-3.0, 0.0, 0.0), -Vec3::X))
}

fn catalog(name: &str, templates: &[u32]) -> TileSet {
    templates.iter().fold(TileSet::new(name), |set, t| {
        set.with_entry(TileWeight::new(TemplateId(*t), 1.0))
    })
}

fn corridor_flow(length: IntRange) -> DungeonFlow {
    DungeonFlow::single_line(
        vec![corridor("short", 2.0), corridor("medium", 3.0), corridor("long", 4.0)],
        vec![catalog("corridors", &[0, 1, 2])],
        Archetype::new("corridors", vec![0]),
        length,
    )
}

fn branching_flow() -> DungeonFlow {
    let mut archetype = Archetype::new("rooms", vec![0]);
    archetype.branch_count = IntRange::new(0, 2);
    archetype.branching_depth = IntRange::new(1, 3);
    DungeonFlow::single_line(
        vec![cross_room("room"), corridor("corridor", 4.0)],
        vec![catalog("rooms", &[0, 1])],
        archetype,
        IntRange::new(5, 8),
    )
}

fn layout(dungeon: &Dungeon) -> Vec<(u32, Vec3, bool, Option<usize>)> {
    dungeon
        .graph
        .ordered_tiles()
        .into_iter()
        .filter_map(|id| dungeon.tile(id))
        .map(|t| {
            (
                t.template.0,
                t.placement.position,
                t.placement.is_on_main_path,
                t.placement.branch_id,
            )
        })
        .collect()
}

#[test]
fn five_tile_corridor_for_seed_42() {
    let mut generator = GeneratorBuilder::new(corridor_flow(IntRange::exactly(5)))
        .seed(42)
        .build()
        .unwrap();
    let dungeon = generator.generate().unwrap();

    assert_eq!(dungeon.main_path().len(), 5);
    assert_eq!(dungeon.tile_count(), 5);
    assert_eq!(dungeon.connection_count(), 4);
    assert_eq!(dungeon.branch_count(), 0);
    dungeon.graph.validate().unwrap();

    let first = layout(dungeon);
    let mut again = GeneratorBuilder::new(corridor_flow(IntRange::exactly(5)))
        .seed(42)
        .build()
        .unwrap();
    assert_eq!(layout(again.generate().unwrap()), first);
}

#[test]
fn same_seed_same_dungeon() {
    for seed in [1, 7, 99] {
        let mut a = GeneratorBuilder::new(branching_flow()).seed(seed).build().unwrap();
        let mut b = GeneratorBuilder::new(branching_flow()).seed(seed).build().unwrap();
        let a = a.generate().unwrap();
        let b = b.generate().unwrap();
        assert_eq!(layout(a), layout(b));
        assert_eq!(a.attempts, b.attempts);
    }
}

#[test]
fn connections_are_symmetric() {
    let mut generator = GeneratorBuilder::new(branching_flow()).seed(3).build().unwrap();
    let dungeon = generator.generate().unwrap();
    let graph = &dungeon.graph;
    graph.validate().unwrap();

    for (_, connection) in graph.connections() {
        assert_eq!(graph.connected_doorway(connection.a), Some(connection.b));
        assert_eq!(graph.connected_doorway(connection.b), Some(connection.a));
        let a = graph.doorway(connection.a).unwrap();
        let b = graph.doorway(connection.b).unwrap();
        assert!((a.position - b.position).length() < 1e-3);
    }
}

#[test]
fn stepping_matches_blocking_generation() {
    let mut blocking = GeneratorBuilder::new(branching_flow()).seed(11).build().unwrap();
    let expected = layout(blocking.generate().unwrap());

    let mut stepped = GeneratorBuilder::new(branching_flow()).seed(11).build().unwrap();
    let mut yields = 0;
    let status = loop {
        match stepped.step(&CpuBudget::steps(3)) {
            StepResult::Done(status) => break status,
            StepResult::Yielded => {
                yields += 1;
                stepped.graph().validate().unwrap();
            }
            StepResult::StillRunning => unreachable!(),
        }
    };

    assert_eq!(status, GenerationStatus::Complete);
    assert!(yields > 0);
    assert_eq!(layout(stepped.dungeon().unwrap()), expected);
}

#[test]
fn empty_catalog_fails_within_attempt_budget() {
    let flow = DungeonFlow::single_line(
        vec![corridor("unused", 2.0)],
        vec![TileSet::new("empty")],
        Archetype::new("empty", vec![0]),
        IntRange::new(3, 5),
    );
    let settings = GeneratorSettings {
        max_attempts: 4,
        ..Default::default()
    };
    let mut generator = GeneratorBuilder::new(flow).settings(settings).seed(5).build().unwrap();

    match generator.generate() {
        Err(GenerateError::Failed(report)) => {
            assert_eq!(report.attempts, 4);
            assert_eq!(report.count_of(OutcomeKind::NoTemplateAvailable), 4);
            assert_eq!(report.counts[0].name, "No template available");
        }
        other => panic!("expected failure, got {:?}", other.map(|d| d.tile_count())),
    }
    assert_eq!(generator.status(), GenerationStatus::Failed);
    assert_eq!(generator.graph().tile_count(), 0);
}

#[test]
fn tight_bounds_report_out_of_bounds() {
    let settings = GeneratorSettings {
        max_attempts: 2,
        placement_bounds: Some(Bounds::new(Vec3::splat(-1.0), Vec3::splat(1.0))),
        ..Default::default()
    };
    let mut generator = GeneratorBuilder::new(corridor_flow(IntRange::exactly(3)))
        .settings(settings)
        .build()
        .unwrap();
    let err = generator.generate().unwrap_err();
    match err {
        GenerateError::Failed(report) => {
            assert_eq!(report.total(), report.count_of(OutcomeKind::OutOfBounds));
            assert!(report.to_string().contains("Out of bounds"));
        }
        GenerateError::Cancelled => panic!("not cancelled"),
    }
}

#[test]
fn main_path_grows_by_placed_injections() {
    let mut flow = corridor_flow(IntRange::exactly(4));
    flow.tile_sets.push(catalog("special", &[3]));
    flow.templates.push(corridor("special", 5.0).with_tag("special"));
    flow.injection_rules.push(TileInjectionRule::on_main_path(1, FloatRange::new(0.4, 0.6)));

    for seed in 0..10 {
        let mut generator = GeneratorBuilder::new(flow.clone()).seed(seed).build().unwrap();
        let dungeon = generator.generate().unwrap();
        let injected = dungeon
            .main_path()
            .iter()
            .filter(|id| dungeon.tile(**id).unwrap().placement.injection.is_some())
            .count();
        assert_eq!(dungeon.main_path().len(), 4 + injected);
        assert!(injected <= 1);
    }
}

#[test]
fn required_injection_survives_pruning() {
    let mut archetype = Archetype::new("rooms", vec![0]);
    archetype.branch_count = IntRange::exactly(1);
    archetype.branching_depth = IntRange::exactly(2);

    let mut flow = DungeonFlow::single_line(
        vec![cross_room("room").with_tag("prunable"), cross_room("treasure").with_tag("prunable")],
        vec![catalog("rooms", &[0]), catalog("treasure", &[1])],
        archetype,
        IntRange::exactly(4),
    );
    flow.injection_rules.push(TileInjectionRule {
        tile_set: 1,
        path_depth: FloatRange::new(0.0, 0.0),
        branch_depth: FloatRange::new(0.0, 0.0),
        can_appear_on_main_path: false,
        can_appear_on_branch: true,
        required: true,
        locked: false,
    });
    flow.branch_prune = Some(BranchPruneRule {
        mode: PruneMode::AnyTagPresent,
        tags: vec!["prunable".to_string()],
    });

    let mut generator = GeneratorBuilder::new(flow).seed(21).build().unwrap();
    let dungeon = generator.generate().unwrap();

    let branch_tiles: Vec<&TileNode> = dungeon
        .graph
        .branch_tiles()
        .map(|id| dungeon.tile(id).unwrap())
        .collect();
    assert!(branch_tiles.iter().any(|t| t.placement.injection_required));
    assert!(branch_tiles.iter().all(|t| t.placement.injection_required));
    assert_eq!(dungeon.main_path().len(), 4);
    dungeon.graph.validate().unwrap();
}

#[test]
fn global_branch_total_is_respected() {
    let mut flow = branching_flow();
    flow.branch_mode = BranchMode::Global;
    flow.global_branch_count = IntRange::exactly(3);

    for seed in 0..5 {
        let mut generator = GeneratorBuilder::new(flow.clone()).seed(seed).build().unwrap();
        let dungeon = generator.generate().unwrap();
        assert!(dungeon.branch_count() <= 3);
    }
}

#[derive(Default)]
struct Log {
    instantiated: Vec<TileId>,
    discarded: bool,
}

struct Recorder(Rc<RefCell<Log>>);

impl Materializer for Recorder {
    fn instantiate(&mut self, id: TileId, _tile: &TileNode, _template: &TileTemplate) {
        self.0.borrow_mut().instantiated.push(id);
    }

    fn discard(&mut self) {
        let mut log = self.0.borrow_mut();
        log.instantiated.clear();
        log.discarded = true;
    }
}

#[test]
fn cancellation_during_instantiation_discards() {
    let log = Rc::new(RefCell::new(Log::default()));
    let mut generator = GeneratorBuilder::new(corridor_flow(IntRange::exactly(5)))
        .seed(42)
        .materializer(Recorder(log.clone()))
        .build()
        .unwrap();

    while log.borrow().instantiated.len() < 2 {
        assert_eq!(generator.step_once(), StepResult::StillRunning);
    }
    generator.cancel_handle().cancel();

    assert_eq!(generator.step_once(), StepResult::Done(GenerationStatus::Cancelled));
    assert!(log.borrow().discarded);
    assert!(log.borrow().instantiated.is_empty());
    assert_eq!(generator.graph().tile_count(), 0);
    assert!(generator.dungeon().is_none());
    assert!(matches!(generator.generate(), Err(GenerateError::Cancelled)));
}

#[test]
fn cancel_before_start() {
    let mut generator = GeneratorBuilder::new(corridor_flow(IntRange::exactly(5))).build().unwrap();
    generator.cancel_handle().cancel();
    assert_eq!(generator.step_once(), StepResult::Done(GenerationStatus::Cancelled));
}

#[test]
fn observers_see_the_whole_run() {
    let events: Rc<RefCell<Vec<GenerationEvent>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    let log = Rc::new(RefCell::new(Log::default()));
    let mut generator = GeneratorBuilder::new(corridor_flow(IntRange::exactly(5)))
        .seed(42)
        .observer(move |event| sink.borrow_mut().push(event.clone()))
        .materializer(Recorder(log.clone()))
        .build()
        .unwrap();
    generator.generate().unwrap();

    let events = events.borrow();
    assert_eq!(events[0], GenerationEvent::AttemptStarted { attempt: 1, seed: 42 });
    assert_eq!(
        events[1],
        GenerationEvent::StatusChanged {
            from: GenerationStatus::NotStarted,
            to: GenerationStatus::TileInjection
        }
    );
    assert!(matches!(events.last(), Some(GenerationEvent::Completed { tiles: 5, .. })));

    let progress: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            GenerationEvent::TileInstantiated { done, total } => Some((*done, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
    assert_eq!(log.borrow().instantiated.len(), 5);

    let statuses: Vec<GenerationStatus> = events
        .iter()
        .filter_map(|e| match e {
            GenerationEvent::StatusChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            GenerationStatus::TileInjection,
            GenerationStatus::PreProcessing,
            GenerationStatus::MainPath,
            GenerationStatus::Branching,
            GenerationStatus::BranchPruning,
            GenerationStatus::InstantiatingTiles,
            GenerationStatus::PostProcessing,
            GenerationStatus::Complete,
        ]
    );
}

fn deny_all(_: &ProposedConnection) -> ConnectionVerdict {
    ConnectionVerdict::Deny
}

#[test]
fn custom_rule_can_forbid_everything() {
    let settings = GeneratorSettings {
        max_attempts: 2,
        ..Default::default()
    };
    let mut generator = GeneratorBuilder::new(corridor_flow(IntRange::exactly(3)))
        .settings(settings)
        .connection_rule(deny_all)
        .build()
        .unwrap();
    match generator.generate() {
        Err(GenerateError::Failed(report)) => {
            assert!(report.total() >= 2);
            assert_eq!(report.total(), report.count_of(OutcomeKind::NoValidDoorwayPairing));
        }
        _ => panic!("expected failure"),
    }
}

#[test]
fn injector_hook_adds_requests() {
    let mut flow = corridor_flow(IntRange::exactly(3));
    flow.tile_sets.push(catalog("special", &[0]));
    let calls = Rc::new(RefCell::new(0));
    let counter = calls.clone();
    let mut generator = GeneratorBuilder::new(flow)
        .seed(8)
        .injector(move |_: &mut RandomStream, requests: &mut Vec<InjectedTileRequest>| {
            *counter.borrow_mut() += 1;
            requests.push(InjectedTileRequest {
                tile_set: 1,
                is_on_main_path: true,
                normalized_path_depth: 0.0,
                normalized_branch_depth: 0.0,
                is_required: true,
                is_locked: false,
            });
        })
        .build()
        .unwrap();
    let dungeon = generator.generate().unwrap();
    assert_eq!(dungeon.main_path().len(), 4);
    let first = dungeon.tile(dungeon.main_path()[0]).unwrap();
    assert!(first.placement.injection_required);
    assert_eq!(*calls.borrow(), dungeon.attempts as usize);
}

#[test]
fn invalid_flow_is_rejected_at_build() {
    let mut flow = corridor_flow(IntRange::exactly(3));
    flow.lines[0].archetypes = vec![5];
    assert!(matches!(
        GeneratorBuilder::new(flow).build(),
        Err(FlowError::MissingReference { .. })
    ));

    let settings = GeneratorSettings {
        up_axis: Vec3::ZERO,
        ..Default::default()
    };
    assert!(matches!(
        GeneratorBuilder::new(corridor_flow(IntRange::exactly(3))).settings(settings).build(),
        Err(FlowError::ZeroUpAxis)
    ));
}

struct Tagged {
    name: &'static str,
    priority: i32,
    seen: Rc<RefCell<Vec<(&'static str, usize)>>>,
}

impl PostProcessStep for Tagged {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn run(&mut self, graph: &ProxyGraph, _rng: &mut RandomStream) {
        self.seen.borrow_mut().push((self.name, graph.tile_count()));
    }
}

#[test]
fn post_process_steps_run_by_priority() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let step = |name, priority| Tagged {
        name,
        priority,
        seen: seen.clone(),
    };
    let mut generator = GeneratorBuilder::new(corridor_flow(IntRange::exactly(5)))
        .seed(42)
        .post_process(step("late", 10))
        .post_process(step("early", -5))
        .post_process(step("default", 0))
        .build()
        .unwrap();
    generator.generate().unwrap();

    assert_eq!(*seen.borrow(), vec![("early", 5), ("default", 5), ("late", 5)]);
}

#[derive(Default)]
struct WallLog {
    live: Vec<(TileId, bool)>,
    injected_adds: usize,
    injected_removes: usize,
    other_removes: usize,
}

/// Accepts the first `limit` tiles of an attempt and rejects everything after.
struct Wall {
    limit: usize,
    log: Rc<RefCell<WallLog>>,
}

impl CollisionBroadphase for Wall {
    fn is_colliding(&self, _bounds: &Bounds, _excluding: Option<TileId>) -> bool {
        self.log.borrow().live.len() >= self.limit
    }

    fn add(&mut self, tile: TileId, bounds: &Bounds) {
        let injected = bounds.size().z > 9.0;
        let mut log = self.log.borrow_mut();
        if injected {
            log.injected_adds += 1;
        }
        log.live.push((tile, injected));
    }

    fn remove(&mut self, tile: TileId) {
        let mut log = self.log.borrow_mut();
        if let Some(i) = log.live.iter().position(|(t, _)| *t == tile) {
            let (_, injected) = log.live.remove(i);
            if injected {
                log.injected_removes += 1;
            } else {
                log.other_removes += 1;
            }
        }
    }

    fn clear(&mut self) {
        self.log.borrow_mut().live.clear();
    }
}

fn walled_flow() -> DungeonFlow {
    let mut flow = corridor_flow(IntRange::exactly(10));
    flow.templates.push(corridor("special", 5.0));
    flow.tile_sets.push(catalog("special", &[3]));
    flow.injection_rules.push(TileInjectionRule::on_main_path(1, FloatRange::new(0.5, 0.5)));
    flow
}

#[test]
fn local_backtracking_stops_at_per_attempt_limit() {
    let log = Rc::new(RefCell::new(WallLog::default()));
    let settings = GeneratorSettings {
        max_attempts: 2,
        ..Default::default()
    };
    let mut generator = GeneratorBuilder::new(walled_flow())
        .settings(settings)
        .seed(4)
        .broadphase(Wall { limit: 6, log: log.clone() })
        .build()
        .unwrap();

    let report = match generator.generate() {
        Err(GenerateError::Failed(report)) => report,
        _ => panic!("a walled main path cannot complete"),
    };

    // Slot 6 fails every time; slot 5 is removed and refilled until the
    // local limit of 5 runs out, in each of the two attempts.
    assert_eq!(generator.stats().local_backtracks, 10);
    assert_eq!(generator.attempts(), 2);
    assert!(report.count_of(OutcomeKind::CollidingWithExisting) > 0);

    // Slot 5 sits at depth 5/9, so it always holds the injected tile: every
    // removal hands the request back and the refill places it again.
    let log = log.borrow();
    assert_eq!(log.injected_removes, 10);
    assert_eq!(log.other_removes, 0);
    assert_eq!(log.injected_adds, 12);
}

#[test]
fn local_backtracking_stops_at_total_limit() {
    let log = Rc::new(RefCell::new(WallLog::default()));
    let settings = GeneratorSettings {
        max_attempts: 1,
        max_local_retries: 100,
        max_total_local_retries: 7,
        ..Default::default()
    };
    let mut generator = GeneratorBuilder::new(walled_flow())
        .settings(settings)
        .seed(4)
        .broadphase(Wall { limit: 6, log: log.clone() })
        .build()
        .unwrap();

    assert!(matches!(generator.generate(), Err(GenerateError::Failed(_))));
    assert_eq!(generator.stats().local_backtracks, 7);
    assert_eq!(log.borrow().injected_adds, 8);
}

#[test]
fn no_backtracking_below_minimum_placed() {
    let log = Rc::new(RefCell::new(WallLog::default()));
    let settings = GeneratorSettings {
        max_attempts: 1,
        ..Default::default()
    };
    let mut generator = GeneratorBuilder::new(walled_flow())
        .settings(settings)
        .broadphase(Wall { limit: 3, log })
        .build()
        .unwrap();

    assert!(generator.generate().is_err());
    assert_eq!(generator.stats().local_backtracks, 0);
}

#[test]
fn goal_node_lands_on_last_main_path_tile() {
    let mut flow = corridor_flow(IntRange::exactly(5));
    flow.templates.push(corridor("exit", 2.5));
    flow.tile_sets.push(catalog("exit", &[3]));
    flow.nodes.push(GraphNode {
        label: "goal".to_string(),
        position: 0.3,
        node_type: NodeType::Goal,
        tile_sets: vec![1],
    });

    let mut generator = GeneratorBuilder::new(flow).seed(42).build().unwrap();
    let dungeon = generator.generate().unwrap();
    let path = dungeon.main_path();
    assert_eq!(path.len(), 5);

    let last = dungeon.tile(path[4]).unwrap();
    assert_eq!(last.template, TemplateId(3));
    assert_eq!(last.placement.graph_node, Some(0));
    assert!(path[..4]
        .iter()
        .all(|id| dungeon.tile(*id).unwrap().template != TemplateId(3)));
}
