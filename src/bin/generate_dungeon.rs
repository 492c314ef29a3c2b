//! Builds a small demo flow, or loads one from a RON file, and generates it.
//!
//! Usage: `generate_dungeon [seed] [flow.ron]`. Set `RUST_LOG=debug` for
//! phase and retry logging.

use dungeon_assembler::*;
use glam::Vec3;
use log::*;
use std::path::Path;

fn room(name: &str, half: f32) -> TileTemplate {
    TileTemplate::new(name, Bounds::new(Vec3::new(-half, 0.0, -half), Vec3::new(half, 3.0, half)))
        .with_doorway(DoorwayTemplate::new("door", Vec3::new(0.0, 0.0, -half), -Vec3::Z))
        .with_doorway(DoorwayTemplate::new("door", Vec3::new(0.0, 0.0, half), Vec3::Z))
        .with_doorway(DoorwayTemplate::new("door", Vec3::new(half, 0.0, 0.0), Vec3::X))
        .with_doorway(DoorwayTemplate::new("door", Vec3::new(-half, 0.0, 0.0), -Vec3::X))
}

fn demo_flow() -> DungeonFlow {
    let templates = vec![
        room("hall", 4.0),
        room("chamber", 6.0),
        TileTemplate::new("corridor", Bounds::new(Vec3::new(-1.0, 0.0, -4.0), Vec3::new(1.0, 3.0, 4.0)))
            .with_doorway(DoorwayTemplate::new("door", Vec3::new(0.0, 0.0, -4.0), -Vec3::Z))
            .with_doorway(DoorwayTemplate::new("door", Vec3::new(0.0, 0.0, 4.0), Vec3::Z)),
        TileTemplate::new("dead_end", Bounds::new(Vec3::new(-2.0, 0.0, -2.0), Vec3::new(2.0, 3.0, 2.0)))
            .with_doorway(DoorwayTemplate::new("door", Vec3::new(0.0, 0.0, -2.0), -Vec3::Z))
            .with_tag("dead_end"),
    ];
    let tile_sets = vec![
        TileSet::new("rooms")
            .with_entry(TileWeight::new(TemplateId(0), 2.0))
            .with_entry(TileWeight::new(TemplateId(1), 1.0))
            .with_entry(TileWeight::new(TemplateId(2), 3.0)),
        TileSet::new("caps").with_entry(TileWeight::new(TemplateId(3), 1.0)),
    ];

    let mut archetype = Archetype::new("default", vec![0]);
    archetype.branch_count = IntRange::new(0, 2);
    archetype.branching_depth = IntRange::new(1, 3);
    archetype.branch_cap_tile_sets = vec![1];
    archetype.straighten_chance = 0.3;

    let mut flow = DungeonFlow::single_line(templates, tile_sets, archetype, IntRange::new(8, 12));
    flow.branch_prune = Some(BranchPruneRule {
        mode: PruneMode::AllTagsMissing,
        tags: vec!["dead_end".to_string()],
    });
    flow
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let seed = args.next().and_then(|s| s.parse().ok()).unwrap_or(42);
    let flow = match args.next() {
        Some(path) => match DungeonFlow::load_from_ron(Path::new(&path)) {
            Ok(flow) => flow,
            Err(err) => {
                error!("Failed to load {}: {}", path, err);
                std::process::exit(2);
            }
        },
        None => demo_flow(),
    };

    let mut generator = match GeneratorBuilder::new(flow)
        .seed(seed)
        .observer(|event| {
            if let GenerationEvent::StatusChanged { to, .. } = event {
                debug!("-> {:?}", to);
            }
        })
        .build()
    {
        Ok(generator) => generator,
        Err(err) => {
            error!("Invalid flow: {}", err);
            std::process::exit(2);
        }
    };

    match generator.generate() {
        Ok(dungeon) => {
            println!(
                "seed {}: {} tiles ({} on main path), {} connections, {} branches, {} attempt(s)",
                dungeon.seed,
                dungeon.tile_count(),
                dungeon.main_path().len(),
                dungeon.connection_count(),
                dungeon.branch_count(),
                dungeon.attempts
            );
            for id in dungeon.graph.ordered_tiles() {
                if let Some(tile) = dungeon.tile(id) {
                    println!(
                        "  {:?} template {} at {:?} main={} branch={:?}",
                        id,
                        tile.template.0,
                        tile.placement.position,
                        tile.placement.is_on_main_path,
                        tile.placement.branch_id
                    );
                }
            }
        }
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}
