//! Finalization: hand tiles to the materializer, run post-processing and
//! package the finished graph.

use super::{Environment, PhaseResult, Workspace};
use crate::constants::*;
use crate::geometry::angle_degrees;
use crate::materialize::{Materializer, PostProcessStep};
use crate::proxy::{DoorwayRef, ProxyGraph, TileId, TileNode};
use crate::report::GenerationStats;
use crate::rules::{DoorwayEnd, ProposedConnection};
use log::*;
use serde::{Deserialize, Serialize};

/// A completed dungeon.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dungeon {
    pub seed: u64,
    pub attempts: u32,
    pub graph: ProxyGraph,
    pub stats: GenerationStats,
}

impl Dungeon {
    pub fn main_path(&self) -> &[TileId] {
        self.graph.main_path()
    }

    pub fn tile(&self, id: TileId) -> Option<&TileNode> {
        self.graph.tile(id)
    }

    pub fn tile_count(&self) -> usize {
        self.graph.tile_count()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.connection_count()
    }

    pub fn branch_count(&self) -> usize {
        self.graph.branches().len()
    }
}

/// Phase: one tile per tick, main path first.
pub(crate) struct InstantiatePhase {
    order: Vec<TileId>,
    next: usize,
}

impl InstantiatePhase {
    pub fn new(graph: &ProxyGraph) -> Self {
        InstantiatePhase {
            order: graph.ordered_tiles(),
            next: 0,
        }
    }

    /// `(done, total)` after the most recent tick.
    pub fn progress(&self) -> (usize, usize) {
        (self.next, self.order.len())
    }

    pub fn tick(
        &mut self,
        env: &Environment,
        ws: &mut Workspace,
        materializer: &mut dyn Materializer,
    ) -> PhaseResult<()> {
        let id = match self.order.get(self.next) {
            Some(id) => *id,
            None => return PhaseResult::Complete(()),
        };
        if let Some(tile) = ws.graph.tile(id) {
            materializer.instantiate(id, tile, env.flow.template(tile.template));
        }
        self.next += 1;
        PhaseResult::Running
    }
}

fn same_section(a: &TileNode, b: &TileNode) -> bool {
    match (a.placement.is_on_main_path, b.placement.is_on_main_path) {
        (true, true) => true,
        (false, false) => a.placement.branch_id == b.placement.branch_id,
        _ => false,
    }
}

/// Join unused doorways on different tiles that sit on top of each other and
/// face opposite ways. One draw per qualifying pair, in tile then slot order.
pub(crate) fn connect_overlapping_doorways(env: &Environment, ws: &mut Workspace) -> usize {
    let chance = env.flow.doorway_connection_chance;
    if chance <= 0.0 {
        return 0;
    }

    let order = ws.graph.ordered_tiles();
    let mut candidates: Vec<(DoorwayRef, DoorwayRef)> = Vec::new();

    for (i, a_id) in order.iter().enumerate() {
        for b_id in &order[i + 1..] {
            let (a, b) = match (ws.graph.tile(*a_id), ws.graph.tile(*b_id)) {
                (Some(a), Some(b)) => (a, b),
                _ => continue,
            };
            if env.flow.restrict_connection_to_same_section && !same_section(a, b) {
                continue;
            }
            if ws.graph.neighbours(*a_id).contains(b_id) {
                continue;
            }
            let a_template = env.flow.template(a.template);
            let b_template = env.flow.template(b.template);

            for da in a.available_doorways() {
                for db in b.available_doorways() {
                    if da.position.distance(db.position) > DOORWAY_OVERLAP_EPSILON
                        || angle_degrees(da.forward, -db.forward) > DOORWAY_ANGLE_TOLERANCE_DEGREES
                    {
                        continue;
                    }
                    let proposal = ProposedConnection {
                        previous: DoorwayEnd {
                            template_id: a.template,
                            template: a_template,
                            doorway_index: da.index,
                            doorway: &a_template.doorways[da.index],
                        },
                        next: DoorwayEnd {
                            template_id: b.template,
                            template: b_template,
                            doorway_index: db.index,
                            doorway: &b_template.doorways[db.index],
                        },
                    };
                    if env.rules.can_connect(&proposal) {
                        candidates.push((
                            DoorwayRef {
                                tile: *a_id,
                                doorway: da.index,
                            },
                            DoorwayRef {
                                tile: *b_id,
                                doorway: db.index,
                            },
                        ));
                    }
                }
            }
        }
    }

    let mut connected = 0;
    for (a, b) in candidates {
        let free = ws.graph.doorway(a).map_or(false, |d| d.is_available())
            && ws.graph.doorway(b).map_or(false, |d| d.is_available());
        if !free {
            continue;
        }
        if ws.rng.next_f64() < chance as f64 {
            ws.graph.connect(a, b);
            connected += 1;
        }
    }

    if connected > 0 {
        debug!("Connected {} overlapping doorway pair(s)", connected);
    }
    connected
}

/// Run user steps in ascending priority, registration order among equals.
pub(crate) fn run_post_process_steps(ws: &mut Workspace, steps: &mut [Box<dyn PostProcessStep>]) {
    let mut order: Vec<usize> = (0..steps.len()).collect();
    order.sort_by_key(|i| steps[*i].priority());
    for i in order {
        steps[i].run(&ws.graph, &mut ws.rng);
    }
}
