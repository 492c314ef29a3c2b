//! Branch growth off the finished main path.
//!
//! Branch counts are computed once when the phase starts. After that, each
//! branch draws its depth when it is opened and then grows one tile per tick,
//! stopping at its first failed placement.

use super::{Environment, PhaseResult, RestartReason, Workspace};
use crate::branching::{branch_counts, BranchCandidate};
use crate::placement::{try_place, PlacementOutcome, TileSlot};
use crate::proxy::{TileId, TilePlacement};
use log::*;

struct ActiveBranch {
    id: usize,
    root: TileId,
    archetype: usize,
    depth: usize,
    placed: usize,
    last: TileId,
}

pub(crate) struct BranchPhase {
    main_tiles: Vec<TileId>,
    counts: Vec<usize>,
    next_tile: usize,
    root: Option<(TileId, usize)>,
    branches_left: usize,
    active: Option<ActiveBranch>,
    next_branch_id: usize,
}

impl BranchPhase {
    pub fn new(env: &Environment, ws: &mut Workspace) -> Self {
        let main_tiles = ws.graph.main_path().to_vec();
        let candidates: Vec<BranchCandidate> = main_tiles
            .iter()
            .filter_map(|id| ws.graph.tile(*id))
            .map(|tile| {
                let template = env.flow.template(tile.template);
                BranchCandidate {
                    unused_doorways: tile
                        .available_doorways()
                        .filter(|d| template.can_exit_through(d.index))
                        .count(),
                    branch_count: tile.placement.archetype.map(|a| env.flow.archetypes[a].branch_count),
                    section: tile.placement.graph_line,
                }
            })
            .collect();

        let counts = branch_counts(
            env.flow.branch_mode,
            &candidates,
            &env.flow.global_branch_count,
            &mut ws.rng,
        );
        debug!(
            "Branch counts ({:?}): {} over {} tile(s)",
            env.flow.branch_mode,
            counts.iter().sum::<usize>(),
            counts.len()
        );

        BranchPhase {
            main_tiles,
            counts,
            next_tile: 0,
            root: None,
            branches_left: 0,
            active: None,
            next_branch_id: 0,
        }
    }

    /// Place one branch tile, or advance the cursor to the next branch.
    pub fn tick(&mut self, env: &Environment, ws: &mut Workspace) -> PhaseResult<Result<(), RestartReason>> {
        loop {
            if let Some(branch) = self.active.take() {
                self.grow(env, ws, branch);
                return PhaseResult::Running;
            }

            if self.branches_left > 0 {
                self.branches_left -= 1;
                if let Some((root, archetype)) = self.root {
                    let depth = env.flow.archetypes[archetype].branching_depth.random(&mut ws.rng).max(0) as usize;
                    if depth > 0 {
                        self.active = Some(ActiveBranch {
                            id: self.next_branch_id,
                            root,
                            archetype,
                            depth,
                            placed: 0,
                            last: root,
                        });
                        self.next_branch_id += 1;
                    }
                }
                continue;
            }

            if self.next_tile >= self.main_tiles.len() {
                return PhaseResult::Complete(self.finish(ws));
            }

            let index = self.next_tile;
            self.next_tile += 1;
            let root = self.main_tiles[index];
            self.root = ws
                .graph
                .tile(root)
                .and_then(|t| t.placement.archetype)
                .map(|archetype| (root, archetype));
            self.branches_left = if self.root.is_some() { self.counts[index] } else { 0 };
        }
    }

    fn grow(&mut self, env: &Environment, ws: &mut Workspace, mut branch: ActiveBranch) {
        let archetype = &env.flow.archetypes[branch.archetype];
        let j = branch.placed;
        let is_last = j + 1 == branch.depth;
        let branch_depth = if branch.depth <= 1 {
            1.0
        } else {
            j as f32 / (branch.depth - 1) as f32
        };

        let root = match ws.graph.tile(branch.root) {
            Some(root) => root.placement.clone(),
            None => return,
        };

        let mut placement = TilePlacement {
            is_on_main_path: false,
            path_depth: root.path_depth,
            normalized_path_depth: root.normalized_path_depth,
            branch_id: Some(branch.id),
            branch_depth: j,
            normalized_branch_depth: branch_depth,
            archetype: Some(branch.archetype),
            graph_line: root.graph_line,
            ..Default::default()
        };

        let entries = match ws.due_injection(false, root.normalized_path_depth, branch_depth) {
            Some(injection) => {
                let request = &ws.injections[injection];
                placement.injection = Some(injection);
                placement.injection_required = request.is_required;
                placement.injection_locked = request.is_locked;
                env.flow.entries_for(&[request.tile_set])
            }
            None => env.flow.entries_for(&archetype.branch_tile_sets(is_last)),
        };

        let slot = TileSlot {
            previous: Some(branch.last),
            entries,
            placement,
            straighten_chance: 0.0,
        };

        match try_place(env, ws, &slot) {
            PlacementOutcome::Success(id) => {
                if let Some(injection) = slot.placement.injection {
                    ws.consume_injection(injection);
                }
                branch.placed += 1;
                branch.last = id;
                if branch.placed < branch.depth {
                    self.active = Some(branch);
                }
            }
            failure => {
                trace!(
                    "Branch {} stopped at depth {} of {}: {:?}",
                    branch.id,
                    j,
                    branch.depth,
                    failure.kind()
                );
            }
        }
    }

    fn finish(&self, ws: &mut Workspace) -> Result<(), RestartReason> {
        if let Some(unplaced) = ws.unplaced_required(false) {
            let tile_set = ws.injections[unplaced].tile_set;
            debug!("Required branch injection from tile set {} was never placed", tile_set);
            ws.record_failure(&PlacementOutcome::RequiredInjectionFailed { tile_set });
            return Err(RestartReason::RequiredInjectionUnplaced);
        }
        Ok(())
    }
}
