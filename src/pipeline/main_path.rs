//! Pre-processing and main-path growth.
//!
//! Pre-processing draws the target length first, then one archetype per
//! graph line that offers more than one. Growth fills one slot per tick:
//! a due graph node wins over a due injection, which wins over the line's
//! archetype catalog.

use super::{Environment, PhaseResult, RestartReason, Workspace};
use crate::flow::DungeonFlow;
use crate::placement::{try_place, PlacementOutcome, TileSlot};
use crate::proxy::TilePlacement;
use crate::random::RandomStream;
use log::*;

pub(crate) struct MainPathPhase {
    target_length: usize,
    line_archetypes: Vec<Option<usize>>,
    /// Node indices ordered by position.
    node_order: Vec<usize>,
    node_placed: Vec<bool>,
    local_retries: u32,
    total_retries: u32,
    furthest_failure: usize,
}

/// One archetype per line. Unique archetypes are avoided once used while
/// the line still has an unused alternative.
fn choose_line_archetypes(flow: &DungeonFlow, rng: &mut RandomStream) -> Vec<Option<usize>> {
    let mut used_unique: Vec<usize> = Vec::new();
    let mut chosen = Vec::with_capacity(flow.lines.len());

    for line in &flow.lines {
        let fresh: Vec<usize> = line
            .archetypes
            .iter()
            .copied()
            .filter(|a| !used_unique.contains(a))
            .collect();
        let options = if fresh.is_empty() { line.archetypes.clone() } else { fresh };

        let pick = match options.len() {
            0 => None,
            1 => Some(options[0]),
            n => Some(options[rng.range(0, n as i32) as usize]),
        };
        if let Some(a) = pick {
            if flow.archetypes[a].unique && !used_unique.contains(&a) {
                used_unique.push(a);
            }
        }
        chosen.push(pick);
    }
    chosen
}

impl MainPathPhase {
    pub fn new(env: &Environment, ws: &mut Workspace) -> Self {
        let drawn = env.flow.length.random(&mut ws.rng).max(1) as f32;
        let target_length = ((drawn * env.settings.length_multiplier).round() as usize).max(1);
        let line_archetypes = choose_line_archetypes(env.flow, &mut ws.rng);

        let mut node_order: Vec<usize> = (0..env.flow.nodes.len()).collect();
        node_order.sort_by(|a, b| {
            let (a, b) = (&env.flow.nodes[*a], &env.flow.nodes[*b]);
            a.effective_position().total_cmp(&b.effective_position())
        });

        debug!(
            "Main path target length {} over {} line(s)",
            target_length,
            line_archetypes.len()
        );

        MainPathPhase {
            target_length,
            line_archetypes,
            node_order,
            node_placed: vec![false; env.flow.nodes.len()],
            local_retries: 0,
            total_retries: 0,
            furthest_failure: 0,
        }
    }

    fn normalized_depth(&self, index: usize) -> f32 {
        if self.target_length <= 1 {
            0.0
        } else {
            (index as f32 / (self.target_length - 1) as f32).min(1.0)
        }
    }

    fn due_node(&self, flow: &DungeonFlow, index: usize) -> Option<usize> {
        let last = self.target_length.saturating_sub(1) as f32;
        self.node_order.iter().copied().find(|n| {
            !self.node_placed[*n] && (flow.nodes[*n].effective_position() * last).round() as usize <= index
        })
    }

    fn slot(&self, env: &Environment, ws: &Workspace, index: usize) -> TileSlot {
        let flow = env.flow;
        let depth = self.normalized_depth(index);
        let line = flow.line_at(depth);
        let archetype = line.and_then(|l| self.line_archetypes.get(l).copied().flatten());

        let mut placement = TilePlacement {
            is_on_main_path: true,
            path_depth: index,
            normalized_path_depth: depth,
            graph_line: line,
            ..Default::default()
        };

        let entries;
        let mut straighten_chance = 0.0;
        if let Some(node) = self.due_node(flow, index) {
            placement.graph_node = Some(node);
            entries = flow.entries_for(&flow.nodes[node].tile_sets);
        } else if let Some(injection) = ws.due_injection(true, depth, 0.0) {
            let request = &ws.injections[injection];
            placement.archetype = archetype;
            placement.injection = Some(injection);
            placement.injection_required = request.is_required;
            placement.injection_locked = request.is_locked;
            entries = flow.entries_for(&[request.tile_set]);
        } else {
            placement.archetype = archetype;
            let archetype = archetype.map(|a| &flow.archetypes[a]);
            entries = archetype.map(|a| flow.entries_for(&a.tile_sets)).unwrap_or_default();
            straighten_chance = archetype.map_or(0.0, |a| a.straighten_chance);
        }

        TileSlot {
            previous: ws.graph.main_path().last().copied(),
            entries,
            placement,
            straighten_chance,
        }
    }

    /// Fill one main-path slot, or backtrack once.
    pub fn tick(&mut self, env: &Environment, ws: &mut Workspace) -> PhaseResult<Result<(), RestartReason>> {
        let index = ws.graph.main_path().len();

        if index >= self.target_length {
            if let Some(unplaced) = ws.unplaced_required(true) {
                let tile_set = ws.injections[unplaced].tile_set;
                debug!("Required main path injection from tile set {} was never placed", tile_set);
                ws.record_failure(&PlacementOutcome::RequiredInjectionFailed { tile_set });
                return PhaseResult::Complete(Err(RestartReason::RequiredInjectionUnplaced));
            }
            return PhaseResult::Complete(Ok(()));
        }

        let slot = self.slot(env, ws, index);
        match try_place(env, ws, &slot) {
            PlacementOutcome::Success(_) => {
                if let Some(node) = slot.placement.graph_node {
                    self.node_placed[node] = true;
                }
                if let Some(injection) = slot.placement.injection {
                    ws.consume_injection(injection);
                    self.target_length += 1;
                }
                if index > self.furthest_failure {
                    self.local_retries = 0;
                }
                PhaseResult::Running
            }
            failure => {
                let settings = env.settings;
                let can_backtrack = index >= settings.backtrack_min_placed
                    && self.local_retries < settings.max_local_retries
                    && self.total_retries < settings.max_total_local_retries;
                if !can_backtrack {
                    debug!("Main path blocked at {} of {}: {:?}", index, self.target_length, failure.kind());
                    return PhaseResult::Complete(Err(RestartReason::MainPathBlocked));
                }

                self.furthest_failure = self.furthest_failure.max(index);
                self.local_retries += 1;
                self.total_retries += 1;
                ws.stats.local_backtracks += 1;

                if let Some(last) = ws.graph.main_path().last().copied() {
                    if let Some(removed) = ws.remove_tile(last) {
                        if let Some(injection) = removed.injection {
                            ws.return_injection(injection);
                            self.target_length -= 1;
                        }
                        if let Some(node) = removed.graph_node {
                            self.node_placed[node] = false;
                        }
                    }
                }
                debug!(
                    "Backtracked from main path index {} (retry {}, total {})",
                    index, self.local_retries, self.total_retries
                );
                PhaseResult::Running
            }
        }
    }
}
