//! Branch pruning: peel tagged tips off branches until none qualify.

use crate::flow::BranchPruneRule;
use crate::proxy::{ProxyGraph, TileId, TileNode};
use log::*;

/// A branch tile with no connection to a deeper tile on a branch.
pub fn is_branch_tip(graph: &ProxyGraph, id: TileId) -> bool {
    let depth = match graph.tile(id) {
        Some(tile) if !tile.placement.is_on_main_path => tile.placement.branch_depth,
        _ => return false,
    };
    !graph.neighbours(id).into_iter().any(|n| {
        graph
            .tile(n)
            .map_or(false, |t| !t.placement.is_on_main_path && t.placement.branch_depth > depth)
    })
}

fn branch_parent(graph: &ProxyGraph, id: TileId) -> Option<TileId> {
    let depth = graph.tile(id)?.placement.branch_depth;
    graph.neighbours(id).into_iter().find(|n| {
        graph
            .tile(*n)
            .map_or(false, |t| !t.placement.is_on_main_path && t.placement.branch_depth < depth)
    })
}

/// Remove every prunable tip. Required injected tiles always stay, and so
/// does anything behind them. Returns the removed tiles so the caller can
/// release them.
pub fn prune_branches(graph: &mut ProxyGraph, rule: &BranchPruneRule) -> Vec<TileNode> {
    let mut removed = Vec::new();
    let view: &ProxyGraph = graph;
    let mut stack: Vec<TileId> = view
        .branch_tiles()
        .filter(|id| is_branch_tip(view, *id))
        .collect();
    stack.reverse();

    while let Some(id) = stack.pop() {
        let prunable = match graph.tile(id) {
            Some(tile) => {
                !tile.placement.injection_required && is_branch_tip(graph, id) && rule.should_prune(&tile.tags)
            }
            None => false,
        };
        if !prunable {
            continue;
        }

        let parent = branch_parent(graph, id);
        if let Some(node) = graph.remove_tile(id) {
            trace!("Pruned branch tile {:?}", id);
            removed.push(node);
        }
        if let Some(parent) = parent {
            stack.push(parent);
        }
    }

    removed
}
