//! Branch distribution: how many side branches each main-path tile sprouts.
//!
//! Every policy walks the main path in order and consumes the random stream
//! in a fixed order:
//!
//! * `Local`: one `IntRange` draw per tile that has a branch range.
//! * `Global`: one draw for the total, then one `next_f64` per eligible tile
//!   visited until the total is spent.
//! * `Section`: one draw per section, in order of first appearance. The
//!   split inside a section is deterministic.

use crate::flow::BranchMode;
use crate::random::RandomStream;
use crate::weights::IntRange;
use log::*;

/// What the branch policy needs to know about one main-path tile.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchCandidate {
    pub unused_doorways: usize,
    /// Branch range of the tile's archetype. `None` for tiles that never
    /// branch, such as graph nodes.
    pub branch_count: Option<IntRange>,
    /// Graph line the tile belongs to.
    pub section: Option<usize>,
}

impl BranchCandidate {
    fn is_eligible(&self) -> bool {
        self.branch_count.is_some() && self.unused_doorways > 0
    }
}

/// Per-tile branch counts, aligned with `tiles`.
pub fn branch_counts(
    mode: BranchMode,
    tiles: &[BranchCandidate],
    global_count: &IntRange,
    rng: &mut RandomStream,
) -> Vec<usize> {
    match mode {
        BranchMode::Local => local_counts(tiles, rng),
        BranchMode::Global => {
            let total = global_count.random(rng).max(0) as usize;
            global_counts(tiles, total, rng)
        }
        BranchMode::Section => section_counts(tiles, rng),
    }
}

pub fn local_counts(tiles: &[BranchCandidate], rng: &mut RandomStream) -> Vec<usize> {
    tiles
        .iter()
        .map(|tile| match &tile.branch_count {
            Some(range) => (range.random(rng).max(0) as usize).min(tile.unused_doorways),
            None => 0,
        })
        .collect()
}

/// Spread `total` over the eligible tiles. The running accumulator carries
/// both the fractional remainder and any extra branch already handed out, so
/// the counts add up to `total` unless a tile's capacity clamps it.
pub fn global_counts(tiles: &[BranchCandidate], total: usize, rng: &mut RandomStream) -> Vec<usize> {
    let mut counts = vec![0; tiles.len()];
    let eligible = tiles.iter().filter(|t| t.is_eligible()).count();
    if eligible == 0 || total == 0 {
        return counts;
    }

    let per_tile = total as f64 / eligible as f64;
    let mut accumulator = 0.0f64;
    let mut remaining = total;

    for (tile, count) in tiles.iter().zip(counts.iter_mut()) {
        if remaining == 0 {
            break;
        }
        if !tile.is_eligible() {
            continue;
        }

        accumulator += per_tile;
        let whole = (accumulator + 1e-9).floor().max(0.0);
        let fraction = accumulator - whole;
        let mut drawn = whole as usize;
        if rng.next_f64() < fraction {
            drawn += 1;
        }
        accumulator -= drawn as f64;

        let granted = drawn.min(tile.unused_doorways).min(remaining);
        if granted < drawn {
            trace!("Branch count clamped from {} to {}", drawn, granted);
        }
        *count = granted;
        remaining -= granted;
    }

    counts
}

/// Per-section split, proportional to each tile's unused doorways.
pub fn section_counts(tiles: &[BranchCandidate], rng: &mut RandomStream) -> Vec<usize> {
    let mut counts = vec![0; tiles.len()];

    let mut sections: Vec<usize> = Vec::new();
    for tile in tiles {
        if let Some(section) = tile.section {
            if !sections.contains(&section) {
                sections.push(section);
            }
        }
    }

    for section in sections {
        let members: Vec<usize> = tiles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.section == Some(section) && t.branch_count.is_some())
            .map(|(i, _)| i)
            .collect();
        let range = match members.first().and_then(|i| tiles[*i].branch_count) {
            Some(range) => range,
            None => continue,
        };

        let total_unused: usize = members.iter().map(|i| tiles[*i].unused_doorways).sum();
        let target = (range.random(rng).max(0) as usize).min(total_unused);
        if target == 0 {
            continue;
        }

        let mut error = 0.0f64;
        for i in members {
            let unused = tiles[i].unused_doorways;
            let ideal = target as f64 * unused as f64 / total_unused as f64;
            let mut value = ideal.round();
            error += value - ideal;
            if error >= 0.5 {
                value -= 1.0;
                error -= 1.0;
            } else if error <= -0.5 {
                value += 1.0;
                error += 1.0;
            }
            counts[i] = (value.max(0.0) as usize).min(unused);
        }
    }

    counts
}
