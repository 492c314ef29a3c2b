//! Ranges, depth curves and weighted tile catalogs.

use crate::random::RandomStream;
use crate::template::TemplateId;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Inclusive integer range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: i32,
    pub max: i32,
}

impl IntRange {
    pub fn new(min: i32, max: i32) -> Self {
        IntRange { min, max }
    }

    pub fn exactly(value: i32) -> Self {
        IntRange { min: value, max: value }
    }

    pub fn random(&self, rng: &mut RandomStream) -> i32 {
        rng.range_inclusive(self.min, self.max)
    }
}

/// Half-open float range `[min, max)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub min: f32,
    pub max: f32,
}

impl FloatRange {
    pub fn new(min: f32, max: f32) -> Self {
        FloatRange { min, max }
    }

    pub fn random(&self, rng: &mut RandomStream) -> f32 {
        self.min + (rng.next_f64() as f32) * (self.max - self.min)
    }
}

/// Weight multiplier as a function of normalized depth.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub enum DepthCurve {
    #[default]
    Constant,
    Linear { start: f32, end: f32 },
    /// Piecewise-linear through `(depth, multiplier)` points sorted by depth.
    Points(Vec<(f32, f32)>),
}

impl DepthCurve {
    pub fn evaluate(&self, depth: f32) -> f32 {
        let depth = depth.clamp(0.0, 1.0);
        match self {
            DepthCurve::Constant => 1.0,
            DepthCurve::Linear { start, end } => start + (end - start) * depth,
            DepthCurve::Points(points) => {
                let (first, last) = match (points.first(), points.last()) {
                    (Some(first), Some(last)) => (*first, *last),
                    _ => return 1.0,
                };
                if depth <= first.0 {
                    return first.1;
                }
                if depth >= last.0 {
                    return last.1;
                }
                for (a, b) in points.iter().copied().tuple_windows() {
                    if depth >= a.0 && depth <= b.0 {
                        let span = b.0 - a.0;
                        if span <= f32::EPSILON {
                            return b.1;
                        }
                        return a.1 + (b.1 - a.1) * (depth - a.0) / span;
                    }
                }
                last.1
            }
        }
    }
}

/// One entry of a tile set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileWeight {
    pub template: TemplateId,
    #[serde(default = "default_weight")]
    pub main_path_weight: f32,
    #[serde(default = "default_weight")]
    pub branch_path_weight: f32,
    #[serde(default)]
    pub depth_curve: DepthCurve,
}

fn default_weight() -> f32 {
    1.0
}

impl TileWeight {
    pub fn new(template: TemplateId, weight: f32) -> Self {
        TileWeight {
            template,
            main_path_weight: weight,
            branch_path_weight: weight,
            depth_curve: DepthCurve::Constant,
        }
    }

    /// Effective weight at a point in the dungeon. Never negative.
    pub fn weight(&self, on_main_path: bool, depth: f32) -> f32 {
        let base = if on_main_path {
            self.main_path_weight
        } else {
            self.branch_path_weight
        };
        (base * self.depth_curve.evaluate(depth)).max(0.0)
    }
}

/// A named, weighted catalog of templates.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct TileSet {
    pub name: String,
    pub entries: Vec<TileWeight>,
}

impl TileSet {
    pub fn new(name: impl Into<String>) -> Self {
        TileSet {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: TileWeight) -> Self {
        self.entries.push(entry);
        self
    }
}

/// Draw one index from `weights` proportionally to its weight.
///
/// Panics if no weight is positive: asking for a distribution over an empty
/// table means the flow asset is malformed.
pub fn pick_weighted(weights: &[f32], rng: &mut RandomStream) -> usize {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).map(|w| *w as f64).sum();
    assert!(
        total > 0.0,
        "weighted draw requested over a table with no positive weights"
    );

    let target = rng.next_f64() * total;
    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (i, w) in weights.iter().enumerate() {
        if *w <= 0.0 {
            continue;
        }
        cumulative += *w as f64;
        last_positive = i;
        if target < cumulative {
            return i;
        }
    }
    last_positive
}

/// Repeatedly draw without replacement until no positive weight remains,
/// producing a priority order over `entries`. One draw is consumed per
/// returned entry.
pub fn weighted_order(
    entries: &[TileWeight],
    on_main_path: bool,
    depth: f32,
    rng: &mut RandomStream,
) -> Vec<TileWeight> {
    let mut remaining: Vec<(TileWeight, f32)> = entries
        .iter()
        .map(|e| (e.clone(), e.weight(on_main_path, depth)))
        .filter(|(_, w)| *w > 0.0)
        .collect();

    let mut order = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let weights: Vec<f32> = remaining.iter().map(|(_, w)| *w).collect();
        let index = pick_weighted(&weights, rng);
        order.push(remaining.remove(index).0);
    }
    order
}
