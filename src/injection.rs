//! Tile injection: tiles that must appear at a chosen depth regardless of
//! normal weighted selection.

use crate::flow::DungeonFlow;
use crate::random::RandomStream;
use crate::weights::FloatRange;
use serde::{Deserialize, Serialize};

/// Designer rule describing a tile to inject.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileInjectionRule {
    pub tile_set: usize,
    pub path_depth: FloatRange,
    pub branch_depth: FloatRange,
    #[serde(default = "yes")]
    pub can_appear_on_main_path: bool,
    #[serde(default)]
    pub can_appear_on_branch: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub locked: bool,
}

fn yes() -> bool {
    true
}

impl TileInjectionRule {
    pub fn on_main_path(tile_set: usize, path_depth: FloatRange) -> Self {
        TileInjectionRule {
            tile_set,
            path_depth,
            branch_depth: FloatRange::new(0.0, 1.0),
            can_appear_on_main_path: true,
            can_appear_on_branch: false,
            required: false,
            locked: false,
        }
    }
}

/// A concrete request to inject a tile at a normalized depth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InjectedTileRequest {
    pub tile_set: usize,
    pub is_on_main_path: bool,
    pub normalized_path_depth: f32,
    pub normalized_branch_depth: f32,
    pub is_required: bool,
    pub is_locked: bool,
}

impl InjectedTileRequest {
    /// Whether this request's depth window has been reached at the given point.
    pub fn should_inject_at(&self, on_main_path: bool, path_depth: f32, branch_depth: f32) -> bool {
        if self.is_on_main_path != on_main_path {
            return false;
        }
        if self.normalized_path_depth > path_depth {
            return false;
        }
        on_main_path || self.normalized_branch_depth <= branch_depth
    }
}

/// External hook that contributes injection requests at the start of an attempt.
pub trait TileInjector {
    fn inject(&mut self, rng: &mut RandomStream, requests: &mut Vec<InjectedTileRequest>);
}

impl<F> TileInjector for F
where
    F: FnMut(&mut RandomStream, &mut Vec<InjectedTileRequest>),
{
    fn inject(&mut self, rng: &mut RandomStream, requests: &mut Vec<InjectedTileRequest>) {
        self(rng, requests)
    }
}

/// Collect the injection requests for one attempt: designer rules first, in
/// order, then each injector in registration order.
///
/// Per rule the draws are: a coin flip only when both path kinds are allowed,
/// then the path depth, then the branch depth.
pub fn gather_requests(
    flow: &DungeonFlow,
    rng: &mut RandomStream,
    injectors: &mut [Box<dyn TileInjector>],
) -> Vec<InjectedTileRequest> {
    let mut requests = Vec::new();

    for rule in &flow.injection_rules {
        if !rule.can_appear_on_main_path && !rule.can_appear_on_branch {
            continue;
        }
        let is_on_main_path = match (rule.can_appear_on_main_path, rule.can_appear_on_branch) {
            (true, true) => rng.next_f64() < 0.5,
            (main, _) => main,
        };
        requests.push(InjectedTileRequest {
            tile_set: rule.tile_set,
            is_on_main_path,
            normalized_path_depth: rule.path_depth.random(rng),
            normalized_branch_depth: rule.branch_depth.random(rng),
            is_required: rule.required,
            is_locked: rule.locked,
        });
    }

    for injector in injectors.iter_mut() {
        injector.inject(rng, &mut requests);
    }

    requests
}
