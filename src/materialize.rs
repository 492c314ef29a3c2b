//! Hooks into the world outside the assembler: turning proxy tiles into real
//! objects, and user passes run over the finished graph.

use crate::proxy::{ProxyGraph, TileId, TileNode};
use crate::random::RandomStream;
use crate::template::TileTemplate;

/// Receives finalized tiles, one per step, main path first.
pub trait Materializer {
    fn instantiate(&mut self, id: TileId, tile: &TileNode, template: &TileTemplate);

    /// Throw away everything instantiated so far. Called on cancellation.
    fn discard(&mut self) {}
}

/// Materializer that does nothing. Used when the caller only wants the graph.
#[derive(Default)]
pub struct NullMaterializer;

impl Materializer for NullMaterializer {
    fn instantiate(&mut self, _id: TileId, _tile: &TileNode, _template: &TileTemplate) {}
}

/// A user pass over the completed graph. Lower priorities run first.
pub trait PostProcessStep {
    fn priority(&self) -> i32 {
        0
    }

    fn run(&mut self, graph: &ProxyGraph, rng: &mut RandomStream);
}

impl<F> PostProcessStep for F
where
    F: FnMut(&ProxyGraph, &mut RandomStream),
{
    fn run(&mut self, graph: &ProxyGraph, rng: &mut RandomStream) {
        self(graph, rng)
    }
}
