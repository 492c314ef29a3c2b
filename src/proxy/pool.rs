//! Recycles proxy tiles across candidates, backtracks and restarts.

use super::tile::TileNode;
use crate::template::{TemplateId, TileTemplate};

#[derive(Default)]
pub struct TilePool {
    free: Vec<TileNode>,
    created: u64,
    reused: u64,
}

impl TilePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A proposed tile loaded from `template`, carrying no state from earlier use.
    pub fn acquire(&mut self, template_id: TemplateId, template: &TileTemplate) -> TileNode {
        let mut node = match self.free.pop() {
            Some(node) => {
                self.reused += 1;
                node
            }
            None => {
                self.created += 1;
                TileNode::empty()
            }
        };
        node.reset();
        node.load(template_id, template);
        node
    }

    pub fn release(&mut self, mut node: TileNode) {
        node.reset();
        self.free.push(node);
    }

    pub fn release_all(&mut self, nodes: impl IntoIterator<Item = TileNode>) {
        for node in nodes {
            self.release(node);
        }
    }

    /// `(created, reused)` counts since the pool was made.
    pub fn stats(&self) -> (u64, u64) {
        (self.created, self.reused)
    }
}
