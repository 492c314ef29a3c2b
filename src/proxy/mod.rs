//! The proxy graph: an arena of committed tiles joined through doorway
//! connections, explored and rewound cheaply before anything is materialized.
//!
//! Tiles and connections live in slot vectors addressed by `TileId` and
//! `ConnectionId`. Doorway slots store the id of their connection rather than
//! a reference to the other side, so the graph has no cyclic ownership.

pub mod pool;
pub mod tile;

pub use pool::TilePool;
pub use tile::*;

use fnv::FnvHashSet;
use pathfinding::prelude::bfs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// An unordered pair of doorway slots on two distinct tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub a: DoorwayRef,
    pub b: DoorwayRef,
}

impl Connection {
    /// The end of this connection that is not on `tile`.
    pub fn other(&self, tile: TileId) -> DoorwayRef {
        if self.a.tile == tile {
            self.b
        } else {
            self.a
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("connection {0:?} refers to a missing tile or doorway")]
    DanglingConnection(ConnectionId),
    #[error("doorway {0:?} does not point back at connection {1:?}")]
    AsymmetricConnection(DoorwayRef, ConnectionId),
    #[error("doorway {0:?} is used by more than one connection")]
    SlotReused(DoorwayRef),
    #[error("connection {0:?} joins a tile to itself")]
    SelfConnection(ConnectionId),
    #[error("branch tile {0:?} has no path back to the main path")]
    UnreachableBranchTile(TileId),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProxyGraph {
    tiles: Vec<Option<TileNode>>,
    free_tiles: Vec<u32>,
    connections: Vec<Option<Connection>>,
    free_connections: Vec<u32>,
    main_path: Vec<TileId>,
    branches: BTreeMap<usize, Vec<TileId>>,
}

impl ProxyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a positioned tile. Its doorways become owned by the new id.
    pub fn commit(&mut self, mut node: TileNode) -> TileId {
        let id = match self.free_tiles.pop() {
            Some(slot) => TileId(slot),
            None => {
                self.tiles.push(None);
                TileId(self.tiles.len() as u32 - 1)
            }
        };

        node.id = Some(id);
        for slot in &mut node.doorways {
            slot.owner = Some(id);
            slot.connection = None;
        }

        if node.placement.is_on_main_path {
            self.main_path.push(id);
        } else if let Some(branch) = node.placement.branch_id {
            self.branches.entry(branch).or_default().push(id);
        }

        self.tiles[id.0 as usize] = Some(node);
        id
    }

    /// Join two available doorways on distinct tiles, both sides at once.
    pub fn connect(&mut self, a: DoorwayRef, b: DoorwayRef) -> ConnectionId {
        assert_ne!(a.tile, b.tile, "cannot connect a tile to itself");
        assert!(
            self.doorway(a).map_or(false, |d| d.is_available())
                && self.doorway(b).map_or(false, |d| d.is_available()),
            "both doorways must exist and be free"
        );

        let id = match self.free_connections.pop() {
            Some(slot) => ConnectionId(slot),
            None => {
                self.connections.push(None);
                ConnectionId(self.connections.len() as u32 - 1)
            }
        };
        self.connections[id.0 as usize] = Some(Connection { a, b });
        for end in [a, b] {
            if let Some(slot) = self.doorway_mut(end) {
                slot.connection = Some(id);
            }
        }
        id
    }

    /// Remove a connection, freeing both doorway slots.
    pub fn disconnect(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.get_mut(id.0 as usize)?.take()?;
        self.free_connections.push(id.0);
        for end in [connection.a, connection.b] {
            if let Some(tile) = self.tiles.get_mut(end.tile.0 as usize).and_then(|t| t.as_mut()) {
                if let Some(slot) = tile.doorways.get_mut(end.doorway) {
                    slot.connection = None;
                }
            }
        }
        Some(connection)
    }

    /// Remove a tile and every connection touching it.
    pub fn remove_tile(&mut self, id: TileId) -> Option<TileNode> {
        let connection_ids: Vec<ConnectionId> = self
            .tile(id)?
            .doorways
            .iter()
            .filter_map(|d| d.connection)
            .collect();
        for connection in connection_ids {
            self.disconnect(connection);
        }

        let node = self.tiles[id.0 as usize].take()?;
        self.free_tiles.push(id.0);
        self.main_path.retain(|t| *t != id);
        if let Some(branch) = node.placement.branch_id {
            if let Some(tiles) = self.branches.get_mut(&branch) {
                tiles.retain(|t| *t != id);
                if tiles.is_empty() {
                    self.branches.remove(&branch);
                }
            }
        }
        Some(node)
    }

    /// Drop every tile and connection, handing the tiles back for pooling.
    pub fn clear(&mut self) -> Vec<TileNode> {
        let nodes = self.tiles.drain(..).flatten().collect();
        self.free_tiles.clear();
        self.connections.clear();
        self.free_connections.clear();
        self.main_path.clear();
        self.branches.clear();
        nodes
    }

    pub fn tile(&self, id: TileId) -> Option<&TileNode> {
        self.tiles.get(id.0 as usize).and_then(|t| t.as_ref())
    }

    pub fn tile_mut(&mut self, id: TileId) -> Option<&mut TileNode> {
        self.tiles.get_mut(id.0 as usize).and_then(|t| t.as_mut())
    }

    pub fn doorway(&self, r: DoorwayRef) -> Option<&DoorwaySlot> {
        self.tile(r.tile).and_then(|t| t.doorways.get(r.doorway))
    }

    fn doorway_mut(&mut self, r: DoorwayRef) -> Option<&mut DoorwaySlot> {
        self.tile_mut(r.tile).and_then(|t| t.doorways.get_mut(r.doorway))
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id.0 as usize).and_then(|c| c.as_ref())
    }

    /// The doorway at the far end of a used slot.
    pub fn connected_doorway(&self, r: DoorwayRef) -> Option<DoorwayRef> {
        let id = self.doorway(r)?.connection?;
        self.connection(id).map(|c| c.other(r.tile))
    }

    pub fn tiles(&self) -> impl Iterator<Item = (TileId, &TileNode)> {
        self.tiles
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|t| (TileId(i as u32), t)))
    }

    pub fn connections(&self) -> impl Iterator<Item = (ConnectionId, &Connection)> {
        self.connections
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (ConnectionId(i as u32), c)))
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_some()).count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().filter(|c| c.is_some()).count()
    }

    /// Main-path tiles ordered by path depth.
    pub fn main_path(&self) -> &[TileId] {
        &self.main_path
    }

    /// Branch tiles grouped by branch id, each in placement order.
    pub fn branches(&self) -> &BTreeMap<usize, Vec<TileId>> {
        &self.branches
    }

    pub fn branch_tiles(&self) -> impl Iterator<Item = TileId> + '_ {
        self.branches.values().flatten().copied()
    }

    /// Main path followed by branches: the order tiles are handed out for
    /// materialization.
    pub fn ordered_tiles(&self) -> Vec<TileId> {
        self.main_path.iter().copied().chain(self.branch_tiles()).collect()
    }

    /// Tiles joined to `id` by a connection.
    pub fn neighbours(&self, id: TileId) -> Vec<TileId> {
        self.tile(id)
            .map(|t| {
                t.doorways
                    .iter()
                    .filter_map(|d| d.connection)
                    .filter_map(|c| self.connection(c))
                    .map(|c| c.other(id).tile)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check connection symmetry, single use of slots, and that every branch
    /// tile reaches the main path through strictly shallower tiles.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen: FnvHashSet<DoorwayRef> = FnvHashSet::default();
        for (id, connection) in self.connections() {
            if connection.a.tile == connection.b.tile {
                return Err(GraphError::SelfConnection(id));
            }
            for end in [connection.a, connection.b] {
                let slot = self.doorway(end).ok_or(GraphError::DanglingConnection(id))?;
                if slot.connection != Some(id) {
                    return Err(GraphError::AsymmetricConnection(end, id));
                }
                if !seen.insert(end) {
                    return Err(GraphError::SlotReused(end));
                }
            }
        }

        for (tile_id, tile) in self.tiles() {
            for slot in &tile.doorways {
                if let Some(c) = slot.connection {
                    let r = DoorwayRef {
                        tile: tile_id,
                        doorway: slot.index,
                    };
                    match self.connection(c) {
                        Some(conn) if conn.a == r || conn.b == r => {}
                        _ => return Err(GraphError::AsymmetricConnection(r, c)),
                    }
                }
            }
        }

        for start in self.branch_tiles() {
            let path = bfs(
                &start,
                |t| self.shallower_neighbours(*t),
                |t| self.tile(*t).map_or(false, |n| n.placement.is_on_main_path),
            );
            if path.is_none() {
                return Err(GraphError::UnreachableBranchTile(start));
            }
        }

        Ok(())
    }

    fn shallower_neighbours(&self, id: TileId) -> Vec<TileId> {
        let depth = match self.tile(id) {
            Some(t) if !t.placement.is_on_main_path => t.placement.branch_depth,
            _ => return Vec::new(),
        };
        self.neighbours(id)
            .into_iter()
            .filter(|n| {
                self.tile(*n).map_or(false, |t| {
                    t.placement.is_on_main_path || t.placement.branch_depth < depth
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Bounds;
    use crate::template::{DoorwayTemplate, TemplateId, TileTemplate};
    use glam::Vec3;

    fn template() -> TileTemplate {
        TileTemplate::new("room", Bounds::new(Vec3::ZERO, Vec3::ONE))
            .with_doorway(DoorwayTemplate::new("door", Vec3::ZERO, -Vec3::Z))
            .with_doorway(DoorwayTemplate::new("door", Vec3::Z, Vec3::Z))
            .with_doorway(DoorwayTemplate::new("door", Vec3::X, Vec3::X))
    }

    fn node(pool: &mut TilePool, main: bool, branch: Option<usize>, depth: usize) -> TileNode {
        let mut n = pool.acquire(TemplateId(0), &template());
        n.placement.is_on_main_path = main;
        n.placement.branch_id = branch;
        n.placement.branch_depth = depth;
        n
    }

    fn door(tile: TileId, doorway: usize) -> DoorwayRef {
        DoorwayRef { tile, doorway }
    }

    #[test]
    fn connections_are_symmetric_and_freed_together() {
        let mut pool = TilePool::new();
        let mut graph = ProxyGraph::new();
        let a = graph.commit(node(&mut pool, true, None, 0));
        let b = graph.commit(node(&mut pool, true, None, 0));
        let c = graph.connect(door(a, 1), door(b, 0));

        assert_eq!(graph.connected_doorway(door(a, 1)), Some(door(b, 0)));
        assert_eq!(graph.connected_doorway(door(b, 0)), Some(door(a, 1)));
        graph.validate().unwrap();

        graph.disconnect(c);
        assert!(graph.doorway(door(a, 1)).unwrap().is_available());
        assert!(graph.doorway(door(b, 0)).unwrap().is_available());
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn removing_a_tile_removes_its_connections() {
        let mut pool = TilePool::new();
        let mut graph = ProxyGraph::new();
        let a = graph.commit(node(&mut pool, true, None, 0));
        let b = graph.commit(node(&mut pool, true, None, 0));
        let c = graph.commit(node(&mut pool, false, Some(0), 0));
        graph.connect(door(a, 1), door(b, 0));
        graph.connect(door(a, 2), door(c, 0));

        graph.remove_tile(a).unwrap();
        assert_eq!(graph.main_path(), &[b]);
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.doorway(door(b, 0)).unwrap().is_available());
        assert_eq!(
            graph.validate(),
            Err(GraphError::UnreachableBranchTile(c))
        );
    }

    #[test]
    fn branch_reachability() {
        let mut pool = TilePool::new();
        let mut graph = ProxyGraph::new();
        let m = graph.commit(node(&mut pool, true, None, 0));
        let b0 = graph.commit(node(&mut pool, false, Some(0), 0));
        let b1 = graph.commit(node(&mut pool, false, Some(0), 1));
        graph.connect(door(m, 2), door(b0, 0));
        graph.connect(door(b0, 1), door(b1, 0));
        graph.validate().unwrap();
        assert_eq!(graph.branches()[&0], vec![b0, b1]);
        assert_eq!(graph.ordered_tiles(), vec![m, b0, b1]);
    }

    #[test]
    fn slots_are_recycled() {
        let mut pool = TilePool::new();
        let mut graph = ProxyGraph::new();
        let a = graph.commit(node(&mut pool, true, None, 0));
        graph.remove_tile(a);
        let b = graph.commit(node(&mut pool, true, None, 0));
        assert_eq!(a, b);
        assert_eq!(graph.tile_count(), 1);
        assert_eq!(graph.clear().len(), 1);
        assert_eq!(graph.tile_count(), 0);
    }

    #[test]
    #[should_panic(expected = "must exist and be free")]
    fn used_slot_cannot_be_reconnected() {
        let mut pool = TilePool::new();
        let mut graph = ProxyGraph::new();
        let a = graph.commit(node(&mut pool, true, None, 0));
        let b = graph.commit(node(&mut pool, true, None, 0));
        let c = graph.commit(node(&mut pool, true, None, 0));
        graph.connect(door(a, 1), door(b, 0));
        graph.connect(door(a, 1), door(c, 0));
    }
}
