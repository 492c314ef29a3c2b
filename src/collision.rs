//! Spatial broadphase for committed tile bounds.

use crate::constants::DEFAULT_BROADPHASE_CELL_SIZE;
use crate::geometry::Bounds;
use crate::proxy::TileId;
use fnv::{FnvHashMap, FnvHashSet};
use glam::IVec3;

/// Overlap queries against the bounds of every committed tile.
pub trait CollisionBroadphase {
    /// True if `bounds` overlaps any registered tile other than `excluding`.
    fn is_colliding(&self, bounds: &Bounds, excluding: Option<TileId>) -> bool;

    fn add(&mut self, tile: TileId, bounds: &Bounds);

    fn remove(&mut self, tile: TileId);

    fn clear(&mut self);
}

/// Uniform-grid spatial hash. Each tile is recorded in every cell its bounds touch.
pub struct SpatialHashBroadphase {
    cell_size: f32,
    cells: FnvHashMap<IVec3, Vec<TileId>>,
    bounds: FnvHashMap<TileId, Bounds>,
}

impl Default for SpatialHashBroadphase {
    fn default() -> Self {
        SpatialHashBroadphase::new(DEFAULT_BROADPHASE_CELL_SIZE)
    }
}

impl SpatialHashBroadphase {
    pub fn new(cell_size: f32) -> Self {
        SpatialHashBroadphase {
            cell_size: cell_size.max(f32::EPSILON),
            cells: FnvHashMap::default(),
            bounds: FnvHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    fn cell_range(&self, bounds: &Bounds) -> (IVec3, IVec3) {
        let lo = (bounds.min / self.cell_size).floor().as_ivec3();
        let hi = (bounds.max / self.cell_size).floor().as_ivec3();
        (lo, hi)
    }

    fn for_each_cell(&self, bounds: &Bounds, mut f: impl FnMut(IVec3)) {
        let (lo, hi) = self.cell_range(bounds);
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                for z in lo.z..=hi.z {
                    f(IVec3::new(x, y, z));
                }
            }
        }
    }
}

impl CollisionBroadphase for SpatialHashBroadphase {
    fn is_colliding(&self, bounds: &Bounds, excluding: Option<TileId>) -> bool {
        let mut checked: FnvHashSet<TileId> = FnvHashSet::default();
        let mut hit = false;
        self.for_each_cell(bounds, |cell| {
            if hit {
                return;
            }
            if let Some(tiles) = self.cells.get(&cell) {
                for tile in tiles {
                    if Some(*tile) == excluding || !checked.insert(*tile) {
                        continue;
                    }
                    if self.bounds.get(tile).map_or(false, |b| b.overlaps(bounds)) {
                        hit = true;
                        return;
                    }
                }
            }
        });
        hit
    }

    fn add(&mut self, tile: TileId, bounds: &Bounds) {
        self.remove(tile);
        let mut touched = Vec::new();
        self.for_each_cell(bounds, |cell| touched.push(cell));
        for cell in touched {
            self.cells.entry(cell).or_default().push(tile);
        }
        self.bounds.insert(tile, *bounds);
    }

    fn remove(&mut self, tile: TileId) {
        let bounds = match self.bounds.remove(&tile) {
            Some(bounds) => bounds,
            None => return,
        };
        let mut touched = Vec::new();
        self.for_each_cell(&bounds, |cell| touched.push(cell));
        for cell in touched {
            if let Some(tiles) = self.cells.get_mut(&cell) {
                tiles.retain(|t| *t != tile);
                if tiles.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
    }

    fn clear(&mut self) {
        self.cells.clear();
        self.bounds.clear();
    }
}
