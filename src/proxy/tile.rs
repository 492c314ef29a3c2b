//! Proxy tiles and their doorway slots.

use crate::geometry::Bounds;
use crate::template::{DoorwayFlags, TemplateId, TileTemplate};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Stable index of a committed tile in the proxy graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(pub u32);

/// Stable index of a connection in the proxy graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

/// A doorway slot addressed by its owning tile and its index on that tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DoorwayRef {
    pub tile: TileId,
    pub doorway: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DoorwaySlot {
    pub index: usize,
    pub socket: String,
    pub flags: DoorwayFlags,
    pub local_position: Vec3,
    pub local_forward: Vec3,
    /// World-space position, valid once the owning tile is positioned.
    pub position: Vec3,
    /// World-space facing, valid once the owning tile is positioned.
    pub forward: Vec3,
    pub(crate) owner: Option<TileId>,
    pub(crate) connection: Option<ConnectionId>,
}

impl DoorwaySlot {
    pub fn owner(&self) -> Option<TileId> {
        self.owner
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn is_used(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.contains(DoorwayFlags::DISABLED)
    }

    /// Free for a new connection.
    pub fn is_available(&self) -> bool {
        !self.is_used() && !self.is_disabled()
    }
}

/// Where a tile sits and which part of the flow produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TilePlacement {
    pub position: Vec3,
    pub rotation: Quat,
    /// World bounds, after rotation and translation.
    pub bounds: Bounds,
    pub is_on_main_path: bool,
    pub path_depth: usize,
    pub normalized_path_depth: f32,
    pub branch_id: Option<usize>,
    pub branch_depth: usize,
    pub normalized_branch_depth: f32,
    pub archetype: Option<usize>,
    pub graph_node: Option<usize>,
    pub graph_line: Option<usize>,
    /// Index of the injection request this tile satisfies.
    pub injection: Option<usize>,
    pub injection_required: bool,
    pub injection_locked: bool,
    /// Doorway used to enter this tile, `None` for the first tile.
    pub entrance: Option<usize>,
}

impl Default for TilePlacement {
    fn default() -> Self {
        TilePlacement {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            bounds: Bounds::new(Vec3::ZERO, Vec3::ZERO),
            is_on_main_path: false,
            path_depth: 0,
            normalized_path_depth: 0.0,
            branch_id: None,
            branch_depth: 0,
            normalized_branch_depth: 0.0,
            archetype: None,
            graph_node: None,
            graph_line: None,
            injection: None,
            injection_required: false,
            injection_locked: false,
            entrance: None,
        }
    }
}

/// Lifecycle of a proxy tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileState {
    /// Candidate under test, not yet in the graph.
    Proposed,
    /// Registered in the graph and the broadphase.
    Committed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileNode {
    pub(crate) id: Option<TileId>,
    pub template: TemplateId,
    pub doorways: Vec<DoorwaySlot>,
    pub local_bounds: Bounds,
    pub tags: Vec<String>,
    pub placement: TilePlacement,
}

impl TileNode {
    pub(crate) fn empty() -> Self {
        TileNode {
            id: None,
            template: TemplateId(0),
            doorways: Vec::new(),
            local_bounds: Bounds::new(Vec3::ZERO, Vec3::ZERO),
            tags: Vec::new(),
            placement: TilePlacement::default(),
        }
    }

    /// Clear everything, keeping allocations for reuse.
    pub(crate) fn reset(&mut self) {
        self.id = None;
        self.template = TemplateId(0);
        self.doorways.clear();
        self.local_bounds = Bounds::new(Vec3::ZERO, Vec3::ZERO);
        self.tags.clear();
        self.placement = TilePlacement::default();
    }

    /// Fill a reset node from a template, in the proposed state.
    pub(crate) fn load(&mut self, template_id: TemplateId, template: &TileTemplate) {
        self.template = template_id;
        self.local_bounds = template.bounds;
        self.tags.extend(template.tags.iter().cloned());
        self.doorways.extend(template.doorways.iter().enumerate().map(|(index, d)| DoorwaySlot {
            index,
            socket: d.socket.clone(),
            flags: d.flags,
            local_position: d.position,
            local_forward: d.forward,
            position: d.position,
            forward: d.forward,
            owner: None,
            connection: None,
        }));
        self.placement.bounds = template.bounds;
    }

    pub fn id(&self) -> Option<TileId> {
        self.id
    }

    pub fn state(&self) -> TileState {
        if self.id.is_some() {
            TileState::Committed
        } else {
            TileState::Proposed
        }
    }

    /// Move the tile and refresh world-space doorways and bounds.
    pub fn set_transform(&mut self, position: Vec3, rotation: Quat) {
        self.placement.position = position;
        self.placement.rotation = rotation;
        self.placement.bounds = self.local_bounds.transformed(position, rotation);
        for slot in &mut self.doorways {
            slot.position = position + rotation * slot.local_position;
            slot.forward = (rotation * slot.local_forward).normalize_or_zero();
        }
    }

    pub fn available_doorways(&self) -> impl Iterator<Item = &DoorwaySlot> {
        self.doorways.iter().filter(|d| d.is_available())
    }

    pub fn unused_doorway_count(&self) -> usize {
        self.available_doorways().count()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
