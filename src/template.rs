//! Designer-authored tile templates: the shapes the assembler can place.

use crate::geometry::Bounds;
use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Index of a template in `DungeonFlow::templates`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateId(pub u32);

impl TemplateId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DoorwayFlags: u8 {
        const NONE = 0;
        /// Never used for a connection.
        const DISABLED = 1;
        /// Designated entrance. When a template has any, only those can be entrances.
        const ENTRANCE = 2;
        /// Designated exit. When a template has any, only those can be exits.
        /// An exit is never used as an entrance.
        const EXIT = 4;
    }
}

impl Default for DoorwayFlags {
    fn default() -> Self {
        DoorwayFlags::NONE
    }
}

/// How often a template may repeat within one dungeon.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepeatMode {
    #[default]
    Allow,
    /// Never directly after a tile of the same template.
    DisallowImmediate,
    /// At most once per dungeon.
    Disallow,
}

/// A typed connection point on a template, in tile-local space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DoorwayTemplate {
    pub socket: String,
    pub position: Vec3,
    /// Direction the doorway faces, pointing out of the tile.
    pub forward: Vec3,
    #[serde(default)]
    pub flags: DoorwayFlags,
}

impl DoorwayTemplate {
    pub fn new(socket: impl Into<String>, position: Vec3, forward: Vec3) -> Self {
        DoorwayTemplate {
            socket: socket.into(),
            position,
            forward: forward.normalize_or_zero(),
            flags: DoorwayFlags::NONE,
        }
    }

    pub fn with_flags(mut self, flags: DoorwayFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.contains(DoorwayFlags::DISABLED)
    }
}

/// A placeable level chunk with a bounding volume and a fixed set of doorways.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileTemplate {
    pub name: String,
    pub doorways: Vec<DoorwayTemplate>,
    pub bounds: Bounds,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_allow_rotation")]
    pub allow_rotation: bool,
    #[serde(default)]
    pub repeat_mode: RepeatMode,
}

fn default_allow_rotation() -> bool {
    true
}

impl TileTemplate {
    pub fn new(name: impl Into<String>, bounds: Bounds) -> Self {
        TileTemplate {
            name: name.into(),
            doorways: Vec::new(),
            bounds,
            tags: Vec::new(),
            allow_rotation: true,
            repeat_mode: RepeatMode::Allow,
        }
    }

    pub fn with_doorway(mut self, doorway: DoorwayTemplate) -> Self {
        self.doorways.push(doorway);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_rotation(mut self, allow_rotation: bool) -> Self {
        self.allow_rotation = allow_rotation;
        self
    }

    pub fn with_repeat_mode(mut self, repeat_mode: RepeatMode) -> Self {
        self.repeat_mode = repeat_mode;
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    fn has_designated(&self, flag: DoorwayFlags) -> bool {
        self.doorways.iter().any(|d| d.flags.contains(flag))
    }

    /// Whether doorway `index` may be used to leave this tile.
    pub fn can_exit_through(&self, index: usize) -> bool {
        let doorway = &self.doorways[index];
        if doorway.is_disabled() {
            return false;
        }
        !self.has_designated(DoorwayFlags::EXIT) || doorway.flags.contains(DoorwayFlags::EXIT)
    }

    /// Whether doorway `index` may be used to enter this tile.
    pub fn can_enter_through(&self, index: usize) -> bool {
        let doorway = &self.doorways[index];
        if doorway.is_disabled() || doorway.flags.contains(DoorwayFlags::EXIT) {
            return false;
        }
        !self.has_designated(DoorwayFlags::ENTRANCE) || doorway.flags.contains(DoorwayFlags::ENTRANCE)
    }
}
