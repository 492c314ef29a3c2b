//! The flow asset: the designer-authored description of a dungeon.
//!
//! A `DungeonFlow` is plain data. It can be built in code or loaded from RON
//! and is validated once before a generator is created from it.

use crate::injection::TileInjectionRule;
use crate::rules::ConnectionSettings;
use crate::template::{TemplateId, TileTemplate};
use crate::weights::{IntRange, TileSet, TileWeight};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid range for {what}: min {min} is greater than max {max}")]
    InvalidRange { what: String, min: f32, max: f32 },
    #[error("{what} refers to missing {kind} {index}")]
    MissingReference {
        what: String,
        kind: &'static str,
        index: usize,
    },
    #[error("negative weight in tile set '{0}'")]
    NegativeWeight(String),
    #[error("{what} position {position} is outside [0, 1]")]
    PositionOutOfRange { what: String, position: f32 },
    #[error("main path length must be at least 1")]
    EmptyMainPath,
    #[error("up axis must be non-zero")]
    ZeroUpAxis,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchCapType {
    /// Cap tiles replace the archetype's tile sets for the last tile of a branch.
    #[default]
    InsteadOf,
    /// Cap tiles are added to the archetype's tile sets for the last tile of a branch.
    AsWellAs,
}

/// How many branches the main path sprouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchMode {
    /// Each tile draws from its archetype's branch count.
    #[default]
    Local,
    /// One total for the whole dungeon, spread over eligible tiles.
    Global,
    /// One total per graph line, spread over that line's tiles.
    Section,
}

/// A style bucket applied to a stretch of the main path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Archetype {
    pub name: String,
    pub tile_sets: Vec<usize>,
    #[serde(default)]
    pub branch_cap_tile_sets: Vec<usize>,
    #[serde(default)]
    pub branch_cap_type: BranchCapType,
    pub branch_count: IntRange,
    pub branching_depth: IntRange,
    /// Chance that a tile on this archetype prefers to continue straight.
    #[serde(default)]
    pub straighten_chance: f32,
    /// Avoid reusing this archetype on another line while alternatives exist.
    #[serde(default)]
    pub unique: bool,
}

impl Archetype {
    pub fn new(name: impl Into<String>, tile_sets: Vec<usize>) -> Self {
        Archetype {
            name: name.into(),
            tile_sets,
            branch_cap_tile_sets: Vec::new(),
            branch_cap_type: BranchCapType::InsteadOf,
            branch_count: IntRange::exactly(0),
            branching_depth: IntRange::exactly(0),
            straighten_chance: 0.0,
            unique: false,
        }
    }

    /// Tile sets to use for a branch tile, substituting caps on the last tile.
    pub fn branch_tile_sets(&self, is_last: bool) -> Vec<usize> {
        if !is_last || self.branch_cap_tile_sets.is_empty() {
            return self.tile_sets.clone();
        }
        match self.branch_cap_type {
            BranchCapType::InsteadOf => self.branch_cap_tile_sets.clone(),
            BranchCapType::AsWellAs => self
                .tile_sets
                .iter()
                .chain(self.branch_cap_tile_sets.iter())
                .copied()
                .collect(),
        }
    }
}

/// A segment of the main path, covering `[position, position + length]`
/// in normalized depth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphLine {
    pub position: f32,
    pub length: f32,
    pub archetypes: Vec<usize>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Start,
    Goal,
    #[default]
    Normal,
}

/// A fixed point on the main path that forces its own tile sets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub label: String,
    pub position: f32,
    #[serde(default)]
    pub node_type: NodeType,
    pub tile_sets: Vec<usize>,
}

impl GraphNode {
    /// Start nodes pin to the first main-path tile and goal nodes to the last,
    /// whatever position they were authored at.
    pub fn effective_position(&self) -> f32 {
        match self.node_type {
            NodeType::Start => 0.0,
            NodeType::Goal => 1.0,
            NodeType::Normal => self.position,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PruneMode {
    /// Prune tips carrying any of the tags.
    #[default]
    AnyTagPresent,
    /// Prune tips carrying none of the tags.
    AllTagsMissing,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchPruneRule {
    pub mode: PruneMode,
    pub tags: Vec<String>,
}

impl BranchPruneRule {
    pub fn should_prune(&self, tags: &[String]) -> bool {
        if self.tags.is_empty() {
            return false;
        }
        let any = self.tags.iter().any(|t| tags.contains(t));
        match self.mode {
            PruneMode::AnyTagPresent => any,
            PruneMode::AllTagsMissing => !any,
        }
    }
}

/// Complete description of a dungeon to assemble.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DungeonFlow {
    pub templates: Vec<TileTemplate>,
    pub tile_sets: Vec<TileSet>,
    pub archetypes: Vec<Archetype>,
    pub lines: Vec<GraphLine>,
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    /// Target main-path length, inclusive.
    pub length: IntRange,
    #[serde(default)]
    pub branch_mode: BranchMode,
    /// Total branch count used by `BranchMode::Global`.
    #[serde(default = "no_branches")]
    pub global_branch_count: IntRange,
    #[serde(default)]
    pub injection_rules: Vec<TileInjectionRule>,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub branch_prune: Option<BranchPruneRule>,
    /// Chance that two coincident, unused doorways are joined after assembly.
    #[serde(default)]
    pub doorway_connection_chance: f32,
    #[serde(default)]
    pub restrict_connection_to_same_section: bool,
}

fn no_branches() -> IntRange {
    IntRange::exactly(0)
}

impl DungeonFlow {
    /// A flow with a single line covering the whole main path.
    pub fn single_line(
        templates: Vec<TileTemplate>,
        tile_sets: Vec<TileSet>,
        archetype: Archetype,
        length: IntRange,
    ) -> Self {
        DungeonFlow {
            templates,
            tile_sets,
            archetypes: vec![archetype],
            lines: vec![GraphLine {
                position: 0.0,
                length: 1.0,
                archetypes: vec![0],
            }],
            nodes: Vec::new(),
            length,
            branch_mode: BranchMode::Local,
            global_branch_count: no_branches(),
            injection_rules: Vec::new(),
            connection: ConnectionSettings::default(),
            branch_prune: None,
            doorway_connection_chance: 0.0,
            restrict_connection_to_same_section: false,
        }
    }

    pub fn from_ron_str(input: &str) -> Result<DungeonFlow, FlowError> {
        let flow: DungeonFlow = ron::from_str(input)?;
        flow.validate()?;
        Ok(flow)
    }

    pub fn load_from_ron(path: &Path) -> Result<DungeonFlow, FlowError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    pub fn template(&self, id: TemplateId) -> &TileTemplate {
        &self.templates[id.index()]
    }

    /// Concatenated entries of the given tile sets.
    pub fn entries_for(&self, tile_sets: &[usize]) -> Vec<TileWeight> {
        tile_sets
            .iter()
            .filter_map(|i| self.tile_sets.get(*i))
            .flat_map(|set| set.entries.iter().cloned())
            .collect()
    }

    /// Index of the line covering a normalized main-path depth.
    pub fn line_at(&self, depth: f32) -> Option<usize> {
        let containing = self
            .lines
            .iter()
            .position(|l| depth >= l.position && depth <= l.position + l.length);
        containing.or_else(|| {
            self.lines
                .iter()
                .enumerate()
                .filter(|(_, l)| l.position <= depth)
                .max_by(|(_, a), (_, b)| a.position.total_cmp(&b.position))
                .map(|(i, _)| i)
        })
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        check_range("flow length", self.length.min as f32, self.length.max as f32)?;
        if self.length.max < 1 {
            return Err(FlowError::EmptyMainPath);
        }
        check_range(
            "global branch count",
            self.global_branch_count.min as f32,
            self.global_branch_count.max as f32,
        )?;

        for set in &self.tile_sets {
            for entry in &set.entries {
                if entry.main_path_weight < 0.0 || entry.branch_path_weight < 0.0 {
                    return Err(FlowError::NegativeWeight(set.name.clone()));
                }
                check_index(&set.name, "template", entry.template.index(), self.templates.len())?;
            }
        }

        for archetype in &self.archetypes {
            for i in archetype.tile_sets.iter().chain(&archetype.branch_cap_tile_sets) {
                check_index(&archetype.name, "tile set", *i, self.tile_sets.len())?;
            }
            check_range(
                &format!("{} branch count", archetype.name),
                archetype.branch_count.min as f32,
                archetype.branch_count.max as f32,
            )?;
            check_range(
                &format!("{} branching depth", archetype.name),
                archetype.branching_depth.min as f32,
                archetype.branching_depth.max as f32,
            )?;
        }

        for (i, line) in self.lines.iter().enumerate() {
            let what = format!("line {}", i);
            check_position(&what, line.position)?;
            for a in &line.archetypes {
                check_index(&what, "archetype", *a, self.archetypes.len())?;
            }
        }

        for node in &self.nodes {
            check_position(&node.label, node.position)?;
            for s in &node.tile_sets {
                check_index(&node.label, "tile set", *s, self.tile_sets.len())?;
            }
        }

        for (i, rule) in self.injection_rules.iter().enumerate() {
            let what = format!("injection rule {}", i);
            check_index(&what, "tile set", rule.tile_set, self.tile_sets.len())?;
            check_range(&what, rule.path_depth.min, rule.path_depth.max)?;
            check_range(&what, rule.branch_depth.min, rule.branch_depth.max)?;
        }

        Ok(())
    }
}

fn check_range(what: &str, min: f32, max: f32) -> Result<(), FlowError> {
    if min > max {
        return Err(FlowError::InvalidRange {
            what: what.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

fn check_index(what: &str, kind: &'static str, index: usize, len: usize) -> Result<(), FlowError> {
    if index >= len {
        return Err(FlowError::MissingReference {
            what: what.to_string(),
            kind,
            index,
        });
    }
    Ok(())
}

fn check_position(what: &str, position: f32) -> Result<(), FlowError> {
    if !(0.0..=1.0).contains(&position) {
        return Err(FlowError::PositionOutOfRange {
            what: what.to_string(),
            position,
        });
    }
    Ok(())
}
