//! Doorway pairing: enumerate and rank the ways a new tile can attach to the
//! frontier tile.
//!
//! Draw order for one tile slot, which seed reproducibility depends on:
//!
//! 1. One draw per positive-weight catalog entry to build the template
//!    priority order.
//! 2. Enumeration runs over the frontier's exits in slot order, then the
//!    templates in priority order, then each template's doorways in slot order.
//!    Every pair that passes the directional and connection checks consumes
//!    one draw for its pair weight.
//! 3. The straighten flag is drawn once, immediately before the first pair
//!    weight, and only when the archetype has a non-zero straighten chance and
//!    the frontier tile was itself entered through a doorway.

use crate::constants::*;
use crate::flow::DungeonFlow;
use crate::geometry::{angle_degrees, is_vertical};
use crate::proxy::{DoorwaySlot, TileNode};
use crate::random::RandomStream;
use crate::rules::{ConnectionRules, DoorwayEnd, ProposedConnection};
use crate::settings::GeneratorSettings;
use crate::template::{RepeatMode, TemplateId, TileTemplate};
use crate::weights::{weighted_order, TileWeight};
use fnv::FnvHashSet;
use glam::Vec3;
use log::*;

/// One way of attaching a template to the frontier.
#[derive(Clone, Debug, PartialEq)]
pub struct DoorwayPair {
    /// Exit slot on the frontier tile. `None` for the first tile of the dungeon.
    pub previous_doorway: Option<usize>,
    pub template: TemplateId,
    /// Entrance doorway on the new template. `None` for the first tile.
    pub next_doorway: Option<usize>,
    pub tile_order_weight: f32,
    pub pair_weight: f64,
}

/// Everything the pairing engine reads for one tile slot.
pub struct PairingRequest<'a> {
    pub flow: &'a DungeonFlow,
    pub settings: &'a GeneratorSettings,
    pub rules: &'a ConnectionRules,
    pub previous: Option<&'a TileNode>,
    pub entries: &'a [TileWeight],
    pub on_main_path: bool,
    /// Normalized path depth on the main path, normalized branch depth on branches.
    pub depth: f32,
    pub straighten_chance: f32,
    /// Templates already present in the dungeon, for `RepeatMode::Disallow`.
    pub used_templates: &'a FnvHashSet<TemplateId>,
}

impl<'a> PairingRequest<'a> {
    fn repeat_mode(&self, template: &TileTemplate) -> RepeatMode {
        self.settings.repeat_mode_override.unwrap_or(template.repeat_mode)
    }

    fn allows_rotation(&self, template: &TileTemplate) -> bool {
        self.settings.allow_rotation_override.unwrap_or(template.allow_rotation)
    }

    fn repeat_allowed(&self, id: TemplateId, template: &TileTemplate) -> bool {
        match self.repeat_mode(template) {
            RepeatMode::Allow => true,
            RepeatMode::DisallowImmediate => self.previous.map_or(true, |p| p.template != id),
            RepeatMode::Disallow => !self.used_templates.contains(&id),
        }
    }
}

/// Whether a world-space exit and a template-local entrance can face each other.
pub fn directions_compatible(
    exit_forward: Vec3,
    entrance_forward: Vec3,
    up: Vec3,
    allow_rotation: bool,
) -> bool {
    let tolerance = DOORWAY_ANGLE_TOLERANCE_DEGREES;
    let exit_vertical = is_vertical(exit_forward, up, tolerance);
    let entrance_vertical = is_vertical(entrance_forward, up, tolerance);

    if exit_vertical != entrance_vertical {
        return false;
    }
    if exit_vertical {
        return exit_forward.dot(entrance_forward) < 0.0;
    }
    allow_rotation || angle_degrees(exit_forward, -entrance_forward) <= tolerance
}

/// Direction of travel into `tile`, if it was entered through a doorway.
fn inbound_direction(tile: &TileNode) -> Option<Vec3> {
    tile.placement
        .entrance
        .and_then(|i| tile.doorways.get(i))
        .map(|d| -d.forward)
}

/// Ranked candidate pairs for one tile slot, best first.
pub fn find_pairs(request: &PairingRequest, rng: &mut RandomStream) -> Vec<DoorwayPair> {
    let order: Vec<TileWeight> = weighted_order(request.entries, request.on_main_path, request.depth, rng)
        .into_iter()
        .filter(|entry| {
            request
                .flow
                .templates
                .get(entry.template.index())
                .map_or(false, |t| request.repeat_allowed(entry.template, t))
        })
        .collect();

    let order_weight = |index: usize| (order.len() - index) as f32;

    let previous = match request.previous {
        Some(previous) => previous,
        None => {
            return order
                .iter()
                .enumerate()
                .map(|(i, entry)| DoorwayPair {
                    previous_doorway: None,
                    template: entry.template,
                    next_doorway: None,
                    tile_order_weight: order_weight(i),
                    pair_weight: 1.0,
                })
                .collect();
        }
    };

    let previous_template = request.flow.template(previous.template);
    let inbound = inbound_direction(previous);
    let mut straighten: Option<bool> = None;
    let mut pairs = Vec::new();

    let exits = previous
        .doorways
        .iter()
        .filter(|slot| slot.is_available() && previous_template.can_exit_through(slot.index));

    for exit in exits {
        for (order_index, entry) in order.iter().enumerate() {
            let template = request.flow.template(entry.template);
            let allow_rotation = request.allows_rotation(template);

            for (door_index, door) in template.doorways.iter().enumerate() {
                if !template.can_enter_through(door_index) {
                    continue;
                }
                if !directions_compatible(exit.forward, door.forward, request.settings.up_axis, allow_rotation) {
                    trace!(
                        "Rejecting {}:{} against exit {}: facing",
                        template.name,
                        door_index,
                        exit.index
                    );
                    continue;
                }

                let proposal = ProposedConnection {
                    previous: DoorwayEnd {
                        template_id: previous.template,
                        template: previous_template,
                        doorway_index: exit.index,
                        doorway: &previous_template.doorways[exit.index],
                    },
                    next: DoorwayEnd {
                        template_id: entry.template,
                        template,
                        doorway_index: door_index,
                        doorway: door,
                    },
                };
                if !request.rules.can_connect(&proposal) {
                    trace!(
                        "Rejecting {}:{} against exit {}: connection rules",
                        template.name,
                        door_index,
                        exit.index
                    );
                    continue;
                }

                let straighten = *straighten.get_or_insert_with(|| {
                    request.straighten_chance > 0.0
                        && inbound.is_some()
                        && rng.next_f64() < request.straighten_chance as f64
                });

                let mut pair_weight = rng.next_f64();
                if straighten && !continues_straight(exit, inbound) {
                    pair_weight = 0.0;
                }

                pairs.push(DoorwayPair {
                    previous_doorway: Some(exit.index),
                    template: entry.template,
                    next_doorway: Some(door_index),
                    tile_order_weight: order_weight(order_index),
                    pair_weight,
                });
            }
        }
    }

    pairs.sort_by(|a, b| {
        b.tile_order_weight
            .total_cmp(&a.tile_order_weight)
            .then(b.pair_weight.total_cmp(&a.pair_weight))
    });
    if let Some(max) = request.settings.max_pairing_attempts {
        pairs.truncate(max);
    }
    pairs
}

fn continues_straight(exit: &DoorwaySlot, inbound: Option<Vec3>) -> bool {
    inbound.map_or(true, |dir| angle_degrees(exit.forward, dir) <= STRAIGHT_PATH_TOLERANCE_DEGREES)
}
