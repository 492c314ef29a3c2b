//! Placement gate: position a candidate against its frontier doorway, test it
//! against the hard bounds and the broadphase, and commit it on success.

use crate::constants::DOORWAY_ANGLE_TOLERANCE_DEGREES;
use crate::geometry::{is_vertical, yaw_between, Bounds};
use crate::pairing::{find_pairs, DoorwayPair, PairingRequest};
use crate::pipeline::{Environment, Workspace};
use crate::proxy::{DoorwayRef, DoorwaySlot, TileId, TileNode, TilePlacement};
use crate::settings::GeneratorSettings;
use crate::template::TemplateId;
use crate::weights::TileWeight;
use fnv::FnvHashSet;
use glam::{Quat, Vec3};
use log::*;
use serde::{Deserialize, Serialize};

/// Result of one placement attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlacementOutcome {
    Success(TileId),
    OutOfBounds {
        template: TemplateId,
        bounds: Bounds,
    },
    CollidingWithExisting {
        template: TemplateId,
        bounds: Bounds,
    },
    /// The catalog for the slot had no template with a positive weight.
    NoTemplateAvailable { on_main_path: bool, depth: f32 },
    /// No doorway on the frontier could take any candidate template.
    NoValidDoorwayPairing {
        previous: Option<TileId>,
        templates: usize,
    },
    RequiredInjectionFailed { tile_set: usize },
}

/// Variant tag of a `PlacementOutcome`, used for counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutcomeKind {
    Success,
    OutOfBounds,
    CollidingWithExisting,
    NoTemplateAvailable,
    NoValidDoorwayPairing,
    RequiredInjectionFailed,
}

impl OutcomeKind {
    pub fn name(self) -> &'static str {
        match self {
            OutcomeKind::Success => "Success",
            OutcomeKind::OutOfBounds => "Out of bounds",
            OutcomeKind::CollidingWithExisting => "Colliding with existing tile",
            OutcomeKind::NoTemplateAvailable => "No template available",
            OutcomeKind::NoValidDoorwayPairing => "No valid doorway pairing",
            OutcomeKind::RequiredInjectionFailed => "Required injection failed",
        }
    }
}

impl PlacementOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            PlacementOutcome::Success(_) => OutcomeKind::Success,
            PlacementOutcome::OutOfBounds { .. } => OutcomeKind::OutOfBounds,
            PlacementOutcome::CollidingWithExisting { .. } => OutcomeKind::CollidingWithExisting,
            PlacementOutcome::NoTemplateAvailable { .. } => OutcomeKind::NoTemplateAvailable,
            PlacementOutcome::NoValidDoorwayPairing { .. } => OutcomeKind::NoValidDoorwayPairing,
            PlacementOutcome::RequiredInjectionFailed { .. } => OutcomeKind::RequiredInjectionFailed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PlacementOutcome::Success(_))
    }
}

/// One tile slot to fill: where it attaches and what it may be.
#[derive(Clone, Debug)]
pub(crate) struct TileSlot {
    pub previous: Option<TileId>,
    pub entries: Vec<TileWeight>,
    /// Flow metadata copied onto whichever tile fills the slot.
    pub placement: TilePlacement,
    pub straighten_chance: f32,
}

impl TileSlot {
    fn depth(&self) -> f32 {
        if self.placement.is_on_main_path {
            self.placement.normalized_path_depth
        } else {
            self.placement.normalized_branch_depth
        }
    }
}

/// Rotate and translate `node` so its doorway `entrance` sits on `exit`,
/// facing back along it.
pub fn align_to_doorway(node: &mut TileNode, exit: &DoorwaySlot, entrance: usize, up: Vec3, allow_rotation: bool) {
    let local_forward = node.doorways[entrance].local_forward;
    let local_position = node.doorways[entrance].local_position;

    let rotation = if allow_rotation && !is_vertical(local_forward, up, DOORWAY_ANGLE_TOLERANCE_DEGREES) {
        yaw_between(local_forward, -exit.forward, up)
    } else {
        Quat::IDENTITY
    };
    let position = exit.position - rotation * local_position;
    node.set_transform(position, rotation);
}

/// Bounds used for overlap tests: shrunk by the overlap threshold so tiles
/// meeting at a doorway do not collide, then grown by the padding.
pub fn collision_bounds(bounds: &Bounds, settings: &GeneratorSettings) -> Bounds {
    bounds.expanded(settings.padding - settings.overlap_threshold)
}

pub fn within_placement_bounds(bounds: &Bounds, settings: &GeneratorSettings) -> bool {
    settings.placement_bounds.map_or(true, |limit| limit.contains(bounds))
}

/// Fill `slot`, trying ranked candidates until one fits.
///
/// Every rejected candidate is recorded in the workspace failure log. The
/// returned failure is the last one recorded.
pub(crate) fn try_place(env: &Environment, ws: &mut Workspace, slot: &TileSlot) -> PlacementOutcome {
    let on_main_path = slot.placement.is_on_main_path;
    let depth = slot.depth();

    let has_template = slot.entries.iter().any(|e| e.weight(on_main_path, depth) > 0.0);
    if !has_template {
        let outcome = PlacementOutcome::NoTemplateAvailable { on_main_path, depth };
        ws.record_failure(&outcome);
        return outcome;
    }

    let used: FnvHashSet<TemplateId> = ws.graph.tiles().map(|(_, t)| t.template).collect();
    let pairs: Vec<DoorwayPair> = {
        let request = PairingRequest {
            flow: env.flow,
            settings: env.settings,
            rules: env.rules,
            previous: slot.previous.and_then(|id| ws.graph.tile(id)),
            entries: &slot.entries,
            on_main_path,
            depth,
            straighten_chance: slot.straighten_chance,
            used_templates: &used,
        };
        find_pairs(&request, &mut ws.rng)
    };

    if pairs.is_empty() {
        let outcome = PlacementOutcome::NoValidDoorwayPairing {
            previous: slot.previous,
            templates: slot.entries.len(),
        };
        ws.record_failure(&outcome);
        return outcome;
    }

    let mut last = None;
    for pair in &pairs {
        ws.stats.candidates_tested += 1;
        match place_candidate(env, ws, slot, pair) {
            PlacementOutcome::Success(id) => return PlacementOutcome::Success(id),
            failure => {
                ws.record_failure(&failure);
                last = Some(failure);
            }
        }
    }

    last.unwrap_or(PlacementOutcome::NoValidDoorwayPairing {
        previous: slot.previous,
        templates: slot.entries.len(),
    })
}

fn place_candidate(env: &Environment, ws: &mut Workspace, slot: &TileSlot, pair: &DoorwayPair) -> PlacementOutcome {
    let template = env.flow.template(pair.template);
    let allow_rotation = env.settings.allow_rotation_override.unwrap_or(template.allow_rotation);

    let mut node = ws.pool.acquire(pair.template, template);
    node.placement = TilePlacement {
        entrance: pair.next_doorway,
        ..slot.placement.clone()
    };

    match (slot.previous, pair.previous_doorway, pair.next_doorway) {
        (Some(previous), Some(exit), Some(entrance)) => {
            let exit_slot = ws.graph.tile(previous).and_then(|t| t.doorways.get(exit));
            match exit_slot {
                Some(exit_slot) => {
                    align_to_doorway(&mut node, exit_slot, entrance, env.settings.up_axis, allow_rotation)
                }
                None => {
                    ws.pool.release(node);
                    return PlacementOutcome::NoValidDoorwayPairing {
                        previous: slot.previous,
                        templates: slot.entries.len(),
                    };
                }
            }
        }
        _ => node.set_transform(Vec3::ZERO, Quat::IDENTITY),
    }

    let bounds = node.placement.bounds;
    if !within_placement_bounds(&bounds, env.settings) {
        trace!("{} out of bounds at {:?}", template.name, node.placement.position);
        ws.pool.release(node);
        return PlacementOutcome::OutOfBounds {
            template: pair.template,
            bounds,
        };
    }

    if ws
        .broadphase
        .is_colliding(&collision_bounds(&bounds, env.settings), slot.previous)
    {
        trace!("{} collides at {:?}", template.name, node.placement.position);
        ws.pool.release(node);
        return PlacementOutcome::CollidingWithExisting {
            template: pair.template,
            bounds,
        };
    }

    let id = ws.graph.commit(node);
    if let (Some(previous), Some(exit), Some(entrance)) = (slot.previous, pair.previous_doorway, pair.next_doorway) {
        ws.graph.connect(
            DoorwayRef {
                tile: previous,
                doorway: exit,
            },
            DoorwayRef {
                tile: id,
                doorway: entrance,
            },
        );
    }
    ws.broadphase.add(id, &collision_bounds(&bounds, env.settings));
    ws.stats.tiles_placed += 1;
    trace!("Placed {} as {:?}", template.name, id);

    PlacementOutcome::Success(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::TilePool;
    use crate::template::{DoorwayTemplate, TileTemplate};

    fn room() -> TileTemplate {
        TileTemplate::new("room", Bounds::new(Vec3::new(-2.0, 0.0, -2.0), Vec3::new(2.0, 3.0, 2.0)))
            .with_doorway(DoorwayTemplate::new("door", Vec3::new(0.0, 0.0, -2.0), -Vec3::Z))
            .with_doorway(DoorwayTemplate::new("door", Vec3::new(2.0, 0.0, 0.0), Vec3::X))
    }

    #[test]
    fn aligned_doorways_coincide_and_face_each_other() {
        let mut pool = TilePool::new();
        let mut previous = pool.acquire(TemplateId(0), &room());
        previous.set_transform(Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY);
        let exit = previous.doorways[1].clone();

        let mut next = pool.acquire(TemplateId(0), &room());
        align_to_doorway(&mut next, &exit, 0, Vec3::Y, true);

        let entrance = &next.doorways[0];
        assert!((entrance.position - exit.position).length() < 1e-4);
        assert!(entrance.forward.dot(exit.forward) < -0.999);
        assert!(!collision_bounds(&next.placement.bounds, &GeneratorSettings::default())
            .overlaps(&collision_bounds(&previous.placement.bounds, &GeneratorSettings::default())));
    }

    #[test]
    fn fixed_rotation_keeps_identity() {
        let mut pool = TilePool::new();
        let mut previous = pool.acquire(TemplateId(0), &room());
        previous.set_transform(Vec3::ZERO, Quat::IDENTITY);
        let exit = previous.doorways[1].clone();
        let mut next = pool.acquire(TemplateId(0), &room());
        align_to_doorway(&mut next, &exit, 0, Vec3::Y, false);
        assert_eq!(next.placement.rotation, Quat::IDENTITY);
    }

    #[test]
    fn hard_bounds_must_contain_the_tile() {
        let settings = GeneratorSettings {
            placement_bounds: Some(Bounds::new(Vec3::splat(-5.0), Vec3::splat(5.0))),
            ..Default::default()
        };
        assert!(within_placement_bounds(&Bounds::new(Vec3::ZERO, Vec3::ONE), &settings));
        assert!(!within_placement_bounds(&Bounds::new(Vec3::ZERO, Vec3::splat(6.0)), &settings));
        assert!(within_placement_bounds(
            &Bounds::new(Vec3::ZERO, Vec3::splat(60.0)),
            &GeneratorSettings::default()
        ));
    }

    #[test]
    fn outcome_names_are_distinct() {
        let kinds = [
            OutcomeKind::Success,
            OutcomeKind::OutOfBounds,
            OutcomeKind::CollidingWithExisting,
            OutcomeKind::NoTemplateAvailable,
            OutcomeKind::NoValidDoorwayPairing,
            OutcomeKind::RequiredInjectionFailed,
        ];
        let names: FnvHashSet<&str> = kinds.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), kinds.len());
        assert_eq!(
            PlacementOutcome::RequiredInjectionFailed { tile_set: 0 }.kind(),
            OutcomeKind::RequiredInjectionFailed
        );
    }
}
