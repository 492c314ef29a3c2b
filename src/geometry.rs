//! Bounding volumes and the small amount of rotation math needed to align
//! one tile's doorway against another's.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box defined by min and max corners.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Bounds {
            min: min.min(max),
            max: max.max(min),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Grow (or shrink, for negative amounts) every face by `amount`.
    /// Shrinking never inverts the box; it collapses onto its center instead.
    pub fn expanded(&self, amount: f32) -> Bounds {
        let center = self.center();
        let half = (self.size() * 0.5 + Vec3::splat(amount)).max(Vec3::ZERO);
        Bounds {
            min: center - half,
            max: center + half,
        }
    }

    /// World-space bounds of this local box after rotating then translating it.
    /// Non-axis-aligned rotations produce the enclosing box of the rotated corners.
    pub fn transformed(&self, position: Vec3, rotation: Quat) -> Bounds {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let world = position + rotation * corner;
            min = min.min(world);
            max = max.max(world);
        }
        Bounds { min, max }
    }

    /// Strict overlap: boxes that only share a face do not overlap.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// True if `other` lies entirely inside this box.
    pub fn contains(&self, other: &Bounds) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }
}

/// Unsigned angle between two directions, in degrees.
pub fn angle_degrees(a: Vec3, b: Vec3) -> f32 {
    if a.length_squared() == 0.0 || b.length_squared() == 0.0 {
        return 180.0;
    }
    a.cross(b).length().atan2(a.dot(b)).to_degrees()
}

/// True if `direction` points along the up axis (either way) within `tolerance` degrees.
pub fn is_vertical(direction: Vec3, up: Vec3, tolerance: f32) -> bool {
    angle_degrees(direction, up) <= tolerance || angle_degrees(direction, -up) <= tolerance
}

/// Rotation about `up` that turns the horizontal component of `from` onto
/// the horizontal component of `to`.
pub fn yaw_between(from: Vec3, to: Vec3, up: Vec3) -> Quat {
    let up = up.normalize_or_zero();
    let from = (from - up * from.dot(up)).normalize_or_zero();
    let to = (to - up * to.dot(up)).normalize_or_zero();
    if from == Vec3::ZERO || to == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let angle = up.dot(from.cross(to)).atan2(from.dot(to));
    Quat::from_axis_angle(up, angle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_boxes_do_not_overlap() {
        let a = Bounds::new(Vec3::ZERO, Vec3::splat(2.0));
        let b = Bounds::new(Vec3::new(2.0, 0.0, 0.0), Vec3::new(4.0, 2.0, 2.0));
        assert!(!a.overlaps(&b));
        let c = Bounds::new(Vec3::new(1.5, 0.0, 0.0), Vec3::new(4.0, 2.0, 2.0));
        assert!(a.overlaps(&c));
    }

    #[test]
    fn shrink_never_inverts() {
        let a = Bounds::new(Vec3::ZERO, Vec3::ONE);
        let shrunk = a.expanded(-5.0);
        assert_eq!(shrunk.size(), Vec3::ZERO);
        assert_eq!(shrunk.center(), a.center());
    }

    #[test]
    fn quarter_turn_swaps_extents() {
        let a = Bounds::new(Vec3::new(-1.0, 0.0, -3.0), Vec3::new(1.0, 1.0, 3.0));
        let rotated = a.transformed(Vec3::ZERO, Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        assert!((rotated.size().x - 6.0).abs() < 1e-4);
        assert!((rotated.size().z - 2.0).abs() < 1e-4);
    }

    #[test]
    fn yaw_aligns_horizontal_directions() {
        let rotation = yaw_between(Vec3::Z, Vec3::X, Vec3::Y);
        let turned = rotation * Vec3::Z;
        assert!(angle_degrees(turned, Vec3::X) < 0.01);

        let flipped = yaw_between(Vec3::Z, -Vec3::Z, Vec3::Y);
        assert!(angle_degrees(flipped * Vec3::Z, -Vec3::Z) < 0.01);
    }

    #[test]
    fn vertical_detection() {
        assert!(is_vertical(Vec3::Y, Vec3::Y, 1.0));
        assert!(is_vertical(-Vec3::Y, Vec3::Y, 1.0));
        assert!(!is_vertical(Vec3::X, Vec3::Y, 1.0));
    }
}
