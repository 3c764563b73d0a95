//! Deposited-material geometry
//!
//! World space is Y-up. Toolpaths are Z-up, so the toolpath Y and Z axes are
//! swapped on the way in: toolpath `(x, y, z)` lands at world `(x, z, y)`.

pub use glam::Vec3;
use serde::{Deserialize, Serialize};

/// World "up" axis
pub const UP: Vec3 = Vec3::Y;

/// Map a toolpath coordinate triple into world space
pub fn toolpath_to_world(x: f32, y: f32, z: f32) -> Vec3 {
    Vec3::new(x, z, y)
}

/// One unit of deposited material
///
/// A straight bead from `start` to `end` with a rectangular cross-section.
/// The points sit on the top centerline of the bead; the material extends
/// `height` below them and `width / 2` to either side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Vec3,
    pub end: Vec3,
    pub width: f32,
    pub height: f32,
}

impl Segment {
    pub fn new(start: Vec3, end: Vec3, width: f32, height: f32) -> Self {
        Self {
            start,
            end,
            width,
            height,
        }
    }

    pub fn length(&self) -> f32 {
        self.start.distance(self.end)
    }

    /// Unit vector from start to end, zero for a degenerate segment
    pub fn direction(&self) -> Vec3 {
        (self.end - self.start).normalize_or_zero()
    }

    pub fn center(&self) -> Vec3 {
        (self.start + self.end) * 0.5
    }

    /// Vertical coordinate used to bucket the segment into a layer
    pub fn elevation(&self) -> f32 {
        self.center().y
    }

    /// Point `distance` along the centerline, measured from `start`
    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.start + self.direction() * distance
    }

    /// Horizontal unit vector perpendicular to the bead
    ///
    /// Falls back to world X for vertical or degenerate segments.
    pub fn lateral(&self) -> Vec3 {
        let side = UP.cross(self.direction());
        if side.length_squared() <= f32::EPSILON {
            Vec3::X
        } else {
            side.normalize()
        }
    }

    /// The part of this bead between two distances along its centerline
    pub fn sub_segment(&self, from: f32, to: f32) -> Segment {
        Segment::new(self.point_at(from), self.point_at(to), self.width, self.height)
    }

    pub fn volume(&self) -> f32 {
        self.length() * self.width * self.height
    }
}
