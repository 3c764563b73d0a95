//! Headless scene
//!
//! A minimal rigid-bead world that implements both collaborator traits
//! without a rendering engine. Beads are kept in a pooled free-list, rays
//! are tested against the beads' top surfaces and a flat print bed at
//! `y = 0`, and released beads fall under gravity until they come to rest
//! on something below them or are held by an intact joint.

use layercheck_core::{Pool, Reset, Segment, Vec3};
use layercheck_settings::Config;
use tracing::{debug, trace};

use crate::scene::{BodyHandle, GeometryBuilder, JointLimits, PhysicsProvider, RayHit};

/// Slack allowed when deciding whether two surfaces touch
const CONTACT_TOLERANCE: f32 = 1.0e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Joint {
    support: BodyHandle,
    limits: JointLimits,
    broken: bool,
}

/// A simulated bead
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    segment: Segment,
    offset: Vec3,
    velocity: Vec3,
    kinematic: bool,
    gravity: bool,
    collidable: bool,
    failed: bool,
    joints: Vec<Joint>,
    ignored: Vec<BodyHandle>,
}

impl Default for Body {
    fn default() -> Self {
        Self {
            segment: Segment::new(Vec3::ZERO, Vec3::ZERO, 0.0, 0.0),
            offset: Vec3::ZERO,
            velocity: Vec3::ZERO,
            kinematic: true,
            gravity: false,
            collidable: true,
            failed: false,
            joints: Vec::new(),
            ignored: Vec::new(),
        }
    }
}

impl Reset for Body {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Body {
    /// The bead at its current location
    pub fn segment(&self) -> Segment {
        Segment::new(
            self.segment.start + self.offset,
            self.segment.end + self.offset,
            self.segment.width,
            self.segment.height,
        )
    }

    pub fn position(&self) -> Vec3 {
        self.segment.center() + self.offset
    }

    /// Distance moved since the bead was built
    pub fn displacement(&self) -> f32 {
        self.offset.length()
    }

    pub fn is_kinematic(&self) -> bool {
        self.kinematic
    }

    pub fn has_gravity(&self) -> bool {
        self.gravity
    }

    pub fn is_collidable(&self) -> bool {
        self.collidable
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn intact_joints(&self) -> usize {
        self.joints.iter().filter(|joint| !joint.broken).count()
    }

    fn ignores(&self, other: BodyHandle) -> bool {
        self.ignored.contains(&other)
    }

    /// Distance from `origin` straight down to this bead's top surface
    fn surface_below(&self, origin: Vec3) -> Option<f32> {
        let seg = self.segment();
        let flat = |v: Vec3| Vec3::new(v.x, 0.0, v.z);
        let (a, b, p) = (flat(seg.start), flat(seg.end), flat(origin));

        let ab = b - a;
        let len_sq = ab.length_squared();
        let t = if len_sq <= f32::EPSILON {
            0.0
        } else {
            (p - a).dot(ab) / len_sq
        };
        let along_tolerance = if len_sq <= f32::EPSILON {
            0.0
        } else {
            CONTACT_TOLERANCE / len_sq.sqrt()
        };
        if t < -along_tolerance || t > 1.0 + along_tolerance {
            return None;
        }
        let t = t.clamp(0.0, 1.0);
        if p.distance(a + ab * t) > seg.width * 0.5 + CONTACT_TOLERANCE {
            return None;
        }

        let top = seg.start.y + (seg.end.y - seg.start.y) * t;
        if origin.y + CONTACT_TOLERANCE < top - seg.height {
            return None;
        }
        Some((origin.y - top).max(0.0))
    }
}

/// Headless scene settings
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessSettings {
    pub gravity: f32,
    pub material_density: f32,
    /// Bed extent along world X and Z; `None` for no bed
    pub bed_size: Option<(f32, f32)>,
    pub pool_batch: usize,
}

impl HeadlessSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            gravity: config.stability.gravity,
            material_density: config.stability.material_density,
            bed_size: Some((config.printer.bed_size_x, config.printer.bed_size_y)),
            pool_batch: config.printer.line_pool_batch,
        }
    }
}

impl Default for HeadlessSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Built-in scene backed by a pooled body free-list
#[derive(Debug)]
pub struct HeadlessScene {
    bodies: Pool<Body>,
    settings: HeadlessSettings,
}

impl HeadlessScene {
    pub fn new(settings: HeadlessSettings) -> Self {
        Self {
            bodies: Pool::new(settings.pool_batch),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(HeadlessSettings::from_config(config))
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle.key())
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter().map(|(key, body)| (BodyHandle::from(key), body))
    }

    pub fn body_count(&self) -> usize {
        self.bodies.in_use()
    }

    pub fn pool(&self) -> &Pool<Body> {
        &self.bodies
    }

    fn nearest_below(
        &self,
        origin: Vec3,
        max_distance: f32,
        include: impl Fn(BodyHandle, &Body) -> bool,
    ) -> Option<RayHit> {
        let beads = self.bodies.iter().filter_map(|(key, body)| {
            let handle = BodyHandle::from(key);
            if !body.collidable || !include(handle, body) {
                return None;
            }
            body.surface_below(origin).map(|distance| RayHit {
                body: Some(handle),
                distance,
            })
        });
        let bed = self
            .bed_below(origin)
            .map(|distance| RayHit { body: None, distance });

        beads
            .chain(bed)
            .filter(|hit| hit.distance <= max_distance)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn bed_below(&self, origin: Vec3) -> Option<f32> {
        let (size_x, size_z) = self.settings.bed_size?;
        let on_bed = (0.0..=size_x).contains(&origin.x) && (0.0..=size_z).contains(&origin.z);
        (on_bed && origin.y >= -CONTACT_TOLERANCE).then(|| origin.y.max(0.0))
    }

    /// Whether something one bead height below holds `handle` up
    ///
    /// The midpoint alone is enough; otherwise both ends must be carried.
    /// Hits much closer than a bead height are overlapping neighbours, not
    /// material underneath.
    fn is_resting(&self, handle: BodyHandle) -> bool {
        let Some(body) = self.body(handle) else {
            return false;
        };
        let seg = body.segment();
        let reach = seg.height + CONTACT_TOLERANCE;
        let floor = seg.height * 0.5;

        let carried = |point: Vec3| {
            self.nearest_below(point, reach, |other, other_body| {
                other != handle && !body.ignores(other) && !other_body.ignores(handle)
            })
            .is_some_and(|hit| hit.distance >= floor)
        };

        carried(seg.center()) || (carried(seg.start) && carried(seg.end))
    }

    fn weight(&self, body: &Body) -> f32 {
        if body.gravity {
            body.segment.volume() * self.settings.material_density * self.settings.gravity
        } else {
            0.0
        }
    }

    fn update_joints(&mut self, handle: BodyHandle) {
        let Some(body) = self.body(handle) else {
            return;
        };
        let force = self.weight(body);
        let torque = force * body.segment.length() * 0.5;
        let alive: Vec<bool> = body
            .joints
            .iter()
            .map(|joint| self.bodies.contains(joint.support.key()))
            .collect();

        let Some(body) = self.bodies.get_mut(handle.key()) else {
            return;
        };
        for (joint, alive) in body.joints.iter_mut().zip(alive) {
            if joint.broken {
                continue;
            }
            if !alive || force > joint.limits.break_force || torque > joint.limits.break_torque {
                joint.broken = true;
                debug!(
                    "Joint between {} and {} broke (force {:.3e}, torque {:.3e})",
                    handle, joint.support, force, torque
                );
            }
        }
    }
}

impl GeometryBuilder for HeadlessScene {
    fn build(&mut self, start: Vec3, end: Vec3, width: f32, height: f32) -> BodyHandle {
        let key = self.bodies.acquire();
        if let Some(body) = self.bodies.get_mut(key) {
            body.segment = Segment::new(start, end, width, height);
        }
        let handle = BodyHandle::from(key);
        trace!("Built {} from {} to {}", handle, start, end);
        handle
    }

    fn reset(&mut self, body: BodyHandle) {
        if let Some(body) = self.bodies.get_mut(body.key()) {
            let segment = body.segment;
            body.reset();
            body.segment = segment;
        }
    }

    fn release(&mut self, body: BodyHandle) {
        self.bodies.release(body.key());
    }

    fn enable_collision(&mut self, body: BodyHandle, enabled: bool) {
        if let Some(body) = self.bodies.get_mut(body.key()) {
            body.collidable = enabled;
        }
    }

    fn mark_failed(&mut self, body: BodyHandle) {
        if let Some(body) = self.bodies.get_mut(body.key()) {
            body.failed = true;
        }
    }
}

impl PhysicsProvider for HeadlessScene {
    fn ray_down(&self, origin: Vec3, max_distance: f32) -> Option<RayHit> {
        self.nearest_below(origin, max_distance, |_, _| true)
    }

    fn set_kinematic(&mut self, body: BodyHandle, kinematic: bool) {
        if let Some(body) = self.bodies.get_mut(body.key()) {
            body.kinematic = kinematic;
            if kinematic {
                body.velocity = Vec3::ZERO;
            }
        }
    }

    fn set_gravity(&mut self, body: BodyHandle, enabled: bool) {
        if let Some(body) = self.bodies.get_mut(body.key()) {
            body.gravity = enabled;
        }
    }

    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec3) {
        let density = self.settings.material_density;
        if let Some(body) = self.bodies.get_mut(body.key()) {
            let mass = body.segment.volume() * density;
            if !body.kinematic && mass > f32::EPSILON {
                body.velocity += impulse / mass;
            }
        }
    }

    fn current_position(&self, body: BodyHandle) -> Option<Vec3> {
        self.body(body).map(Body::position)
    }

    fn attach(&mut self, body: BodyHandle, support: BodyHandle, limits: JointLimits) {
        if let Some(body) = self.bodies.get_mut(body.key()) {
            body.joints.push(Joint {
                support,
                limits,
                broken: false,
            });
        }
    }

    fn ignore_collision(&mut self, a: BodyHandle, b: BodyHandle) {
        if let Some(body) = self.bodies.get_mut(a.key()) {
            body.ignored.push(b);
        }
        if let Some(body) = self.bodies.get_mut(b.key()) {
            body.ignored.push(a);
        }
    }

    fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let dynamic: Vec<BodyHandle> = self
            .bodies()
            .filter(|(_, body)| !body.kinematic)
            .map(|(handle, _)| handle)
            .collect();

        for handle in dynamic {
            self.update_joints(handle);
            let resting = self.is_resting(handle);
            let gravity = self.settings.gravity;
            let Some(body) = self.bodies.get_mut(handle.key()) else {
                continue;
            };

            if body.intact_joints() > 0 {
                body.velocity = Vec3::ZERO;
            } else if resting {
                body.velocity = Vec3::new(0.0, body.velocity.y.max(0.0), 0.0);
            } else if body.gravity {
                body.velocity.y -= gravity * dt;
            }
            body.offset += body.velocity * dt;

            let bottom = body.segment.start.y.min(body.segment.end.y) + body.offset.y
                - body.segment.height;
            if bottom < 0.0 && self.settings.bed_size.is_some() {
                body.offset.y -= bottom;
                body.velocity.y = body.velocity.y.max(0.0);
            }
        }
    }
}
