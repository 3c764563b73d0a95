//! Collaborator interfaces between the simulation and the scene
//!
//! The simulation never owns physics or geometry itself. It asks a
//! [`GeometryBuilder`] to turn segments into bodies and a [`PhysicsProvider`]
//! to query and drive those bodies. A [`Scene`] is anything that does both;
//! [`HeadlessScene`](crate::HeadlessScene) is the built-in implementation.

use layercheck_core::{PoolKey, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a body built by a [`GeometryBuilder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(PoolKey);

impl BodyHandle {
    pub fn key(&self) -> PoolKey {
        self.0
    }
}

impl From<PoolKey> for BodyHandle {
    fn from(key: PoolKey) -> Self {
        Self(key)
    }
}

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body {}", self.0)
    }
}

/// Result of a downward ray query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Body that was hit, `None` for static scenery such as the print bed
    pub body: Option<BodyHandle>,
    /// Distance from the ray origin to the hit point
    pub distance: f32,
}

/// Breaking thresholds of an attachment joint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    pub break_force: f32,
    pub break_torque: f32,
}

/// Turns segments into physical bodies and manages their lifecycle
pub trait GeometryBuilder {
    /// Build a body for a bead, reusing a pooled one when available
    fn build(&mut self, start: Vec3, end: Vec3, width: f32, height: f32) -> BodyHandle;

    /// Restore a body to its neutral state without releasing it
    fn reset(&mut self, body: BodyHandle);

    /// Hand a body back to the pool; stale handles are ignored
    fn release(&mut self, body: BodyHandle);

    fn enable_collision(&mut self, body: BodyHandle, enabled: bool);

    /// Flag a body as having failed evaluation
    fn mark_failed(&mut self, body: BodyHandle);
}

/// Queries and drives simulated bodies
pub trait PhysicsProvider {
    /// Cast a ray straight down from `origin`, returning the nearest hit
    /// within `max_distance`
    fn ray_down(&self, origin: Vec3, max_distance: f32) -> Option<RayHit>;

    /// Kinematic bodies are pinned in place
    fn set_kinematic(&mut self, body: BodyHandle, kinematic: bool);

    fn set_gravity(&mut self, body: BodyHandle, enabled: bool);

    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec3);

    /// Current center of a body, `None` if the handle no longer resolves
    fn current_position(&self, body: BodyHandle) -> Option<Vec3>;

    /// Join `body` to `support` with a joint that breaks at `limits`
    fn attach(&mut self, body: BodyHandle, support: BodyHandle, limits: JointLimits);

    /// Stop two bodies from colliding with each other
    fn ignore_collision(&mut self, a: BodyHandle, b: BodyHandle);

    /// Advance the simulation by `dt` seconds
    fn step(&mut self, dt: f32);
}

/// Geometry and physics behind a single object
pub trait Scene: GeometryBuilder + PhysicsProvider {}

impl<T: GeometryBuilder + PhysicsProvider> Scene for T {}
