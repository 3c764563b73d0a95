//! Scripted scene double shared by the integration tests

#![allow(dead_code)]

use layercheck_core::{Pool, Reset, Vec3};
use layercheck_simulation::{BodyHandle, GeometryBuilder, JointLimits, PhysicsProvider, RayHit};

#[derive(Debug, Clone, Default)]
pub struct ScriptedBody {
    pub position: Vec3,
    pub kinematic: bool,
    pub gravity: bool,
    pub collidable: bool,
    pub failed: bool,
}

impl Reset for ScriptedBody {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Scene whose physics is whatever the test says it is
///
/// Every ray hits the ground unless `gap` says otherwise, and released
/// bodies sink at `sink_rate` units per second.
pub struct ScriptedScene {
    pub bodies: Pool<ScriptedBody>,
    pub gap: Box<dyn Fn(Vec3) -> bool>,
    pub sink_rate: f32,
    pub attached: Vec<(BodyHandle, BodyHandle)>,
    pub ignored: Vec<(BodyHandle, BodyHandle)>,
    pub released: usize,
    pub steps: usize,
}

impl ScriptedScene {
    pub fn new() -> Self {
        Self {
            bodies: Pool::new(8),
            gap: Box::new(|_| false),
            sink_rate: 0.0,
            attached: Vec::new(),
            ignored: Vec::new(),
            released: 0,
            steps: 0,
        }
    }

    pub fn body(&self, handle: BodyHandle) -> &ScriptedBody {
        self.bodies.get(handle.key()).expect("stale body handle")
    }

    pub fn displace(&mut self, handle: BodyHandle, offset: Vec3) {
        if let Some(body) = self.bodies.get_mut(handle.key()) {
            body.position += offset;
        }
    }

    pub fn live_bodies(&self) -> usize {
        self.bodies.in_use()
    }
}

impl GeometryBuilder for ScriptedScene {
    fn build(&mut self, start: Vec3, end: Vec3, _width: f32, _height: f32) -> BodyHandle {
        let key = self.bodies.acquire();
        if let Some(body) = self.bodies.get_mut(key) {
            body.position = (start + end) * 0.5;
            body.kinematic = true;
            body.collidable = true;
        }
        BodyHandle::from(key)
    }

    fn reset(&mut self, body: BodyHandle) {
        if let Some(body) = self.bodies.get_mut(body.key()) {
            body.failed = false;
        }
    }

    fn release(&mut self, body: BodyHandle) {
        if self.bodies.release(body.key()) {
            self.released += 1;
        }
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

impl PhysicsProvider for ScriptedScene {
    fn ray_down(&self, origin: Vec3, _max_distance: f32) -> Option<RayHit> {
        (!(self.gap)(origin)).then_some(RayHit {
            body: None,
            distance: 0.0,
        })
    }

    fn set_kinematic(&mut self, body: BodyHandle, kinematic: bool) {
        if let Some(body) = self.bodies.get_mut(body.key()) {
            body.kinematic = kinematic;
        }
    }

    fn set_gravity(&mut self, body: BodyHandle, enabled: bool) {
        if let Some(body) = self.bodies.get_mut(body.key()) {
            body.gravity = enabled;
        }
    }

    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec3) {
        self.displace(body, impulse);
    }

    fn current_position(&self, body: BodyHandle) -> Option<Vec3> {
        self.bodies.get(body.key()).map(|body| body.position)
    }

    fn attach(&mut self, body: BodyHandle, support: BodyHandle, _limits: JointLimits) {
        self.attached.push((body, support));
    }

    fn ignore_collision(&mut self, a: BodyHandle, b: BodyHandle) {
        self.ignored.push((a, b));
    }

    fn step(&mut self, dt: f32) {
        self.steps += 1;
        let sink = self.sink_rate * dt;
        let moving: Vec<_> = self
            .bodies
            .iter()
            .filter(|(_, body)| !body.kinematic && body.gravity)
            .map(|(key, _)| key)
            .collect();
        for key in moving {
            if let Some(body) = self.bodies.get_mut(key) {
                body.position.y -= sink;
            }
        }
    }
}
