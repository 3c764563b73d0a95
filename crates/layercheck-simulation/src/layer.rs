//! Layers of deposited beads

use std::collections::HashSet;

use layercheck_core::Segment;
use serde::{Deserialize, Serialize};

use crate::scene::BodyHandle;

/// Lifecycle of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerState {
    /// Still receiving segments
    Building,
    /// A later layer has started, or the toolpath ended
    Sealed,
    /// Bodies handed back to the scene
    Retired,
}

/// A bead placed in the scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedSegment {
    pub segment: Segment,
    pub body: BodyHandle,
}

/// A bead resting on a bead of the layer below
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentEdge {
    pub segment: BodyHandle,
    pub support: BodyHandle,
}

/// All beads deposited at one height
#[derive(Debug, Clone)]
pub struct Layer {
    id: usize,
    reference_elevation: Option<f32>,
    state: LayerState,
    segments: Vec<PlacedSegment>,
    bodies: HashSet<BodyHandle>,
    attachments: Vec<AttachmentEdge>,
}

impl Layer {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            reference_elevation: None,
            state: LayerState::Building,
            segments: Vec::new(),
            bodies: HashSet::new(),
            attachments: Vec::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    /// Elevation of the first bead placed in this layer
    pub fn reference_elevation(&self) -> Option<f32> {
        self.reference_elevation
    }

    pub fn segments(&self) -> &[PlacedSegment] {
        &self.segments
    }

    pub fn bodies(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.segments.iter().map(|placed| placed.body)
    }

    pub fn attachments(&self) -> &[AttachmentEdge] {
        &self.attachments
    }

    pub fn contains(&self, body: BodyHandle) -> bool {
        self.bodies.contains(&body)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether a bead at `elevation` belongs to this layer
    ///
    /// An empty layer accepts anything.
    pub fn accepts(&self, elevation: f32, tolerance: f32) -> bool {
        self.reference_elevation
            .is_none_or(|reference| (elevation - reference).abs() < tolerance)
    }

    pub(crate) fn push(&mut self, segment: Segment, body: BodyHandle) {
        self.reference_elevation.get_or_insert(segment.elevation());
        self.segments.push(PlacedSegment { segment, body });
        self.bodies.insert(body);
    }

    pub(crate) fn attach(&mut self, segment: BodyHandle, support: BodyHandle) {
        self.attachments.push(AttachmentEdge { segment, support });
    }

    pub(crate) fn seal(&mut self) {
        if self.state == LayerState::Building {
            self.state = LayerState::Sealed;
        }
    }

    pub(crate) fn retire(&mut self) {
        self.state = LayerState::Retired;
    }
}
