//! # LayerCheck Simulation
//!
//! Layer-by-layer structural simulation of additive-manufacturing toolpaths.
//!
//! Beads coming out of the toolpath executor are grouped into layers by
//! elevation. Every layer after the first is checked for unsupported spans
//! against the layer below, placed in a physics scene, released under
//! gravity onto its pinned predecessor and judged by how far its beads move.

pub mod assembler;
pub mod headless;
pub mod layer;
pub mod orchestrator;
pub mod scene;
pub mod stability;
pub mod support;

pub use assembler::{AssemblerSettings, Fetch, LayerAssembler};
pub use headless::{Body, HeadlessScene, HeadlessSettings};
pub use layer::{AttachmentEdge, Layer, LayerState, PlacedSegment};
pub use orchestrator::{BuildSimulation, BuildStatus, LayerReport};
pub use scene::{BodyHandle, GeometryBuilder, JointLimits, PhysicsProvider, RayHit, Scene};
pub use stability::{
    EvaluatorSettings, EvaluatorState, FailedSegment, Progress, StabilityEvaluator,
    StabilityOutcome,
};
pub use support::{SupportAnalyzer, SupportAnalyzerSettings, SupportedSegment};
