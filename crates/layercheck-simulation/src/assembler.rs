//! Layer assembly
//!
//! Pulls beads out of the toolpath executor, buckets them into layers by
//! elevation and places them in the scene. Beads of every layer after the
//! first go through support analysis against the layer below before their
//! bodies are built.
//!
//! The assembler is resumable: [`LayerAssembler::fetch_layer`] executes a
//! bounded number of commands and returns [`Fetch::Pending`] when the
//! requested layer is not complete yet, so the caller can keep ticking the
//! scene between calls.

use std::collections::{BTreeSet, VecDeque};

use layercheck_core::{Error, Result, Segment};
use layercheck_gcode::{CommandStream, ExecutorSettings, Step, ToolpathExecutor};
use layercheck_settings::Config;
use tracing::{debug, info, trace};

use crate::layer::{Layer, LayerState};
use crate::scene::Scene;
use crate::support::{SupportAnalyzer, SupportAnalyzerSettings, SupportedSegment};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblerSettings {
    /// Beads closer than this vertically share a layer
    pub layer_height_tolerance: f32,
    /// Commands executed per [`LayerAssembler::fetch_layer`] call
    pub commands_per_iteration: usize,
}

impl AssemblerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            layer_height_tolerance: config.printer.layer_height_tolerance,
            commands_per_iteration: config.toolpath.commands_per_iteration,
        }
    }
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Answer to a [`LayerAssembler::fetch_layer`] request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// The layer is not complete yet; call again
    Pending,
    /// The layer is complete and sealed
    Ready(usize),
    /// The toolpath ended before the layer was started
    EndOfModel,
}

/// Builds layers from a toolpath
#[derive(Debug)]
pub struct LayerAssembler {
    executor: ToolpathExecutor,
    analyzer: SupportAnalyzer,
    settings: AssemblerSettings,
    layers: VecDeque<Layer>,
    retire_requests: BTreeSet<usize>,
    next_id: usize,
    finished: bool,
}

impl LayerAssembler {
    pub fn new(
        executor: ToolpathExecutor,
        analyzer: SupportAnalyzer,
        settings: AssemblerSettings,
    ) -> Self {
        Self {
            executor,
            analyzer,
            settings,
            layers: VecDeque::new(),
            retire_requests: BTreeSet::new(),
            next_id: 0,
            finished: false,
        }
    }

    pub fn from_config(config: &Config, stream: CommandStream) -> Self {
        Self::new(
            ToolpathExecutor::new(stream, ExecutorSettings::from_config(config)),
            SupportAnalyzer::new(SupportAnalyzerSettings::from_config(config)),
            AssemblerSettings::from_config(config),
        )
    }

    pub fn executor(&self) -> &ToolpathExecutor {
        &self.executor
    }

    pub fn layer(&self, id: usize) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id() == id)
    }

    /// Layers currently held, oldest first
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn held_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn max_layer_id(&self) -> Option<usize> {
        self.layers.back().map(Layer::id)
    }

    /// Whether the toolpath has been fully consumed
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Place one bead into the current layer, opening a new layer when its
    /// elevation differs from the current one
    pub fn add_segment<S: Scene + ?Sized>(&mut self, segment: Segment, scene: &mut S) {
        let opens_layer = self.layers.back().is_none_or(|current| {
            !current.accepts(segment.elevation(), self.settings.layer_height_tolerance)
        });
        if opens_layer {
            self.open_layer(scene);
        }

        let below = self
            .layers
            .len()
            .checked_sub(2)
            .and_then(|index| self.layers.get(index));
        let pieces = match below {
            Some(below) => self.analyzer.analyze(&segment, below, &*scene),
            None => vec![SupportedSegment {
                segment,
                supports: Vec::new(),
            }],
        };

        let Some(current) = self.layers.back_mut() else {
            return;
        };
        for piece in pieces {
            let seg = piece.segment;
            let body = scene.build(seg.start, seg.end, seg.width, seg.height);
            // Beads of the layer being built must not support each other
            scene.enable_collision(body, false);
            current.push(seg, body);
            for support in piece.supports {
                current.attach(body, support);
            }
        }
    }

    /// Advance the toolpath until layer `id` is complete
    ///
    /// Executes at most `commands_per_iteration` commands per call. Layers
    /// must be requested in order; asking for a layer that was already
    /// retired is an error.
    pub fn fetch_layer<S: Scene + ?Sized>(&mut self, id: usize, scene: &mut S) -> Result<Fetch> {
        if self.is_ready(id) {
            return Ok(Fetch::Ready(id));
        }
        if self.layers.front().is_some_and(|oldest| id < oldest.id()) {
            return Err(Error::other(format!("Layer {} has already been retired", id)));
        }
        if self.finished {
            return Ok(Fetch::EndOfModel);
        }

        for _ in 0..self.settings.commands_per_iteration.max(1) {
            match self.executor.step()? {
                Step::Deposited(segment) => {
                    self.add_segment(segment, scene);
                    if self.is_ready(id) {
                        return Ok(Fetch::Ready(id));
                    }
                }
                Step::Advanced => {}
                Step::Exhausted => {
                    self.finish(scene);
                    return Ok(if self.is_ready(id) {
                        Fetch::Ready(id)
                    } else {
                        Fetch::EndOfModel
                    });
                }
            }
        }
        Ok(Fetch::Pending)
    }

    /// Ask for a layer's bodies to be handed back to the scene
    ///
    /// The layer is released once a layer at least two above it exists, so
    /// the layer resting on it has always finished its own analysis first.
    pub fn retire<S: Scene + ?Sized>(&mut self, id: usize, scene: &mut S) {
        self.retire_requests.insert(id);
        self.release_retired(scene);
    }

    fn is_ready(&self, id: usize) -> bool {
        self.layer(id)
            .is_some_and(|layer| layer.state() == LayerState::Sealed)
    }

    fn open_layer<S: Scene + ?Sized>(&mut self, scene: &mut S) {
        if let Some(current) = self.layers.back_mut() {
            seal(current, scene);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.layers.push_back(Layer::new(id));
        debug!("Opened layer {}", id);
        self.release_retired(scene);
    }

    fn finish<S: Scene + ?Sized>(&mut self, scene: &mut S) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(last) = self.layers.back_mut() {
            seal(last, scene);
        }
        info!(
            "Toolpath exhausted: {} layers from {} segments",
            self.next_id,
            self.executor.segments_emitted()
        );
    }

    fn release_retired<S: Scene + ?Sized>(&mut self, scene: &mut S) {
        let Some(max_id) = self.max_layer_id() else {
            return;
        };
        let due: Vec<usize> = self
            .retire_requests
            .iter()
            .copied()
            .filter(|id| id + 2 <= max_id)
            .collect();

        for id in due {
            self.retire_requests.remove(&id);
            let Some(position) = self.layers.iter().position(|layer| layer.id() == id) else {
                continue;
            };
            if let Some(mut layer) = self.layers.remove(position) {
                for body in layer.bodies() {
                    scene.release(body);
                }
                layer.retire();
                debug!("Retired layer {} ({} bodies)", id, layer.len());
            }
        }
    }
}

fn seal<S: Scene + ?Sized>(layer: &mut Layer, scene: &mut S) {
    layer.seal();
    for body in layer.bodies() {
        scene.enable_collision(body, true);
    }
    trace!("Sealed layer {} with {} segments", layer.id(), layer.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessScene, HeadlessSettings};
    use layercheck_core::Vec3;

    fn assembler(gcode: &str) -> LayerAssembler {
        let config = Config::default();
        LayerAssembler::from_config(&config, CommandStream::parse(gcode).unwrap())
    }

    fn scene() -> HeadlessScene {
        HeadlessScene::new(HeadlessSettings {
            pool_batch: 16,
            ..Default::default()
        })
    }

    fn flat(x0: f32, x1: f32, y: f32) -> Segment {
        Segment::new(Vec3::new(x0, y, 5.0), Vec3::new(x1, y, 5.0), 0.2, 0.12)
    }

    fn fetch_blocking(
        assembler: &mut LayerAssembler,
        id: usize,
        scene: &mut HeadlessScene,
    ) -> Fetch {
        loop {
            match assembler.fetch_layer(id, scene).unwrap() {
                Fetch::Pending => continue,
                other => return other,
            }
        }
    }

    #[test]
    fn test_first_layer_is_not_analyzed() {
        let mut assembler = assembler("");
        let mut scene = scene();
        // Floating in mid-air, but nothing is checked on the first layer
        assembler.add_segment(flat(0.0, 10.0, 5.0), &mut scene);
        assert_eq!(assembler.layer(0).unwrap().len(), 1);
    }

    #[test]
    fn test_elevation_change_opens_and_seals() {
        let mut assembler = assembler("");
        let mut scene = scene();
        assembler.add_segment(flat(0.0, 10.0, 0.12), &mut scene);
        assembler.add_segment(flat(10.0, 20.0, 0.125), &mut scene);
        assert_eq!(assembler.held_layers(), 1);
        let first = assembler.layer(0).unwrap().segments()[0].body;
        assert!(!scene.body(first).unwrap().is_collidable());

        assembler.add_segment(flat(0.0, 10.0, 0.24), &mut scene);
        assert_eq!(assembler.held_layers(), 2);
        assert_eq!(assembler.layer(0).unwrap().state(), LayerState::Sealed);
        assert_eq!(assembler.layer(1).unwrap().state(), LayerState::Building);
        assert!(scene.body(first).unwrap().is_collidable());
    }

    #[test]
    fn test_overhang_is_split() {
        let mut assembler = assembler("");
        let mut scene = scene();
        assembler.add_segment(flat(0.0, 10.0, 0.12), &mut scene);
        assembler.add_segment(flat(0.0, 20.0, 0.24), &mut scene);

        let upper = assembler.layer(1).unwrap();
        assert_eq!(upper.len(), 2);
        assert_eq!(upper.segments()[0].segment.start.x, 0.0);
        assert_eq!(upper.segments()[1].segment.end.x, 20.0);
    }

    #[test]
    fn test_fetch_steps_are_bounded() {
        let mut assembler = assembler("G0 Z0.12\nG1 X10 E1\nG1 X20 E1\nG0 Z0.24\nG1 X10 E1\n");
        let mut scene = scene();

        for _ in 0..4 {
            assert_eq!(assembler.fetch_layer(0, &mut scene).unwrap(), Fetch::Pending);
        }
        assert_eq!(assembler.fetch_layer(0, &mut scene).unwrap(), Fetch::Ready(0));
        assert_eq!(assembler.executor().commands_executed(), 5);
    }

    #[test]
    fn test_last_layer_sealed_at_end() {
        let mut assembler = assembler("G0 Z0.12\nG1 X10 E1\nG0 Z0.24\nG1 X0 E1\n");
        let mut scene = scene();
        assert_eq!(fetch_blocking(&mut assembler, 1, &mut scene), Fetch::Ready(1));
        assert!(assembler.is_finished());
        assert_eq!(fetch_blocking(&mut assembler, 2, &mut scene), Fetch::EndOfModel);
    }

    #[test]
    fn test_retire_waits_for_two_layers_above() {
        let mut assembler = assembler("");
        let mut scene = scene();
        assembler.add_segment(flat(0.0, 10.0, 0.12), &mut scene);
        assembler.add_segment(flat(0.0, 10.0, 0.24), &mut scene);
        let body = assembler.layer(0).unwrap().segments()[0].body;

        assembler.retire(0, &mut scene);
        assert!(assembler.layer(0).is_some());
        assert!(scene.body(body).is_some());

        assembler.add_segment(flat(0.0, 10.0, 0.36), &mut scene);
        assert!(assembler.layer(0).is_none());
        assert!(scene.body(body).is_none());
        assert_eq!(assembler.held_layers(), 2);
    }

    #[test]
    fn test_fetch_of_retired_layer_is_error() {
        let mut assembler = assembler("");
        let mut scene = scene();
        for y in [0.12, 0.24, 0.36] {
            assembler.add_segment(flat(0.0, 10.0, y), &mut scene);
        }
        assembler.retire(0, &mut scene);
        assert!(assembler.fetch_layer(0, &mut scene).is_err());
    }

    #[test]
    fn test_released_bodies_are_reused() {
        let mut assembler = assembler("");
        let mut scene = HeadlessScene::new(HeadlessSettings {
            pool_batch: 3,
            ..Default::default()
        });
        for y in [0.12, 0.24, 0.36] {
            assembler.add_segment(flat(0.0, 10.0, y), &mut scene);
        }
        assembler.retire(0, &mut scene);
        let capacity = scene.pool().capacity();
        assembler.add_segment(flat(0.0, 10.0, 0.48), &mut scene);
        assert_eq!(scene.pool().capacity(), capacity);
        assert_eq!(scene.body_count(), 3);
    }
}
