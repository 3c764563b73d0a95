//! Support analysis
//!
//! A new bead is sampled along its centerline and each sample is probed
//! straight down for material within a little more than one layer height.
//! Unsupported runs of samples become bridge pieces, so a bead can come out
//! of analysis split in up to `2k + 1` pieces for `k` gaps. Each piece is
//! then probed along both of its side edges to find the beads of the layer
//! below it hangs off.

use layercheck_core::{Segment, Vec3};
use layercheck_settings::Config;
use tracing::trace;

use crate::layer::Layer;
use crate::scene::{BodyHandle, PhysicsProvider};

/// Lengths closer than this are treated as equal (mm)
const LENGTH_EPSILON: f32 = 1.0e-4;

/// Minimum number of samples a bead needs before gaps are looked for
const MIN_SAMPLES: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportAnalyzerSettings {
    /// Distance between samples along a bead
    pub sampling_resolution: f32,
    /// Downward reach of each support probe
    pub search_distance: f32,
}

impl SupportAnalyzerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sampling_resolution: config.support.sampling_resolution,
            search_distance: config.support.search_distance(config.printer.layer_height),
        }
    }
}

impl Default for SupportAnalyzerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A piece of a bead together with the beads it is attached to
#[derive(Debug, Clone, PartialEq)]
pub struct SupportedSegment {
    pub segment: Segment,
    pub supports: Vec<BodyHandle>,
}

#[derive(Debug, Clone, Default)]
pub struct SupportAnalyzer {
    settings: SupportAnalyzerSettings,
}

impl SupportAnalyzer {
    pub fn new(settings: SupportAnalyzerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SupportAnalyzerSettings {
        &self.settings
    }

    /// Split `segment` at its unsupported gaps and find each piece's
    /// attachments in `below`
    pub fn analyze<P: PhysicsProvider + ?Sized>(
        &self,
        segment: &Segment,
        below: &Layer,
        physics: &P,
    ) -> Vec<SupportedSegment> {
        self.split(segment, physics)
            .into_iter()
            .map(|piece| SupportedSegment {
                supports: self.attachments(&piece, below, physics),
                segment: piece,
            })
            .collect()
    }

    /// Split a bead into supported pieces and bridges
    ///
    /// Returns the bead unchanged when it has no gap or is too short to
    /// sample.
    pub fn split<P: PhysicsProvider + ?Sized>(
        &self,
        segment: &Segment,
        physics: &P,
    ) -> Vec<Segment> {
        let step = self.settings.sampling_resolution;
        let length = segment.length();
        if length < step * MIN_SAMPLES {
            return vec![*segment];
        }

        let samples = sample_count(length, step);
        let supported: Vec<bool> = (0..=samples)
            .map(|i| self.is_supported(segment.point_at(i as f32 * step), physics))
            .collect();

        let mut pieces = Vec::new();
        let mut cursor = 0.0;
        let mut i = 0;
        while i < supported.len() {
            if supported[i] {
                i += 1;
                continue;
            }
            let first = i;
            while i < supported.len() && !supported[i] {
                i += 1;
            }
            let last = i - 1;

            // Widen the gap by one sample on each side so the bridge reaches
            // the material that carries it
            let gap_start = (first as f32 * step - step).max(cursor);
            let gap_end = (last as f32 * step + step).min(length);
            if gap_start - cursor > LENGTH_EPSILON {
                pieces.push(piece_of(segment, cursor, gap_start));
            }
            pieces.push(piece_of(segment, gap_start, gap_end));
            cursor = gap_end;
        }

        if pieces.is_empty() {
            return vec![*segment];
        }
        if length - cursor > LENGTH_EPSILON {
            pieces.push(piece_of(segment, cursor, length));
        }
        trace!("Split bead of length {:.3} into {} pieces", length, pieces.len());
        pieces
    }

    fn is_supported<P: PhysicsProvider + ?Sized>(&self, point: Vec3, physics: &P) -> bool {
        physics.ray_down(point, self.settings.search_distance).is_some()
    }

    /// Beads of `below` that carry exactly one side edge of `piece`
    fn attachments<P: PhysicsProvider + ?Sized>(
        &self,
        piece: &Segment,
        below: &Layer,
        physics: &P,
    ) -> Vec<BodyHandle> {
        let step = self.settings.sampling_resolution;
        let side = piece.lateral() * (piece.width * 0.5);
        let reach = self.settings.search_distance;

        let mut supports = Vec::new();
        for i in 0..=sample_count(piece.length(), step) {
            let point = piece.point_at(i as f32 * step);
            let left = physics.ray_down(point + side, reach);
            let right = physics.ray_down(point - side, reach);
            let edge = match (left, right) {
                (Some(hit), None) | (None, Some(hit)) => hit.body,
                _ => None,
            };
            if let Some(body) = edge {
                if below.contains(body) && !supports.contains(&body) {
                    supports.push(body);
                }
            }
        }
        supports
    }
}

/// Index of the last sample taken along `length` at spacing `step`
fn sample_count(length: f32, step: f32) -> usize {
    if step <= 0.0 {
        return 0;
    }
    (length / step + LENGTH_EPSILON).floor() as usize
}

/// Sub-segment that reuses the exact endpoints where the piece touches them
fn piece_of(segment: &Segment, from: f32, to: f32) -> Segment {
    let mut piece = segment.sub_segment(from, to);
    if from <= LENGTH_EPSILON {
        piece.start = segment.start;
    }
    if segment.length() - to <= LENGTH_EPSILON {
        piece.end = segment.end;
    }
    piece
}
