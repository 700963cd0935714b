//! Simulated energy mechanism for the simulator binary and the tests.
//!
//! The scene renders the shapes an extractor would find rather than pixels:
//! the active blade carries an armor and a flow strip fan, hit blades show a
//! solid lit fan and their armor, and the center marker is always visible.

use std::{f64::consts::PI, time::Instant};

use anyhow::Result;
use nalgebra::{Point2, Vector2};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::{
    direction::Rotation,
    geometry::{point_at_polar, FrameSize, RotatedBox},
    motion::SpeedModel,
    roi::Roi,
    traits::{ContourExtractor, ImageData},
    types::{CandidateSet, Frame, IntensityStats, ShapeCandidate},
};

const ARMOR_SIZE: (f64, f64) = (46.5, 25.8);
/// Fans span from beyond the center to past the armor, so radii up to the
/// fan length minus the armor offset stay inside them.
const FAN_SIZE: (f64, f64) = (110., 46.);
const CENTER_SIZE: (f64, f64) = (12., 12.);

const FLOW_STRIP_INTENSITY: IntensityStats = IntensityStats {
    mean: 120.,
    std_dev: 120.,
};
const SOLID_INTENSITY: IntensityStats = IntensityStats {
    mean: 255.,
    std_dev: 0.,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Armor,
    FlowStripFan,
    CenterR,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneShape {
    pub kind: ShapeKind,
    pub rect: RotatedBox,
    pub intensity: Option<IntensityStats>,
}

/// One rendered frame: its size and every visible shape in frame
/// coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneImage {
    pub size: FrameSize,
    pub shapes: Vec<SceneShape>,
}

impl ImageData for SceneImage {
    fn size(&self) -> FrameSize {
        self.size
    }
}

pub struct SyntheticScene {
    pub center: Point2<f64>,
    pub radius: f64,
    pub rotation: Rotation,
    pub model: SpeedModel,
    /// Polar angle of blade 0 at `t = 0`, radians.
    pub initial_angle: f64,
    pub blades: usize,
    pub active_blade: usize,
    /// Whether the inactive blades are lit (already hit).
    pub lit_inactive: bool,
    size: FrameSize,
    noise: Option<Normal<f64>>,
    rng: StdRng,
}

impl SyntheticScene {
    pub fn new(center: Point2<f64>, radius: f64, rotation: Rotation, model: SpeedModel) -> Self {
        SyntheticScene {
            center,
            radius,
            rotation,
            model,
            initial_angle: 0.,
            blades: 5,
            active_blade: 0,
            lit_inactive: false,
            size: FrameSize::new(640, 480),
            noise: None,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn with_frame_size(mut self, size: FrameSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_initial_angle(mut self, angle: f64) -> Self {
        self.initial_angle = angle;
        self
    }

    pub fn with_lit_inactive(mut self, lit: bool) -> Self {
        self.lit_inactive = lit;
        self
    }

    /// Gaussian position noise, in pixels, on every shape center.
    pub fn with_noise(mut self, std_dev: f64, seed: u64) -> Result<Self> {
        self.noise = Some(Normal::new(0., std_dev)?);
        self.rng = StdRng::seed_from_u64(seed);
        Ok(self)
    }

    pub fn frame_size(&self) -> FrameSize {
        self.size
    }

    /// Polar angle of `blade` at `t` seconds.
    pub fn blade_angle(&self, blade: usize, t: f64) -> f64 {
        let spacing = 2. * PI / self.blades.max(1) as f64;
        self.initial_angle + spacing * blade as f64 + self.rotation.sign() * self.model.theta_func(t)
    }

    /// True armor center of the active blade at `t`.
    pub fn target_position(&self, t: f64) -> Point2<f64> {
        point_at_polar(self.center, self.radius, self.blade_angle(self.active_blade, t))
    }

    fn jitter(&mut self, point: Point2<f64>) -> Point2<f64> {
        match &self.noise {
            Some(noise) => {
                let offset = Vector2::new(noise.sample(&mut self.rng), noise.sample(&mut self.rng));
                point + offset
            }
            None => point,
        }
    }

    fn blade_shapes(&mut self, blade: usize, t: f64) -> [SceneShape; 2] {
        let angle = self.blade_angle(blade, t);
        // Radial direction on screen as a clockwise image angle.
        let radial_degrees = -angle.to_degrees();

        let armor_center = self.jitter(point_at_polar(self.center, self.radius, angle));
        let fan_center = self.jitter(point_at_polar(self.center, self.radius / 2., angle));
        let intensity = if blade == self.active_blade {
            FLOW_STRIP_INTENSITY
        } else {
            SOLID_INTENSITY
        };

        [
            SceneShape {
                kind: ShapeKind::Armor,
                rect: RotatedBox::new(armor_center, ARMOR_SIZE.0, ARMOR_SIZE.1, radial_degrees + 90.),
                intensity: None,
            },
            SceneShape {
                kind: ShapeKind::FlowStripFan,
                rect: RotatedBox::new(fan_center, FAN_SIZE.0, FAN_SIZE.1, radial_degrees),
                intensity: Some(intensity),
            },
        ]
    }

    /// Renders the mechanism as seen at `t` seconds.
    pub fn render(&mut self, timestamp: Instant, t: f64) -> Frame<SceneImage> {
        let mut shapes = Vec::with_capacity(2 * self.blades + 1);

        for blade in 0..self.blades {
            if blade == self.active_blade || self.lit_inactive {
                shapes.extend(self.blade_shapes(blade, t));
            }
        }

        let center = self.jitter(self.center);
        shapes.push(SceneShape {
            kind: ShapeKind::CenterR,
            rect: RotatedBox::new(center, CENTER_SIZE.0, CENTER_SIZE.1, 0.),
            intensity: None,
        });

        Frame::new(
            timestamp,
            SceneImage {
                size: self.size,
                shapes,
            },
        )
    }

    /// A frame with nothing in view.
    pub fn blank(&self, timestamp: Instant) -> Frame<SceneImage> {
        Frame::new(
            timestamp,
            SceneImage {
                size: self.size,
                shapes: Vec::new(),
            },
        )
    }
}

/// Reports every scene shape whose center falls inside the ROI.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticExtractor;

impl ContourExtractor<SceneImage> for SyntheticExtractor {
    fn extract_from(&self, frame: &Frame<SceneImage>, roi: &Roi) -> Result<CandidateSet> {
        let mut candidates = CandidateSet::default();
        let to_local = -roi.offset_f64();

        for shape in frame.data.shapes.iter() {
            if !roi.rect.contains(shape.rect.center) {
                continue;
            }

            let area = shape.rect.area();
            let candidate = ShapeCandidate {
                rect: shape.rect.translated(to_local),
                contour_area: area * 0.9,
                hull_area: area * 0.95,
                intensity: shape.intensity,
            };

            match shape.kind {
                ShapeKind::Armor => candidates.armors.push(candidate),
                ShapeKind::FlowStripFan => candidates.flow_strip_fans.push(candidate),
                ShapeKind::CenterR => candidates.center_rs.push(candidate),
            }
        }

        Ok(candidates)
    }
}
