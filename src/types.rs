use std::time::Instant;

use nalgebra::{Point2, Vector2};

use crate::geometry::RotatedBox;

/// A captured image and the moment it was taken.
#[derive(Debug, Clone)]
pub struct Frame<I> {
    pub timestamp: Instant,
    pub data: I,
}

impl<I> Frame<I> {
    pub fn new(timestamp: Instant, data: I) -> Self {
        Frame { timestamp, data }
    }
}

/// Binarized intensity inside a candidate's bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityStats {
    pub mean: f64,
    pub std_dev: f64,
}

/// One extracted contour, reduced to what the validators look at.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeCandidate {
    pub rect: RotatedBox,
    pub contour_area: f64,
    pub hull_area: f64,
    /// Only filled in by the flow strip fan pass.
    pub intensity: Option<IntensityStats>,
}

impl ShapeCandidate {
    pub fn fill_ratio(&self) -> f64 {
        self.contour_area / self.rect.area()
    }

    pub fn solidity(&self) -> f64 {
        self.contour_area / self.hull_area
    }

    pub fn translated(&self, offset: Vector2<f64>) -> Self {
        ShapeCandidate {
            rect: self.rect.translated(offset),
            ..self.clone()
        }
    }
}

/// Output of the three extraction passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    pub armors: Vec<ShapeCandidate>,
    pub flow_strip_fans: Vec<ShapeCandidate>,
    pub center_rs: Vec<ShapeCandidate>,
}

impl CandidateSet {
    pub fn is_empty(&self) -> bool {
        self.armors.is_empty() && self.flow_strip_fans.is_empty() && self.center_rs.is_empty()
    }

    /// Moves every candidate from ROI-local into frame coordinates.
    pub fn translated(self, offset: Vector2<f64>) -> Self {
        let shift = |candidates: Vec<ShapeCandidate>| {
            candidates
                .iter()
                .map(|candidate| candidate.translated(offset))
                .collect()
        };

        CandidateSet {
            armors: shift(self.armors),
            flow_strip_fans: shift(self.flow_strip_fans),
            center_rs: shift(self.center_rs),
        }
    }
}

/// Raw solver output. Angles are in degrees, yaw positive to the right,
/// pitch positive up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolvedAngles {
    pub distance: f64,
    pub yaw: f64,
    pub pitch: f64,
}

/// Final aim command for one frame, owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmorPlate {
    /// Armor box moved to where it will be after the flight delay.
    pub rect: RotatedBox,
    pub predict_point: Point2<f64>,
    pub distance: f64,
    /// Yaw, degrees.
    pub angle_x: f64,
    /// Pitch, degrees, drop compensated.
    pub angle_y: f64,
    pub flight_time: f64,
    pub timestamp: Option<Instant>,
}

impl Default for ArmorPlate {
    fn default() -> Self {
        ArmorPlate {
            rect: RotatedBox::default(),
            predict_point: Point2::origin(),
            distance: 0.,
            angle_x: 0.,
            angle_y: 0.,
            flight_time: 0.,
            timestamp: None,
        }
    }
}
