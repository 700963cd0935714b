//! Rotation direction inferred from the recent angle history.

use tracing::debug;

use crate::history::AngleHistory;

/// Deltas smaller than this carry no direction information.
const MIN_DELTA: f64 = 1e-6;
const MIN_CONSISTENT_DELTAS: usize = 2;
const CONFIDENCE_GAIN: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Undetermined,
    /// Clockwise on screen.
    Clockwise,
    CounterClockwise,
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::Undetermined
    }
}

impl Rotation {
    /// Sign of the polar angle change: counter-clockwise is positive.
    pub fn sign(self) -> f64 {
        match self {
            Rotation::Clockwise => -1.,
            Rotation::CounterClockwise => 1.,
            Rotation::Undetermined => 0.,
        }
    }

    pub fn is_determined(self) -> bool {
        self != Rotation::Undetermined
    }
}

#[derive(Debug, Clone, Default)]
pub struct RotationEstimator {
    rotation: Rotation,
    confidence: f64,
}

impl RotationEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Smoothed agreement between fresh deltas and the held direction.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Re-evaluates the direction; the held value only changes when at least
    /// two deltas agree and outnumber the rest. Returns the previous
    /// direction when it changed.
    pub fn update(&mut self, history: &AngleHistory) -> Option<Rotation> {
        let deltas = history.angle_deltas();
        let positive = deltas.iter().filter(|d| **d > MIN_DELTA).count();
        let negative = deltas.iter().filter(|d| **d < -MIN_DELTA).count();

        let observed = if positive >= MIN_CONSISTENT_DELTAS && positive > negative {
            Rotation::CounterClockwise
        } else if negative >= MIN_CONSISTENT_DELTAS && negative > positive {
            Rotation::Clockwise
        } else {
            Rotation::Undetermined
        };

        if self.rotation.is_determined() && positive + negative > 0 {
            let agreeing = if self.rotation == Rotation::CounterClockwise {
                positive
            } else {
                negative
            };
            let agreement = agreeing as f64 / (positive + negative) as f64;
            self.confidence += CONFIDENCE_GAIN * (agreement - self.confidence);
        }

        if observed.is_determined() && observed != self.rotation {
            let previous = self.rotation;
            debug!(?previous, ?observed, "rotation direction changed");

            self.rotation = observed;
            self.confidence = 1.;
            return Some(previous);
        }

        None
    }

    pub fn reset(&mut self) {
        self.rotation = Rotation::Undetermined;
        self.confidence = 0.;
    }
}
