//! Short sample history feeding the direction estimate and the speed fit.

use nalgebra::Vector2;

use crate::ring_buffer::RingBuffer;

pub const HISTORY_CAPACITY: usize = 3;

/// Angular velocity increment between two consecutive history samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OmegaSample {
    /// Midpoint of the two sample times, seconds.
    pub time: f64,
    /// Signed, rad/s, counter-clockwise positive.
    pub omega: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AngleHistory {
    /// Unwrapped armor angles around the center, radians.
    angles: RingBuffer<f64, HISTORY_CAPACITY>,
    /// Armor center relative to the rotation center, pixels.
    offsets: RingBuffer<Vector2<f64>, HISTORY_CAPACITY>,
    times: RingBuffer<f64, HISTORY_CAPACITY>,
    omegas: RingBuffer<OmegaSample, HISTORY_CAPACITY>,
}

impl AngleHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sample and returns the velocity increment it produced.
    /// Samples at or before the newest recorded time are ignored.
    pub fn push(&mut self, time: f64, angle: f64, offset: Vector2<f64>) -> Option<OmegaSample> {
        let increment = match (self.times.back(), self.angles.back()) {
            (Some(&last_time), _) if time <= last_time => return None,
            (Some(&last_time), Some(&last_angle)) => Some(OmegaSample {
                time: (last_time + time) / 2.,
                omega: (angle - last_angle) / (time - last_time),
            }),
            _ => None,
        };

        self.angles.push(angle);
        self.offsets.push(offset);
        self.times.push(time);
        if let Some(sample) = increment {
            self.omegas.push(sample);
        }

        increment
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    pub fn angles(&self) -> &RingBuffer<f64, HISTORY_CAPACITY> {
        &self.angles
    }

    pub fn offsets(&self) -> &RingBuffer<Vector2<f64>, HISTORY_CAPACITY> {
        &self.offsets
    }

    pub fn times(&self) -> &RingBuffer<f64, HISTORY_CAPACITY> {
        &self.times
    }

    pub fn omegas(&self) -> &RingBuffer<OmegaSample, HISTORY_CAPACITY> {
        &self.omegas
    }

    /// Signed angle differences between consecutive samples, oldest first.
    pub fn angle_deltas(&self) -> Vec<f64> {
        let angles = self.angles.to_vec();
        angles.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }

    pub fn clear(&mut self) {
        self.angles.clear();
        self.offsets.clear();
        self.times.clear();
        self.omegas.clear();
    }
}
