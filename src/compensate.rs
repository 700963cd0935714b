//! Turns a predicted armor box into the final aim command.

use tracing::{debug, trace};

use crate::{config::ShootParams, geometry::RotatedBox, traits::AngleSolver};

/// Compensated aim for one predicted box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimSolution {
    pub distance: f64,
    /// Degrees, mounting offset included.
    pub yaw: f64,
    /// Degrees, drop compensated, mounting offset included.
    pub pitch: f64,
    pub flight_time: f64,
}

#[derive(Debug, Clone)]
pub struct ShootingCompensator {
    params: ShootParams,
}

impl ShootingCompensator {
    pub fn new(params: ShootParams) -> Self {
        ShootingCompensator { params }
    }

    /// Solves the box's viewing angles and corrects pitch for drop.
    /// Returns `None` when the solver cannot place the plate.
    pub fn compensate<S: AngleSolver>(&self, solver: &S, rect: &RotatedBox) -> Option<AimSolution> {
        let corners = rect.normalized().corners();
        let solved = solver.solve(&corners, &self.params.plate)?;

        let (pitch, flight_time) = self.drop_compensated_pitch(solved.distance, solved.pitch.to_radians())?;

        Some(AimSolution {
            distance: solved.distance,
            yaw: solved.yaw + self.params.yaw_offset,
            pitch: pitch.to_degrees() + self.params.pitch_offset,
            flight_time,
        })
    }

    /// Iteratively raises the aim until the ballistic trajectory passes
    /// through the target. Returns the launch pitch (radians) and the flight
    /// time, or `None` for an unreachable geometry.
    pub fn drop_compensated_pitch(&self, distance: f64, pitch: f64) -> Option<(f64, f64)> {
        let horizontal = distance * pitch.cos();
        let height = distance * pitch.sin();
        if !(horizontal > 0.) || !height.is_finite() {
            debug!(distance, pitch, "target geometry not reachable");
            return None;
        }

        let speed = self.params.bullet_speed;
        let gravity = self.params.gravity;

        let mut aim_height = height;
        let mut aim = pitch;
        let mut flight_time = horizontal / (speed * aim.cos());

        for iteration in 0..self.params.max_iterations {
            aim = aim_height.atan2(horizontal);
            flight_time = horizontal / (speed * aim.cos());

            let hit_height = speed * aim.sin() * flight_time - gravity * flight_time.powi(2) / 2.;
            let error = height - hit_height;
            trace!(iteration, error, "drop solve");

            if error.abs() < self.params.tolerance {
                break;
            }
            aim_height += error;
        }

        if aim.is_finite() && flight_time.is_finite() {
            Some((aim, flight_time))
        } else {
            None
        }
    }
}
