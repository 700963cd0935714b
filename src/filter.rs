use nalgebra::{Matrix2, RowVector2, Vector2};

use crate::config::FilterParams;

/// Model-driven motion over one prediction step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelStep {
    /// Signed angle travelled since the last update, radians.
    pub displacement: f64,
    /// Signed angular speed at the new time, rad/s.
    pub speed: f64,
}

/// Kalman filter over `[angle, angular speed]` of the target armor.
#[derive(Debug, Clone)]
pub struct AngleFilter {
    state: Vector2<f64>,
    covariance: Matrix2<f64>,
    q: Matrix2<f64>,
    r: f64,
    pub last_update_time: f64,
}

impl AngleFilter {
    pub fn new(params: &FilterParams, time: f64, angle: f64) -> Self {
        let q = Matrix2::from_diagonal(&Vector2::new(params.process_angle, params.process_speed));
        let r = params.angle_noise.powi(2);

        let covariance = Matrix2::from_diagonal(&Vector2::new(r, params.initial_speed_var));

        AngleFilter {
            state: Vector2::new(angle, 0.),
            covariance,
            q,
            r,
            last_update_time: time,
        }
    }

    /// Propagates to `time`. With a fitted model the mean follows the model;
    /// otherwise it coasts at the estimated speed.
    pub fn predict(&mut self, time: f64, step: Option<ModelStep>) {
        let delta_t = (time - self.last_update_time).max(0.);
        let transition = Matrix2::new(1., delta_t, 0., 1.);

        self.state = match step {
            Some(step) => Vector2::new(self.state[0] + step.displacement, step.speed),
            None => transition * self.state,
        };
        self.covariance = transition * self.covariance * transition.transpose() + self.q * delta_t;

        self.last_update_time = time;
    }

    pub fn correct(&mut self, measured_angle: f64) {
        let h = RowVector2::new(1., 0.);

        let innovation = measured_angle - self.state[0];
        let innovation_var = (h * self.covariance * h.transpose())[0] + self.r;
        let gain = self.covariance * h.transpose() / innovation_var;

        self.state += gain * innovation;
        self.covariance = (Matrix2::identity() - gain * h) * self.covariance;
    }

    pub fn angle(&self) -> f64 {
        self.state[0]
    }

    pub fn angle_std(&self) -> f64 {
        self.covariance[(0, 0)].max(0.).sqrt()
    }

    pub fn is_expired(&self, time: f64, expiration: f64) -> bool {
        time - self.last_update_time > expiration
    }
}
