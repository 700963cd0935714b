//! Angular speed model of the energy mechanism and its online fit.
//!
//! The blade speed follows `spd(t) = A·sin(ω·t + φ) + b` with ω known. With
//! `p = A·cos φ` and `q = A·sin φ` the model is linear in `(p, q, b)`:
//!
//! ```text
//! spd(t) = p·sin(ω·t) + q·cos(ω·t) + b
//! ```
//!
//! so every speed sample is folded in with one recursive least-squares step.

use nalgebra::{Matrix3, Vector3};
use tracing::trace;

use crate::config::MotionParams;

const RESIDUAL_GAIN: f64 = 0.2;

/// Fitted `spd(t) = A·sin(ω·t + φ) + b`, `t` in seconds since the fit epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedModel {
    pub amplitude: f64,
    pub omega: f64,
    pub phase: f64,
    pub bias: f64,
}

impl SpeedModel {
    pub fn constant(speed: f64) -> Self {
        SpeedModel {
            amplitude: 0.,
            omega: 0.,
            phase: 0.,
            bias: speed,
        }
    }

    /// Instantaneous angular speed, rad/s.
    pub fn spd_func(&self, t: f64) -> f64 {
        self.amplitude * (self.omega * t + self.phase).sin() + self.bias
    }

    /// Angle travelled between 0 and `t`:
    /// `−A/ω·cos(ω·t + φ) + A/ω·cos φ + b·t`.
    pub fn theta_func(&self, t: f64) -> f64 {
        if self.omega.abs() < f64::EPSILON {
            return (self.amplitude * self.phase.sin() + self.bias) * t;
        }

        let scale = self.amplitude / self.omega;
        -scale * (self.omega * t + self.phase).cos() + scale * self.phase.cos() + self.bias * t
    }

    /// Angle travelled during `duration` starting at `start`.
    pub fn displacement(&self, start: f64, duration: f64) -> f64 {
        self.theta_func(start + duration) - self.theta_func(start)
    }
}

/// Recursive least-squares fit of [`SpeedModel`] on speed magnitudes.
#[derive(Debug, Clone)]
pub struct SpeedFitter {
    params: MotionParams,
    /// `(p, q, b)`.
    estimate: Vector3<f64>,
    covariance: Matrix3<f64>,
    epoch: Option<f64>,
    samples: usize,
    residual_ms: f64,
}

impl SpeedFitter {
    pub fn new(params: MotionParams) -> Self {
        let mut fitter = SpeedFitter {
            params,
            estimate: Vector3::zeros(),
            covariance: Matrix3::zeros(),
            epoch: None,
            samples: 0,
            residual_ms: 0.,
        };
        fitter.reset();
        fitter
    }

    /// Back to the prior: nominal amplitude at zero phase, mid-range bias.
    pub fn reset(&mut self) {
        let amplitude = &self.params.amplitude;
        let bias = &self.params.bias;

        let nominal_amplitude = (amplitude.start + amplitude.end) / 2.;
        let nominal_bias = (bias.start + bias.end) / 2.;

        // The phase is unknown, so p and q may take any value up to the
        // largest amplitude. A zero-width amplitude range pins them to 0.
        let pq_var = amplitude.end.powi(2);
        let bias_var = ((bias.end - bias.start) / 2.).powi(2) + 0.25;

        self.estimate = Vector3::new(nominal_amplitude, 0., nominal_bias);
        self.covariance = Matrix3::from_diagonal(&Vector3::new(pq_var, pq_var, bias_var));
        self.epoch = None;
        self.samples = 0;
        self.residual_ms = 0.;
    }

    pub fn epoch(&self) -> Option<f64> {
        self.epoch
    }

    pub fn is_ready(&self) -> bool {
        self.samples > 0
    }

    fn regressor(&self, t: f64) -> Vector3<f64> {
        let phase = self.params.omega * t;
        Vector3::new(phase.sin(), phase.cos(), 1.)
    }

    /// Folds in one speed magnitude observed at absolute time `time`.
    /// Returns false when the sample is implausible and was dropped.
    pub fn add_sample(&mut self, time: f64, speed: f64) -> bool {
        if !speed.is_finite() || speed.abs() > self.params.max_speed {
            trace!(speed, "dropping implausible speed sample");
            return false;
        }

        let epoch = *self.epoch.get_or_insert(time);
        let h = self.regressor(time - epoch);
        let lambda = self.params.forgetting;

        let ph = self.covariance * h;
        let innovation_var = lambda * self.params.sample_noise + h.dot(&ph);
        let gain = ph / innovation_var;
        let residual = speed - h.dot(&self.estimate);

        self.estimate += gain * residual;
        self.covariance = (self.covariance - gain * ph.transpose()) / lambda;
        self.samples += 1;
        self.residual_ms += RESIDUAL_GAIN * (residual * residual - self.residual_ms);

        true
    }

    /// Current fit, clamped to the configured physical ranges.
    pub fn model(&self) -> SpeedModel {
        let (p, q, b) = (self.estimate[0], self.estimate[1], self.estimate[2]);
        let amplitude = &self.params.amplitude;
        let bias = &self.params.bias;

        SpeedModel {
            amplitude: p.hypot(q).clamp(amplitude.start, amplitude.end),
            omega: self.params.omega,
            phase: q.atan2(p),
            bias: b.clamp(bias.start, bias.end),
        }
    }

    /// Diagnostic in `(0, 1]`, 1 meaning the recent samples fit perfectly.
    pub fn angle_confidence(&self) -> f64 {
        1. / (1. + self.residual_ms.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    fn big_buff() -> SpeedModel {
        SpeedModel {
            amplitude: 0.9,
            omega: 1.884,
            phase: 0.7,
            bias: 1.19,
        }
    }

    #[test]
    fn test_theta_is_zero_at_origin() {
        for model in [big_buff(), SpeedModel::constant(1.0)] {
            assert_abs_diff_eq!(model.theta_func(0.), 0., epsilon = 1e-12);
        }
    }

    #[test]
    fn test_theta_matches_numerical_integral() {
        let model = big_buff();
        let steps = 10_000;

        for &t in &[0.1, 0.5, 1.7, 3.3, 10.0] {
            // Simpson's rule over [0, t].
            let h = t / steps as f64;
            let mut sum = model.spd_func(0.) + model.spd_func(t);
            for i in 1..steps {
                let weight = if i % 2 == 1 { 4. } else { 2. };
                sum += weight * model.spd_func(i as f64 * h);
            }
            let numerical = sum * h / 3.;

            assert_abs_diff_eq!(model.theta_func(t), numerical, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_displacement_of_constant_model() {
        let model = SpeedModel::constant(1.0);

        assert_abs_diff_eq!(model.displacement(12.3, 0.3), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_converges_to_sinusoid() {
        let truth = big_buff();
        let mut fitter = SpeedFitter::new(MotionParams::default());

        let dt = 1. / 30.;
        for i in 0..300 {
            let t = 5. + i as f64 * dt;
            assert!(fitter.add_sample(t, truth.spd_func(t - 5.)));
        }

        let model = fitter.model();
        assert_abs_diff_eq!(model.amplitude, truth.amplitude, epsilon = 1e-3);
        assert_abs_diff_eq!(model.bias, truth.bias, epsilon = 1e-3);
        assert_abs_diff_eq!(model.phase, truth.phase, epsilon = 1e-3);
        assert_eq!(fitter.epoch(), Some(5.));
        assert!(fitter.angle_confidence() > 0.99);
    }

    #[test]
    fn test_constant_range_fits_bias_only() {
        let mut fitter = SpeedFitter::new(MotionParams::constant(1.0));

        fitter.add_sample(0.0, 1.2);
        fitter.add_sample(0.1, 1.2);

        let model = fitter.model();
        assert_eq!(model.amplitude, 0.);
        assert_abs_diff_eq!(model.bias, 1.2, epsilon = 1e-3);
    }

    #[test]
    fn test_outlier_sample_dropped() {
        let mut fitter = SpeedFitter::new(MotionParams::default());

        assert!(!fitter.add_sample(0.0, 40.0));
        assert!(!fitter.add_sample(0.0, f64::NAN));
        assert!(!fitter.is_ready());
        assert_eq!(fitter.epoch(), None);
    }

    #[test]
    fn test_reset_discards_fit() {
        let mut fitter = SpeedFitter::new(MotionParams::default());
        fitter.add_sample(0.0, 1.5);
        fitter.reset();

        assert!(!fitter.is_ready());
        assert_eq!(fitter.samples, 0);
        assert_eq!(fitter.epoch(), None);
    }
}
