use nalgebra::Point2;

use crate::{
    direction::Rotation,
    geometry::{point_at_polar, polar_angle, wrap_angle, RotatedBox},
    motion::SpeedModel,
};

/// Where the target armor will be once the projectile arrives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub point: Point2<f64>,
    /// Current armor box carried to the predicted position.
    pub rect: RotatedBox,
    /// Signed polar angle travelled during the lead time, radians.
    pub displacement: f64,
}

/// Lead-time angle travelled from `model_time` (seconds since the fit epoch)
/// in the held rotation direction.
pub fn lead_displacement(rotation: Rotation, model: &SpeedModel, model_time: f64, delay: f64) -> f64 {
    rotation.sign() * model.displacement(model_time, delay)
}

/// Advances the armor by the fitted motion over `delay` seconds.
///
/// `angle` is the filtered armor angle around `center`; the predicted point
/// lies on the armor's circle at that angle plus the lead displacement.
pub fn predict_target_point(
    center: Point2<f64>,
    armor: &RotatedBox,
    angle: f64,
    rotation: Rotation,
    model: &SpeedModel,
    model_time: f64,
    delay: f64,
) -> Prediction {
    let displacement = lead_displacement(rotation, model, model_time, delay);
    let radius = (armor.center - center).norm();
    let predicted_angle = angle + displacement;

    // The box is turned by the same amount its center travels, measured
    // from the raw armor angle so the two stay consistent.
    let turn = wrap_angle(predicted_angle - polar_angle(center, armor.center));

    Prediction {
        point: point_at_polar(center, radius, predicted_angle),
        rect: armor.rotated_about(center, turn),
        displacement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    fn armor_at(center: Point2<f64>, radius: f64, angle: f64) -> RotatedBox {
        RotatedBox::new(
            point_at_polar(center, radius, angle),
            46.5,
            25.8,
            90. - angle.to_degrees(),
        )
    }

    #[test]
    fn test_clockwise_constant_prediction() {
        let center = Point2::new(100., 100.);
        let armor = armor_at(center, 60., 0.);

        let prediction = predict_target_point(
            center,
            &armor,
            0.,
            Rotation::Clockwise,
            &SpeedModel::constant(1.0),
            4.2,
            0.3,
        );

        assert_abs_diff_eq!(prediction.displacement, -0.3, epsilon = 1e-12);

        let expected = point_at_polar(center, 60., -0.3);
        assert_abs_diff_eq!(prediction.point, expected, epsilon = 1e-9);
        assert_abs_diff_eq!(prediction.rect.center, expected, epsilon = 1e-9);
        assert_abs_diff_eq!(prediction.rect.angle, 90. + 0.3f64.to_degrees(), epsilon = 1e-9);
    }

    #[test]
    fn test_undetermined_direction_holds_position() {
        let center = Point2::new(0., 0.);
        let armor = armor_at(center, 50., 1.0);

        let prediction = predict_target_point(
            center,
            &armor,
            1.0,
            Rotation::Undetermined,
            &SpeedModel::constant(1.0),
            0.,
            0.3,
        );

        assert_eq!(prediction.displacement, 0.);
        assert_abs_diff_eq!(prediction.point, armor.center, epsilon = 1e-9);
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let center = Point2::new(320., 240.);
        let armor = armor_at(center, 70., 2.0);
        let model = SpeedModel {
            amplitude: 0.9,
            omega: 1.884,
            phase: 0.4,
            bias: 1.19,
        };

        let a = predict_target_point(center, &armor, 2.0, Rotation::CounterClockwise, &model, 3.1, 0.3);
        let b = predict_target_point(center, &armor, 2.0, Rotation::CounterClockwise, &model, 3.1, 0.3);

        assert_eq!(a, b);
        assert!(a.displacement > 0.);
        assert_abs_diff_eq!((a.point - center).norm(), 70., epsilon = 1e-9);
    }
}
