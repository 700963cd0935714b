use nalgebra::{Matrix3, Point2};

use crate::{
    config::{CameraCalibration, PlateSize},
    traits::AngleSolver,
    types::SolvedAngles,
};

/// Distance from apparent plate width and angles from the plate center's
/// bearing, using only the intrinsic matrix.
#[derive(Debug, Clone)]
pub struct PinholeAngleSolver {
    intrinsics: Matrix3<f64>,
}

impl PinholeAngleSolver {
    pub fn new(calibration: &CameraCalibration) -> Self {
        let i = calibration.intrinsic_matrix.view();

        let intrinsics = Matrix3::new(
            i[[0, 0]], i[[0, 1]], i[[0, 2]],
            i[[1, 0]], i[[1, 1]], i[[1, 2]],
            i[[2, 0]], i[[2, 1]], i[[2, 2]],
        );

        PinholeAngleSolver { intrinsics }
    }

    fn focal(&self) -> (f64, f64) {
        (self.intrinsics[(0, 0)], self.intrinsics[(1, 1)])
    }

    fn principal_point(&self) -> (f64, f64) {
        (self.intrinsics[(0, 2)], self.intrinsics[(1, 2)])
    }
}

impl AngleSolver for PinholeAngleSolver {
    fn solve(&self, corners: &[Point2<f64>; 4], plate: &PlateSize) -> Option<SolvedAngles> {
        let (fx, fy) = self.focal();
        let (cx, cy) = self.principal_point();

        let top = (corners[1] - corners[0]).norm();
        let bottom = (corners[2] - corners[3]).norm();
        let apparent_width = (top + bottom) / 2.;
        if apparent_width <= f64::EPSILON || fx <= 0. || fy <= 0. {
            return None;
        }

        let center = corners
            .iter()
            .fold(Point2::origin(), |sum: Point2<f64>, corner| sum + corner.coords / 4.);

        Some(SolvedAngles {
            distance: fx * plate.width / apparent_width,
            yaw: ((center.x - cx) / fx).atan().to_degrees(),
            pitch: (-(center.y - cy) / fy).atan().to_degrees(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use ndarray::arr2;

    use crate::geometry::RotatedBox;

    fn solver() -> PinholeAngleSolver {
        PinholeAngleSolver::new(&CameraCalibration {
            intrinsic_matrix: arr2(&[[1000., 0., 320.], [0., 1000., 240.], [0., 0., 1.]]),
            ..CameraCalibration::default()
        })
    }

    #[test]
    fn test_centered_plate() {
        let plate = PlateSize::default();
        let rect = RotatedBox::new(Point2::new(320., 240.), 45., 11., 0.);

        let solved = solver().solve(&rect.corners(), &plate).unwrap();

        assert_abs_diff_eq!(solved.distance, 5., epsilon = 1e-9);
        assert_abs_diff_eq!(solved.yaw, 0., epsilon = 1e-9);
        assert_abs_diff_eq!(solved.pitch, 0., epsilon = 1e-9);
    }

    #[test]
    fn test_offset_plate_angles() {
        let plate = PlateSize::default();
        // Right of and above the principal point; rotation must not matter.
        let rect = RotatedBox::new(Point2::new(1320., -760.), 45., 11., 30.);

        let solved = solver().solve(&rect.corners(), &plate).unwrap();

        assert_abs_diff_eq!(solved.yaw, 45., epsilon = 1e-9);
        assert_abs_diff_eq!(solved.pitch, 45., epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_plate() {
        let corners = [Point2::new(5., 5.); 4];

        assert!(solver().solve(&corners, &PlateSize::default()).is_none());
    }
}
