use anyhow::Result;
use nalgebra::Point2;
use opencv::{
    calib3d::{solve_pnp, SOLVEPNP_IPPE},
    core::{Mat, Point2f, Point3f, Vector},
    prelude::*,
};
use tracing::debug;

use crate::{
    config::{CameraCalibration, PlateSize},
    traits::AngleSolver,
    types::SolvedAngles,
};

pub struct PnPResult {
    pub rvec_mat: Mat,
    pub tvec_mat: Mat,
}

/// Full pose solve of the armor plate against the calibrated camera.
pub struct PnpAngleSolver {
    intrinsic_matrix: Mat,
    distortion_coeffs: Mat,
}

impl PnpAngleSolver {
    pub fn new(calibration: &CameraCalibration) -> Result<Self> {
        let i = calibration.intrinsic_matrix.view();
        let d = calibration.distortion_coeffs.to_vec();

        let intrinsic_matrix = Mat::from_slice_2d(&[
            [i[[0, 0]], i[[0, 1]], i[[0, 2]]],
            [i[[1, 0]], i[[1, 1]], i[[1, 2]]],
            [i[[2, 0]], i[[2, 1]], i[[2, 2]]],
        ])?;
        let distortion_coeffs = Mat::from_slice(d.as_slice())?.try_clone()?;

        Ok(PnpAngleSolver {
            intrinsic_matrix,
            distortion_coeffs,
        })
    }

    /// Plate corners in the plate frame, matching the image corner order.
    fn object_points(plate: &PlateSize) -> Vector<Point3f> {
        let (hw, hh) = ((plate.width / 2.) as f32, (plate.height / 2.) as f32);

        Vector::from_iter([
            Point3f::new(-hw, -hh, 0.),
            Point3f::new(hw, -hh, 0.),
            Point3f::new(hw, hh, 0.),
            Point3f::new(-hw, hh, 0.),
        ])
    }

    pub fn solve_pnp(&self, corners: &[Point2<f64>; 4], plate: &PlateSize) -> Result<PnPResult> {
        let img_points = Vector::<Point2f>::from_iter(
            corners
                .iter()
                .map(|corner| Point2f::new(corner.x as f32, corner.y as f32)),
        );

        let mut rvec_mat = Mat::default();
        let mut tvec_mat = Mat::default();

        solve_pnp(
            &Self::object_points(plate),
            &img_points,
            &self.intrinsic_matrix,
            &self.distortion_coeffs,
            &mut rvec_mat,
            &mut tvec_mat,
            false,
            SOLVEPNP_IPPE,
        )?;

        Ok(PnPResult { rvec_mat, tvec_mat })
    }
}

impl AngleSolver for PnpAngleSolver {
    fn solve(&self, corners: &[Point2<f64>; 4], plate: &PlateSize) -> Option<SolvedAngles> {
        let pnp_result = match self.solve_pnp(corners, plate) {
            Ok(result) => result,
            Err(error) => {
                debug!("solvePnP failed: {:#}", error);
                return None;
            }
        };

        let tvec = &pnp_result.tvec_mat;
        let (x, y, z) = (
            *tvec.at::<f64>(0).ok()?,
            *tvec.at::<f64>(1).ok()?,
            *tvec.at::<f64>(2).ok()?,
        );
        if z <= 0. {
            return None;
        }

        Some(SolvedAngles {
            distance: (x * x + y * y + z * z).sqrt(),
            yaw: x.atan2(z).to_degrees(),
            pitch: (-y).atan2(x.hypot(z)).to_degrees(),
        })
    }
}
