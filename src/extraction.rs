use anyhow::{Context, Result};
use nalgebra::Point2;
use opencv::{
    core::{self, Mat, Point, Rect as CvRect, Size, Vector},
    imgproc,
    prelude::*,
};

use crate::{
    camera::MatImage,
    config::{BinarizePass, EnemyColor, ExtractionParams, Threshold},
    geometry::RotatedBox,
    roi::Roi,
    traits::ContourExtractor,
    types::{CandidateSet, Frame, IntensityStats, ShapeCandidate},
};

/// Thresholds the enemy color channel of a BGR frame and reduces each
/// contour to a [`ShapeCandidate`], once per shape family.
pub struct EnergyContourExtractor {
    enemy_color: EnemyColor,
    params: ExtractionParams,
}

impl EnergyContourExtractor {
    pub fn new(enemy_color: EnemyColor, params: ExtractionParams) -> Self {
        EnergyContourExtractor {
            enemy_color,
            params,
        }
    }

    /// Enemy channel minus the opposing channel, so the other team's lights
    /// and white glare both drop out.
    fn separate_color(&self, image: &Mat) -> Result<Mat> {
        let mut channels = Vector::<Mat>::new();
        core::split(image, &mut channels)?;

        let (blue, red) = (channels.get(0)?, channels.get(2)?);
        let (minuend, subtrahend) = match self.enemy_color {
            EnemyColor::Red => (red, blue),
            EnemyColor::Blue => (blue, red),
        };

        let mut separated = Mat::default();
        core::subtract(&minuend, &subtrahend, &mut separated, &Mat::default(), -1)?;

        Ok(separated)
    }

    fn binarize(&self, gray: &Mat, pass: &BinarizePass) -> Result<Mat> {
        let mut binary = Mat::default();
        match pass.threshold {
            Threshold::Fixed { value } => {
                imgproc::threshold(gray, &mut binary, value, 255., imgproc::THRESH_BINARY)?;
            }
            Threshold::Adaptive { block_size, c } => {
                imgproc::adaptive_threshold(
                    gray,
                    &mut binary,
                    255.,
                    imgproc::ADAPTIVE_THRESH_MEAN_C,
                    imgproc::THRESH_BINARY,
                    block_size,
                    c,
                )?;
            }
        }

        if pass.dilate > 0 {
            let kernel = structuring_element(pass.dilate)?;
            let mut dilated = Mat::default();
            imgproc::dilate(
                &binary,
                &mut dilated,
                &kernel,
                Point::new(-1, -1),
                1,
                core::BORDER_CONSTANT,
                imgproc::morphology_default_border_value()?,
            )?;
            binary = dilated;
        }

        if pass.erode > 0 {
            let kernel = structuring_element(pass.erode)?;
            let mut eroded = Mat::default();
            imgproc::erode(
                &binary,
                &mut eroded,
                &kernel,
                Point::new(-1, -1),
                1,
                core::BORDER_CONSTANT,
                imgproc::morphology_default_border_value()?,
            )?;
            binary = eroded;
        }

        Ok(binary)
    }

    fn find_candidates(&self, binary: &Mat, mode: i32, with_intensity: bool) -> Result<Vec<ShapeCandidate>> {
        let mut contours = Vector::<Vector<Point>>::new();
        imgproc::find_contours(
            binary,
            &mut contours,
            mode,
            imgproc::CHAIN_APPROX_NONE,
            Point::new(0, 0),
        )?;

        let mut candidates = Vec::with_capacity(contours.len());
        for contour in contours.iter() {
            if contour.len() < 3 {
                continue;
            }

            let rect = imgproc::min_area_rect(&contour)?;
            let contour_area = imgproc::contour_area(&contour, false)?;

            let mut hull = Vector::<Point>::new();
            imgproc::convex_hull(&contour, &mut hull, false, true)?;
            let hull_area = imgproc::contour_area(&hull, false)?;

            let intensity = if with_intensity {
                let bounds = imgproc::bounding_rect(&contour)?;
                Some(rect_intensity(binary, bounds)?)
            } else {
                None
            };

            candidates.push(ShapeCandidate {
                rect: RotatedBox::new(
                    Point2::new(rect.center.x as f64, rect.center.y as f64),
                    rect.size.width as f64,
                    rect.size.height as f64,
                    rect.angle as f64,
                ),
                contour_area,
                hull_area,
                intensity,
            });
        }

        Ok(candidates)
    }
}

fn structuring_element(size: i32) -> Result<Mat> {
    let kernel = imgproc::get_structuring_element(
        imgproc::MORPH_RECT,
        Size::new(size, size),
        Point::new(-1, -1),
    )?;

    Ok(kernel)
}

/// Mean and standard deviation of the binarized pixels inside `bounds`.
fn rect_intensity(binary: &Mat, bounds: CvRect) -> Result<IntensityStats> {
    let crop = Mat::roi(binary, bounds)?.try_clone()?;

    let mut mean = Vector::<f64>::new();
    let mut std_dev = Vector::<f64>::new();
    core::mean_std_dev(&crop, &mut mean, &mut std_dev, &Mat::default())?;

    Ok(IntensityStats {
        mean: mean.get(0)?,
        std_dev: std_dev.get(0)?,
    })
}

impl ContourExtractor<MatImage> for EnergyContourExtractor {
    fn extract_from(&self, frame: &Frame<MatImage>, roi: &Roi) -> Result<CandidateSet> {
        let rect = roi.rect;
        let cropped = Mat::roi(
            frame.data.as_mat(),
            CvRect::new(rect.x, rect.y, rect.width, rect.height),
        )
        .context("ROI outside of frame")?
        .try_clone()?;

        let gray = self.separate_color(&cropped).context("Color separation failed")?;

        let armor_binary = self.binarize(&gray, &self.params.armor)?;
        let fan_binary = self.binarize(&gray, &self.params.flow_strip_fan)?;
        let center_binary = self.binarize(&gray, &self.params.center_r)?;

        Ok(CandidateSet {
            // Armors sit inside their blade's outline, so inner contours count.
            armors: self.find_candidates(&armor_binary, imgproc::RETR_CCOMP, false)?,
            flow_strip_fans: self.find_candidates(&fan_binary, imgproc::RETR_EXTERNAL, true)?,
            center_rs: self.find_candidates(&center_binary, imgproc::RETR_EXTERNAL, false)?,
        })
    }
}
