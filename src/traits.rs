//! Seams between the detection core and its external collaborators.

use anyhow::Result;
use nalgebra::Point2;

use crate::{
    config::PlateSize,
    geometry::FrameSize,
    roi::Roi,
    types::{CandidateSet, Frame, SolvedAngles},
};

pub trait ImageData {
    fn size(&self) -> FrameSize;
}

pub trait Camera {
    type ImageStorage: ImageData;

    fn grab_frame(&mut self) -> Result<Frame<Self::ImageStorage>>;
}

pub trait ContourExtractor<I: ImageData> {
    /// Extracts candidates inside `roi`, in ROI-local coordinates.
    fn extract_from(&self, frame: &Frame<I>, roi: &Roi) -> Result<CandidateSet>;
}

/// Converts a plate's image corners into distance and viewing angles.
pub trait AngleSolver {
    /// `corners` are ordered top-left, top-right, bottom-right, bottom-left
    /// with the plate's width along the first edge.
    fn solve(&self, corners: &[Point2<f64>; 4], plate: &PlateSize) -> Option<SolvedAngles>;
}
