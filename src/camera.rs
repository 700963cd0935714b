use std::time::Instant;

use anyhow::{bail, Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture},
};

use crate::{
    geometry::FrameSize,
    traits::{Camera, ImageData},
    types::Frame,
};

/// BGR frame as delivered by OpenCV.
pub struct MatImage {
    mat: Mat,
}

impl MatImage {
    pub fn new(mat: Mat) -> Self {
        MatImage { mat }
    }

    pub fn as_mat(&self) -> &Mat {
        &self.mat
    }
}

impl ImageData for MatImage {
    fn size(&self) -> FrameSize {
        FrameSize::new(self.mat.cols(), self.mat.rows())
    }
}

pub struct OpenCvCamera {
    capture: VideoCapture,
}

impl OpenCvCamera {
    pub fn new(index: i32) -> Result<Self> {
        let capture = VideoCapture::new(index, videoio::CAP_ANY)
            .with_context(|| format!("Failed to open camera {}", index))?;

        if !capture.is_opened()? {
            bail!("Camera {} is not available", index);
        }

        Ok(OpenCvCamera { capture })
    }
}

impl Camera for OpenCvCamera {
    type ImageStorage = MatImage;

    fn grab_frame(&mut self) -> Result<Frame<MatImage>> {
        let mut mat = Mat::default();
        let grabbed = self.capture.read(&mut mat)?;
        let timestamp = Instant::now();

        if !grabbed || mat.empty() {
            bail!("Camera returned an empty frame");
        }

        Ok(Frame::new(timestamp, MatImage::new(mat)))
    }
}
