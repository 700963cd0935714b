use anyhow::{Context, Result};

use crate::{
    energy::{EnergyDetector, SnapshotHandle},
    traits::{AngleSolver, Camera as CameraTrait, ContourExtractor, ImageData},
    types::ArmorPlate,
};

pub struct VisionPipeline<Camera: CameraTrait, Extractor, Solver> {
    camera: Camera,
    detector: EnergyDetector<Extractor, Solver>,
    plate: ArmorPlate,
}

impl<I, Camera, Extractor, Solver> VisionPipeline<Camera, Extractor, Solver>
where
    I: ImageData,
    Camera: CameraTrait<ImageStorage = I>,
    Extractor: ContourExtractor<I>,
    Solver: AngleSolver,
{
    pub fn new(camera: Camera, detector: EnergyDetector<Extractor, Solver>) -> Self {
        VisionPipeline {
            camera,
            detector,
            plate: ArmorPlate::default(),
        }
    }

    pub fn detector(&self) -> &EnergyDetector<Extractor, Solver> {
        &self.detector
    }

    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.detector.snapshot_handle()
    }

    /// Grabs one frame and runs it through the detector. `None` means no
    /// usable prediction this frame.
    pub fn run(&mut self) -> Result<Option<ArmorPlate>> {
        let frame = self
            .camera
            .grab_frame()
            .context("Failed to read frame from camera")?;

        if self.detector.run(&frame, &mut self.plate) {
            Ok(Some(self.plate.clone()))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::{Duration, Instant};

    use anyhow::bail;
    use nalgebra::Point2;

    use crate::{
        config::{EnergyParams, MotionParams},
        direction::Rotation,
        motion::SpeedModel,
        solver::PinholeAngleSolver,
        synthetic::{SceneImage, SyntheticExtractor, SyntheticScene},
        types::Frame,
    };

    struct SceneCamera {
        scene: SyntheticScene,
        start: Instant,
        frames: u32,
        limit: u32,
    }

    impl CameraTrait for SceneCamera {
        type ImageStorage = SceneImage;

        fn grab_frame(&mut self) -> Result<Frame<SceneImage>> {
            if self.frames == self.limit {
                bail!("end of recording");
            }

            let t = self.frames as f64 * 0.1;
            self.frames += 1;
            Ok(self.scene.render(self.start + Duration::from_secs_f64(t), t))
        }
    }

    #[test]
    fn test_pipeline_predicts_then_reports_camera_failure() {
        let params = EnergyParams {
            motion: MotionParams::constant(1.0),
            ..EnergyParams::default()
        };
        let solver = PinholeAngleSolver::new(&params.camera);
        let detector = EnergyDetector::new(params, SyntheticExtractor, solver).unwrap();

        let camera = SceneCamera {
            scene: SyntheticScene::new(
                Point2::new(320., 240.),
                60.,
                Rotation::Clockwise,
                SpeedModel::constant(1.0),
            ),
            start: Instant::now(),
            frames: 0,
            limit: 5,
        };
        let mut pipeline = VisionPipeline::new(camera, detector);

        let results = (0..5)
            .map(|_| pipeline.run().unwrap())
            .collect::<Vec<_>>();
        assert!(results[..2].iter().all(Option::is_none));
        assert!(results[4].is_some());

        let error = pipeline.run().unwrap_err();
        assert!(format!("{:#}", error).contains("end of recording"));
    }
}
