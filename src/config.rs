//! Static parameter set, loaded once from `config.json` and treated as
//! immutable afterwards.

use std::{fs, ops::Range, path::Path};

use ndarray::{arr1, arr2, Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyColor {
    Red,
    Blue,
}

impl Default for EnemyColor {
    fn default() -> Self {
        EnemyColor::Red
    }
}

/// Camera intrinsics, fixed at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraCalibration {
    pub intrinsic_matrix: Array2<f64>,
    pub distortion_coeffs: Array1<f64>,
}

impl Default for CameraCalibration {
    fn default() -> Self {
        CameraCalibration {
            intrinsic_matrix: arr2(&[
                [1200.9, 0., 134.8634],
                [0., 1196.2, 366.1528],
                [0., 0., 1.],
            ]),
            distortion_coeffs: arr1(&[-0.3524, 0.2160, 0., 0., 0.]),
        }
    }
}

/// How a binarization pass separates lit pixels from the background.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Threshold {
    /// Global gray level.
    Fixed { value: f64 },
    /// Local mean over a `block_size` square neighbourhood, minus `c`.
    Adaptive { block_size: i32, c: f64 },
}

impl Threshold {
    fn check(&self, field: &'static str) -> Result<(), ConfigError> {
        match *self {
            Threshold::Fixed { value } if !(0. ..=255.).contains(&value) => {
                Err(invalid(field, format!("fixed threshold {} is outside 0..=255", value)))
            }
            Threshold::Adaptive { block_size, .. } if block_size < 3 || block_size % 2 == 0 => Err(
                invalid(field, format!("block size {} must be odd and at least 3", block_size)),
            ),
            _ => Ok(()),
        }
    }
}

/// Threshold and morphology for one binarization pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarizePass {
    pub threshold: Threshold,
    /// Square kernel size, 0 disables the step.
    pub dilate: i32,
    pub erode: i32,
}

impl Default for BinarizePass {
    fn default() -> Self {
        BinarizePass {
            threshold: Threshold::Fixed { value: 80. },
            dilate: 3,
            erode: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionParams {
    pub armor: BinarizePass,
    pub flow_strip_fan: BinarizePass,
    pub center_r: BinarizePass,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        ExtractionParams {
            armor: BinarizePass {
                threshold: Threshold::Fixed { value: 80. },
                dilate: 3,
                erode: 1,
            },
            flow_strip_fan: BinarizePass {
                threshold: Threshold::Adaptive {
                    block_size: 31,
                    c: -10.,
                },
                dilate: 5,
                erode: 3,
            },
            center_r: BinarizePass {
                threshold: Threshold::Fixed { value: 100. },
                dilate: 0,
                erode: 0,
            },
        }
    }
}

/// Accept ranges plus the ideal template used to rank accepted candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeTolerance {
    pub area: Range<f64>,
    /// Long side over short side.
    pub aspect_ratio: Range<f64>,
    /// Contour area over rotated box area.
    pub min_fill: f64,
    /// Contour area over convex hull area.
    pub min_solidity: f64,
    pub ideal_area: f64,
    pub ideal_aspect_ratio: f64,
}

impl Default for ShapeTolerance {
    fn default() -> Self {
        ShapeTolerance {
            area: 400.0..3000.0,
            aspect_ratio: 1.2..2.6,
            min_fill: 0.6,
            min_solidity: 0.7,
            ideal_area: 1200.,
            ideal_aspect_ratio: 1.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmorParams {
    pub shape: ShapeTolerance,
    /// Largest center jump, in pixels, accepted against the prior target
    /// armor when no flow strip fan was found.
    pub max_prior_jump: f64,
    /// Largest deviation, in degrees, of the armor's long side from
    /// perpendicular to the active fan's long side.
    pub max_tilt: f64,
}

impl Default for ArmorParams {
    fn default() -> Self {
        ArmorParams {
            shape: ShapeTolerance::default(),
            max_prior_jump: 20.,
            max_tilt: 15.,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowStripParams {
    pub shape: ShapeTolerance,
    pub min_intensity_mean: f64,
    pub min_intensity_std: f64,
    /// Largest deviation, in degrees, of the fan's long side from the radial
    /// through the last known rotation center.
    pub max_tilt: f64,
}

impl Default for FlowStripParams {
    fn default() -> Self {
        FlowStripParams {
            shape: ShapeTolerance {
                area: 1500.0..12000.0,
                aspect_ratio: 1.6..3.6,
                min_fill: 0.3,
                min_solidity: 0.4,
                ideal_area: 5000.,
                ideal_aspect_ratio: 2.4,
            },
            min_intensity_mean: 40.,
            min_intensity_std: 30.,
            max_tilt: 15.,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenterRParams {
    pub shape: ShapeTolerance,
    /// Score penalty per rotation radius of distance from the expected center.
    pub distance_weight: f64,
    /// Armor-to-center distance over armor-to-fan-center distance.
    pub center_distance_ratio: f64,
}

impl Default for CenterRParams {
    fn default() -> Self {
        CenterRParams {
            shape: ShapeTolerance {
                area: 40.0..600.0,
                aspect_ratio: 1.0..1.5,
                min_fill: 0.5,
                min_solidity: 0.6,
                ideal_area: 150.,
                ideal_aspect_ratio: 1.0,
            },
            distance_weight: 4.,
            center_distance_ratio: 2.,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiParams {
    /// Tracking half size in rotation radii.
    pub margin: f64,
    pub min_half_size: f64,
    /// Fractional half-size growth per consecutive miss.
    pub growth_step: f64,
    pub miss_threshold: u32,
}

impl Default for RoiParams {
    fn default() -> Self {
        RoiParams {
            margin: 2.,
            min_half_size: 80.,
            growth_step: 0.5,
            miss_threshold: 10,
        }
    }
}

/// Physical limits of `spd(t) = A·sin(ω·t + φ) + b`, in rad/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionParams {
    pub omega: f64,
    pub amplitude: Range<f64>,
    pub bias: Range<f64>,
    /// Recursive least-squares forgetting factor in `(0, 1]`.
    pub forgetting: f64,
    /// Variance of a single speed sample.
    pub sample_noise: f64,
    pub max_speed: f64,
    /// Angle jump, in radians, that marks a newly activated blade.
    pub blade_switch_threshold: f64,
}

impl Default for MotionParams {
    fn default() -> Self {
        MotionParams {
            omega: 1.884,
            amplitude: 0.780..1.045,
            bias: 1.045..1.310,
            forgetting: 0.99,
            sample_noise: 1e-3,
            max_speed: 3.,
            blade_switch_threshold: 0.6,
        }
    }
}

impl MotionParams {
    /// Constant-speed mechanism (the small energy mechanism). `speed` is a
    /// magnitude; the rotation direction is estimated separately.
    pub fn constant(speed: f64) -> Self {
        let speed = speed.abs();
        MotionParams {
            amplitude: 0.0..0.0,
            bias: (speed - 0.5).max(0.)..(speed + 0.5),
            ..MotionParams::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Standard deviation of a measured armor angle, in radians.
    pub angle_noise: f64,
    pub process_angle: f64,
    pub process_speed: f64,
    pub initial_speed_var: f64,
    /// Seconds without a correction after which the filter restarts.
    pub expiration: f64,
    /// Predictions are withheld while the angle estimate is less certain.
    pub max_angle_std: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            angle_noise: 0.01,
            process_angle: 1e-3,
            process_speed: 1.,
            initial_speed_var: 10.,
            expiration: 0.5,
            max_angle_std: 0.2,
        }
    }
}

/// Physical plate size, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateSize {
    pub width: f64,
    pub height: f64,
}

impl Default for PlateSize {
    fn default() -> Self {
        PlateSize {
            width: 0.225,
            height: 0.055,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShootParams {
    /// Lead time used for prediction, in seconds.
    pub flight_delay: f64,
    pub bullet_speed: f64,
    pub gravity: f64,
    pub max_iterations: usize,
    /// Height error, in meters, at which the drop solve stops early.
    pub tolerance: f64,
    /// Mounting offsets added to the compensated angles, in degrees.
    pub yaw_offset: f64,
    pub pitch_offset: f64,
    pub plate: PlateSize,
}

impl Default for ShootParams {
    fn default() -> Self {
        ShootParams {
            flight_delay: 0.3,
            bullet_speed: 28.,
            gravity: 9.78,
            max_iterations: 10,
            tolerance: 1e-3,
            yaw_offset: 0.,
            pitch_offset: 0.,
            plate: PlateSize::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyParams {
    pub enemy_color: EnemyColor,
    pub camera: CameraCalibration,
    pub extraction: ExtractionParams,
    pub armor: ArmorParams,
    pub flow_strip_fan: FlowStripParams,
    pub center_r: CenterRParams,
    pub roi: RoiParams,
    pub motion: MotionParams,
    pub filter: FilterParams,
    pub shoot: ShootParams,
}

impl EnergyParams {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let params: EnergyParams = serde_json::from_str(contents)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("armor.shape.area", &self.armor.shape.area)?;
        check_range("armor.shape.aspect_ratio", &self.armor.shape.aspect_ratio)?;
        check_range("flow_strip_fan.shape.area", &self.flow_strip_fan.shape.area)?;
        check_range(
            "flow_strip_fan.shape.aspect_ratio",
            &self.flow_strip_fan.shape.aspect_ratio,
        )?;
        check_range("center_r.shape.area", &self.center_r.shape.area)?;
        check_range("center_r.shape.aspect_ratio", &self.center_r.shape.aspect_ratio)?;
        check_range("motion.amplitude", &self.motion.amplitude)?;
        check_range("motion.bias", &self.motion.bias)?;
        check_tilt("armor.max_tilt", self.armor.max_tilt)?;
        check_tilt("flow_strip_fan.max_tilt", self.flow_strip_fan.max_tilt)?;
        self.extraction.armor.threshold.check("extraction.armor.threshold")?;
        self.extraction.flow_strip_fan.threshold.check("extraction.flow_strip_fan.threshold")?;
        self.extraction.center_r.threshold.check("extraction.center_r.threshold")?;

        let intrinsics = self.camera.intrinsic_matrix.dim();
        if intrinsics != (3, 3) {
            return Err(invalid(
                "camera.intrinsic_matrix",
                format!("expected a 3x3 matrix, got {:?}", intrinsics),
            ));
        }
        if self.motion.omega <= 0. {
            return Err(invalid("motion.omega", "must be positive"));
        }
        if !(self.motion.forgetting > 0. && self.motion.forgetting <= 1.) {
            return Err(invalid("motion.forgetting", "must be in (0, 1]"));
        }
        if self.motion.sample_noise <= 0. {
            return Err(invalid("motion.sample_noise", "must be positive"));
        }
        if self.roi.miss_threshold == 0 {
            return Err(invalid("roi.miss_threshold", "must be at least 1"));
        }
        if self.filter.angle_noise <= 0. {
            return Err(invalid("filter.angle_noise", "must be positive"));
        }
        if self.shoot.bullet_speed <= 0. {
            return Err(invalid("shoot.bullet_speed", "must be positive"));
        }
        if self.shoot.flight_delay < 0. {
            return Err(invalid("shoot.flight_delay", "must not be negative"));
        }
        if self.shoot.max_iterations == 0 {
            return Err(invalid("shoot.max_iterations", "must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_range(field: &'static str, range: &Range<f64>) -> Result<(), ConfigError> {
    if range.start.is_finite() && range.end.is_finite() && range.start <= range.end {
        Ok(())
    } else {
        Err(invalid(
            field,
            format!("{}..{} is not a valid range", range.start, range.end),
        ))
    }
}

fn check_tilt(field: &'static str, max_tilt: f64) -> Result<(), ConfigError> {
    if (0. ..=90.).contains(&max_tilt) {
        Ok(())
    } else {
        Err(invalid(field, format!("{} is not in [0, 90] degrees", max_tilt)))
    }
}
