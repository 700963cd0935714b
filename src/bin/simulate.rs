use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use nalgebra::Point2;
use tracing::info;
use tracing_subscriber::EnvFilter;

use energy_vision::{
    config::{EnergyParams, MotionParams},
    direction::Rotation,
    energy::EnergyDetector,
    motion::SpeedModel,
    solver::PinholeAngleSolver,
    synthetic::{SyntheticExtractor, SyntheticScene},
    types::ArmorPlate,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Constant 1/3 revolution per second.
    Small,
    /// Sinusoidal speed profile.
    Big,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Spin {
    Cw,
    Ccw,
}

/// Runs the detector against a simulated energy mechanism and reports how
/// far each prediction lands from the true future armor position.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "big")]
    mode: Mode,

    #[arg(long, value_enum, default_value = "cw")]
    spin: Spin,

    #[arg(long, default_value_t = 30.)]
    fps: f64,

    #[arg(long, default_value_t = 10.)]
    seconds: f64,

    /// Detection noise, pixels.
    #[arg(long, default_value_t = 0.5)]
    noise: f64,

    #[arg(long, default_value_t = 4904)]
    seed: u64,

    /// Switch the active blade every this many seconds; 0 never switches.
    #[arg(long, default_value_t = 2.5)]
    switch_every: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut params = match &args.config {
        Some(path) => EnergyParams::load(path)?,
        None => EnergyParams::default(),
    };

    let truth = match args.mode {
        Mode::Small => {
            let speed = std::f64::consts::PI / 3.;
            params.motion = MotionParams::constant(speed);
            SpeedModel::constant(speed)
        }
        Mode::Big => SpeedModel {
            amplitude: 0.9,
            omega: params.motion.omega,
            phase: 0.,
            bias: 2.09 - 0.9,
        },
    };
    let rotation = match args.spin {
        Spin::Cw => Rotation::Clockwise,
        Spin::Ccw => Rotation::CounterClockwise,
    };

    let delay = params.shoot.flight_delay;
    let solver = PinholeAngleSolver::new(&params.camera);
    let mut detector = EnergyDetector::new(params, SyntheticExtractor, solver)?;

    let mut scene = SyntheticScene::new(Point2::new(640., 512.), 90., rotation, truth)
        .with_frame_size(energy_vision::geometry::FrameSize::new(1280, 1024))
        .with_lit_inactive(true)
        .with_noise(args.noise, args.seed)?;

    let start = Instant::now();
    let frames = (args.seconds * args.fps) as usize;
    let mut plate = ArmorPlate::default();
    let (mut predicted, mut total_error, mut worst_error) = (0usize, 0., 0f64);

    for i in 0..frames {
        let t = i as f64 / args.fps;

        if args.switch_every > 0. {
            let blade = (t / args.switch_every) as usize % scene.blades;
            scene.active_blade = blade;
        }

        let frame = scene.render(start + Duration::from_secs_f64(t), t);
        if !detector.run(&frame, &mut plate) {
            continue;
        }

        let error = (plate.predict_point - scene.target_position(t + delay)).norm();
        predicted += 1;
        total_error += error;
        worst_error = worst_error.max(error);

        if i % args.fps.max(1.) as usize == 0 {
            info!(
                t,
                error,
                distance = plate.distance,
                yaw = plate.angle_x,
                pitch = plate.angle_y,
                phase = ?detector.phase(),
                "prediction"
            );
        }
    }

    info!(
        frames,
        predicted,
        mean_error = total_error / predicted.max(1) as f64,
        worst_error,
        model = ?detector.motion_model(),
        "simulation finished"
    );

    Ok(())
}
