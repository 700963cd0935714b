use std::{path::PathBuf, time::SystemTime};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use energy_vision::{
    analysis::PnpAngleSolver,
    camera::OpenCvCamera,
    config::EnergyParams,
    energy::EnergyDetector,
    extraction::EnergyContourExtractor,
    pipeline::VisionPipeline,
    udp::{AimMessage, UdpSender},
};

/// Energy mechanism auto-aim: camera in, aim commands out over UDP.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    #[arg(long, default_value_t = 0)]
    camera: i32,

    #[arg(long, default_value_t = 4904)]
    src_port: u16,

    /// Turret controller address.
    #[arg(long, env = "AIM_DESTINATION", default_value = "turret.local:4826")]
    destination: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let params = EnergyParams::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    info!(config = %args.config.display(), enemy = ?params.enemy_color, "configuration loaded");

    let camera = OpenCvCamera::new(args.camera)?;
    let extractor = EnergyContourExtractor::new(params.enemy_color, params.extraction.clone());
    let solver = PnpAngleSolver::new(&params.camera)?;
    let detector = EnergyDetector::new(params, extractor, solver)?;

    let mut pipeline = VisionPipeline::new(camera, detector);
    // Blocks until the destination resolves.
    let sender = UdpSender::new(args.src_port, args.destination.as_str())?;

    loop {
        match pipeline.run()? {
            Some(plate) => {
                debug!(?plate.predict_point, plate.angle_x, plate.angle_y, "aim");
                if let Err(error) = sender.send(&AimMessage::from_plate(&plate, SystemTime::now())) {
                    warn!("failed to send aim command: {:#}", error);
                }
            }
            None => debug!(phase = ?pipeline.detector().phase(), "no prediction"),
        }
    }
}
