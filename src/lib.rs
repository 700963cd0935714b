pub mod compensate;
pub mod config;
pub mod direction;
pub mod energy;
pub mod filter;
pub mod geometry;
pub mod history;
pub mod motion;
pub mod pipeline;
pub mod predict;
pub mod ring_buffer;
pub mod roi;
pub mod solver;
pub mod synthetic;
pub mod tracking;
pub mod traits;
pub mod types;
pub mod udp;
pub mod validate;

#[cfg(feature = "opencv")]
pub mod analysis;
#[cfg(feature = "opencv")]
pub mod camera;
#[cfg(feature = "opencv")]
pub mod extraction;

pub use config::EnergyParams;
pub use energy::{EnergyDetector, EnergySnapshot, SnapshotHandle};
pub use types::{ArmorPlate, Frame};
