//! Per-frame orchestration of the detection and prediction stages.
//!
//! One [`EnergyDetector`] owns every piece of state that survives between
//! frames: the ROI, the miss counter, the angle history, the rotation
//! direction, the speed fit and the angle filter. Other threads only ever see
//! the [`EnergySnapshot`] published at the end of [`EnergyDetector::run`].

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

use nalgebra::Point2;
use tracing::{debug, info, trace, warn};

use crate::{
    compensate::ShootingCompensator,
    config::{ConfigError, EnergyParams},
    direction::{Rotation, RotationEstimator},
    filter::{AngleFilter, ModelStep},
    geometry::{polar_angle, unwrap_angle, Rect, RotatedBox},
    history::AngleHistory,
    motion::{SpeedFitter, SpeedModel},
    predict::{lead_displacement, predict_target_point},
    roi::{Roi, RoiManager},
    tracking::{FrameOutcome, MissCounter, TrackPhase},
    traits::{AngleSolver, ContourExtractor, ImageData},
    types::{ArmorPlate, CandidateSet, Frame},
    validate::{find_center_r, find_flow_strip_fan, find_target_armor, predict_r_center},
};

/// Armors closer than this to the center give no usable angle.
const MIN_RADIUS: f64 = 1.;

/// Copy of the detector state after the latest frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnergySnapshot {
    pub phase: TrackPhase,
    pub rotation: Rotation,
    pub rotation_confidence: f64,
    pub center: Option<Point2<f64>>,
    pub target_armor: Option<RotatedBox>,
    /// Lead aim point when a prediction was emitted. While the motion model
    /// is still warming up this holds the armor's current position instead.
    pub predict_point: Option<Point2<f64>>,
    pub roi: Option<Rect>,
    pub misses: u32,
    pub angle_confidence: f64,
}

/// Shared read access to the latest [`EnergySnapshot`].
#[derive(Debug, Clone, Default)]
pub struct SnapshotHandle(Arc<Mutex<EnergySnapshot>>);

impl SnapshotHandle {
    pub fn latest(&self) -> EnergySnapshot {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn publish(&self, snapshot: EnergySnapshot) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

/// Target located in one frame, in frame coordinates.
#[derive(Debug, Clone, Copy)]
struct Sighting {
    armor: RotatedBox,
    center: Option<Point2<f64>>,
}

pub struct EnergyDetector<E, S> {
    params: EnergyParams,
    extractor: E,
    solver: S,
    compensator: ShootingCompensator,
    roi: RoiManager,
    misses: MissCounter,
    phase: TrackPhase,
    history: AngleHistory,
    direction: RotationEstimator,
    fitter: SpeedFitter,
    filter: Option<AngleFilter>,
    center: Option<Point2<f64>>,
    prior_target_armor: Option<RotatedBox>,
    first_timestamp: Option<Instant>,
    snapshot: SnapshotHandle,
}

impl<E, S: AngleSolver> EnergyDetector<E, S> {
    pub fn new(params: EnergyParams, extractor: E, solver: S) -> Result<Self, ConfigError> {
        params.validate()?;

        Ok(EnergyDetector {
            compensator: ShootingCompensator::new(params.shoot.clone()),
            roi: RoiManager::new(params.roi.clone()),
            misses: MissCounter::new(params.roi.miss_threshold),
            phase: TrackPhase::Init,
            history: AngleHistory::new(),
            direction: RotationEstimator::new(),
            fitter: SpeedFitter::new(params.motion.clone()),
            filter: None,
            center: None,
            prior_target_armor: None,
            first_timestamp: None,
            snapshot: SnapshotHandle::default(),
            params,
            extractor,
            solver,
        })
    }

    pub fn params(&self) -> &EnergyParams {
        &self.params
    }

    pub fn phase(&self) -> TrackPhase {
        self.phase
    }

    pub fn rotation(&self) -> Rotation {
        self.direction.rotation()
    }

    /// Last resolved rotation center, in frame coordinates.
    pub fn center(&self) -> Option<Point2<f64>> {
        self.center
    }

    pub fn miss_count(&self) -> u32 {
        self.misses.count()
    }

    pub fn roi(&self) -> Option<&Roi> {
        self.roi.roi()
    }

    pub fn history(&self) -> &AngleHistory {
        &self.history
    }

    /// Current speed fit, `None` until a speed sample was accepted.
    pub fn motion_model(&self) -> Option<SpeedModel> {
        self.fitter.is_ready().then(|| self.fitter.model())
    }

    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    /// Processes one frame. Writes `out` and returns true only when a
    /// compensated prediction is available; otherwise `out` is untouched.
    pub fn run<I>(&mut self, frame: &Frame<I>, out: &mut ArmorPlate) -> bool
    where
        I: ImageData,
        E: ContourExtractor<I>,
    {
        let time = self.frame_time(frame.timestamp);
        let roi = self.roi.update(frame.data.size(), self.misses.count());

        let candidates = match self.extractor.extract_from(frame, &roi) {
            Ok(candidates) => candidates.translated(roi.offset_f64()),
            Err(error) => {
                warn!("candidate extraction failed: {:#}", error);
                CandidateSet::default()
            }
        };

        let sighting = self.locate(&candidates);
        let outcome = match sighting {
            Some(Sighting { armor, center }) => {
                self.misses.record_hit();
                self.prior_target_armor = Some(armor);

                match center {
                    Some(center) => {
                        self.center = Some(center);
                        self.roi.record_target(center, (armor.center - center).norm());
                        self.track(time, frame.timestamp, center, &armor, out)
                    }
                    None => {
                        debug!("no rotation center resolved");
                        self.roi.record_target(armor.center, 0.);
                        FrameOutcome::Acquired
                    }
                }
            }
            None => {
                self.misses.record_miss();
                FrameOutcome::Missed
            }
        };

        self.advance_phase(outcome);

        let predicted = outcome == FrameOutcome::Predicted;
        let predict_point = match outcome {
            FrameOutcome::Predicted => Some(out.predict_point),
            FrameOutcome::Acquired => sighting.map(|sighting| sighting.armor.center),
            FrameOutcome::Missed => None,
        };
        self.snapshot.publish(EnergySnapshot {
            phase: self.phase,
            rotation: self.direction.rotation(),
            rotation_confidence: self.direction.confidence(),
            center: self.center,
            target_armor: sighting.map(|sighting| sighting.armor),
            predict_point,
            roi: Some(roi.rect),
            misses: self.misses.count(),
            angle_confidence: if self.fitter.is_ready() {
                self.fitter.angle_confidence()
            } else {
                0.
            },
        });

        predicted
    }

    /// Discards every piece of tracking state; the next frame starts over
    /// from a full-frame search.
    pub fn reset(&mut self) {
        self.history.clear();
        self.fitter.reset();
        self.filter = None;
        self.roi.forget();
        self.direction.reset();
        self.center = None;
        self.prior_target_armor = None;
    }

    fn frame_time(&mut self, timestamp: Instant) -> f64 {
        let start = *self.first_timestamp.get_or_insert(timestamp);
        timestamp.saturating_duration_since(start).as_secs_f64()
    }

    fn locate(&self, candidates: &CandidateSet) -> Option<Sighting> {
        let fan = find_flow_strip_fan(
            &self.params.flow_strip_fan,
            &candidates.flow_strip_fans,
            self.center,
        )
        .map(|candidate| candidate.rect);

        let armor = find_target_armor(
            &self.params.armor,
            &candidates.armors,
            fan.as_ref(),
            self.prior_target_armor.as_ref(),
        )?
        .rect;

        let from_blade = fan.and_then(|fan| predict_r_center(&self.params.center_r, &armor, &fan));
        let expected = from_blade
            .or(self.center)
            .map(|center| (center, (armor.center - center).norm()));

        let center = find_center_r(&self.params.center_r, &candidates.center_rs, expected)
            .map(|candidate| candidate.rect.center)
            .or(from_blade)
            .or(self.center)
            .filter(|center| (armor.center - center).norm() > MIN_RADIUS);

        Some(Sighting { armor, center })
    }

    fn track(
        &mut self,
        time: f64,
        timestamp: Instant,
        center: Point2<f64>,
        armor: &RotatedBox,
        out: &mut ArmorPlate,
    ) -> FrameOutcome {
        let angle = self.filter_angle(time, polar_angle(center, armor.center));
        let increment = self.history.push(time, angle, armor.center - center);

        if let Some(previous) = self.direction.update(&self.history) {
            if previous.is_determined() {
                info!(
                    ?previous,
                    current = ?self.direction.rotation(),
                    "rotation reversed, refitting speed model"
                );
                self.fitter.reset();
            }
        }

        let rotation = self.direction.rotation();
        if let Some(sample) = increment.filter(|_| rotation.is_determined()) {
            self.fitter.add_sample(sample.time, rotation.sign() * sample.omega);
        }

        let (filter, epoch) = match (&self.filter, self.fitter.epoch()) {
            (Some(filter), Some(epoch)) => (filter, epoch),
            _ => return FrameOutcome::Acquired,
        };

        if self.history.len() < 2 || !rotation.is_determined() || !self.fitter.is_ready() {
            trace!(samples = self.history.len(), ?rotation, "motion model not ready");
            return FrameOutcome::Acquired;
        }
        if filter.angle_std() > self.params.filter.max_angle_std {
            debug!(angle_std = filter.angle_std(), "angle estimate too uncertain");
            return FrameOutcome::Acquired;
        }

        let prediction = predict_target_point(
            center,
            armor,
            filter.angle(),
            rotation,
            &self.fitter.model(),
            time - epoch,
            self.params.shoot.flight_delay,
        );

        match self.compensator.compensate(&self.solver, &prediction.rect) {
            Some(aim) => {
                *out = ArmorPlate {
                    rect: prediction.rect,
                    predict_point: prediction.point,
                    distance: aim.distance,
                    angle_x: aim.yaw,
                    angle_y: aim.pitch,
                    flight_time: aim.flight_time,
                    timestamp: Some(timestamp),
                };
                FrameOutcome::Predicted
            }
            None => {
                debug!("angle solver could not place the predicted plate");
                FrameOutcome::Acquired
            }
        }
    }

    /// Runs the angle filter on a raw measurement and returns the filtered,
    /// unwrapped angle.
    fn filter_angle(&mut self, time: f64, measured: f64) -> f64 {
        let expiration = self.params.filter.expiration;

        let filter = match self.filter.as_mut() {
            Some(filter) if !filter.is_expired(time, expiration) => filter,
            stale => {
                if stale.is_some() {
                    debug!("angle filter expired");
                    self.history.clear();
                }
                self.filter = Some(AngleFilter::new(&self.params.filter, time, measured));
                return measured;
            }
        };

        let step = model_step(&self.fitter, self.direction.rotation(), filter.last_update_time, time);
        filter.predict(time, step);

        let predicted = filter.angle();
        let angle = unwrap_angle(predicted, measured);

        if (angle - predicted).abs() > self.params.motion.blade_switch_threshold {
            info!(jump = angle - predicted, "active blade switched");
            *filter = AngleFilter::new(&self.params.filter, time, angle);
            self.history.clear();
        } else {
            filter.correct(angle);
        }

        filter.angle()
    }

    fn advance_phase(&mut self, outcome: FrameOutcome) {
        let next = self.phase.next(outcome, self.misses.is_lost());

        if self.phase.enters_reset(next) {
            info!(misses = self.misses.count(), "target lost, discarding track");
            self.reset();
        } else if next != self.phase {
            debug!(from = ?self.phase, to = ?next, "track phase changed");
        }

        self.phase = next;
    }
}

/// Model-driven filter step between two frame times, when the model is
/// usable.
fn model_step(fitter: &SpeedFitter, rotation: Rotation, from: f64, to: f64) -> Option<ModelStep> {
    let epoch = fitter.epoch()?;
    if !rotation.is_determined() || !fitter.is_ready() {
        return None;
    }

    let model = fitter.model();
    Some(ModelStep {
        displacement: lead_displacement(rotation, &model, from - epoch, to - from),
        speed: rotation.sign() * model.spd_func(to - epoch),
    })
}
