use std::time::{Duration, Instant};

use nalgebra::Point2;

use energy_vision::{
    config::{EnergyParams, MotionParams},
    direction::Rotation,
    energy::EnergyDetector,
    geometry::Rect,
    motion::SpeedModel,
    solver::PinholeAngleSolver,
    synthetic::{SyntheticExtractor, SyntheticScene},
    tracking::TrackPhase,
    types::ArmorPlate,
};

type Detector = EnergyDetector<SyntheticExtractor, PinholeAngleSolver>;

fn detector(params: EnergyParams) -> Detector {
    let solver = PinholeAngleSolver::new(&params.camera);
    EnergyDetector::new(params, SyntheticExtractor, solver).unwrap()
}

fn constant_speed_params() -> EnergyParams {
    EnergyParams {
        motion: MotionParams::constant(1.0),
        ..EnergyParams::default()
    }
}

fn small_mechanism() -> SyntheticScene {
    SyntheticScene::new(
        Point2::new(100., 100.),
        60.,
        Rotation::Clockwise,
        SpeedModel::constant(1.0),
    )
}

fn at(start: Instant, t: f64) -> Instant {
    start + Duration::from_secs_f64(t)
}

#[test]
fn five_frames_clockwise_constant_speed() {
    let mut detector = detector(constant_speed_params());
    let handle = detector.snapshot_handle();
    let mut scene = small_mechanism();
    let delay = detector.params().shoot.flight_delay;

    let start = Instant::now();
    let mut plate = ArmorPlate::default();
    let mut results = Vec::new();

    for i in 0..5 {
        let t = i as f64 * 0.1;
        results.push(detector.run(&scene.render(at(start, t), t), &mut plate));

        if i < 2 {
            // Warming up: the published aim point is the armor where it is now.
            let point = handle.latest().predict_point.unwrap();
            assert!((point - scene.target_position(t)).norm() < 1e-6, "frame {}", i);
            assert_eq!(plate, ArmorPlate::default());
        }
        if i == 2 {
            assert_eq!(detector.rotation(), Rotation::Clockwise);
        }
    }

    assert_eq!(results[..2], [false, false]);
    assert!(results[4]);
    assert_eq!(detector.phase(), TrackPhase::Tracking);

    let expected = scene.target_position(0.4 + delay);
    let error = (plate.predict_point - expected).norm();
    assert!(error < 2., "prediction off by {} px", error);

    assert!(plate.distance > 0.);
    assert_eq!(plate.timestamp, Some(at(start, 0.4)));
    assert_eq!(handle.latest().predict_point, Some(plate.predict_point));
}

#[test]
fn blank_frames_reset_after_miss_threshold() {
    let params = constant_speed_params();
    assert_eq!(params.roi.miss_threshold, 10);

    let mut detector = detector(params);
    let mut scene = small_mechanism();
    let start = Instant::now();
    let mut plate = ArmorPlate::default();

    for i in 0..10 {
        let t = i as f64 * 0.1;
        detector.run(&scene.render(at(start, t), t), &mut plate);
    }
    assert_eq!(detector.phase(), TrackPhase::Tracking);
    assert!(detector.motion_model().is_some());
    let last_prediction = plate.clone();

    for frame in 1..=20 {
        let t = 1. + frame as f64 * 0.1;
        assert!(!detector.run(&scene.blank(at(start, t)), &mut plate));

        match frame {
            1..=10 => assert_eq!(detector.phase(), TrackPhase::Degraded),
            _ => assert_eq!(detector.phase(), TrackPhase::Reset),
        }
    }

    // Nothing was emitted while blind, and the track was discarded.
    assert_eq!(plate, last_prediction);
    assert_eq!(detector.miss_count(), 11);
    assert!(detector.motion_model().is_none());
    assert!(detector.history().is_empty());
    assert_eq!(detector.rotation(), Rotation::Undetermined);
    assert_eq!(detector.center(), None);
    assert_eq!(detector.roi().map(|roi| roi.rect), Some(Rect::new(0, 0, 640, 480)));
}

#[test]
fn blank_start_never_predicts() {
    let mut detector = detector(EnergyParams::default());
    let scene = small_mechanism();
    let start = Instant::now();
    let mut plate = ArmorPlate::default();

    for frame in 1..=20 {
        let t = frame as f64 / 30.;
        assert!(!detector.run(&scene.blank(at(start, t)), &mut plate));

        let expected = if frame <= 10 {
            TrackPhase::Init
        } else {
            TrackPhase::Reset
        };
        assert_eq!(detector.phase(), expected, "frame {}", frame);
    }

    assert_eq!(plate, ArmorPlate::default());
}

#[test]
fn sinusoidal_speed_converges_after_warm_up() {
    let truth = SpeedModel {
        amplitude: 0.9,
        omega: 1.884,
        phase: 0.7,
        bias: 1.19,
    };
    let mut detector = detector(EnergyParams::default());
    let mut scene = SyntheticScene::new(
        Point2::new(100., 100.),
        60.,
        Rotation::CounterClockwise,
        truth,
    )
    .with_initial_angle(0.3);
    let delay = detector.params().shoot.flight_delay;

    let start = Instant::now();
    let mut plate = ArmorPlate::default();
    let mut worst = 0f64;

    for i in 0..300 {
        let t = i as f64 / 30.;
        let predicted = detector.run(&scene.render(at(start, t), t), &mut plate);

        if i >= 120 {
            assert!(predicted, "no prediction at frame {}", i);
            let error = (plate.predict_point - scene.target_position(t + delay)).norm();
            worst = worst.max(error);
        }
    }

    assert_eq!(detector.rotation(), Rotation::CounterClockwise);
    assert!(worst < 1., "worst error after warm-up {} px", worst);

    let model = detector.motion_model().unwrap();
    assert!((model.amplitude - truth.amplitude).abs() < 0.05);
    assert!((model.bias - truth.bias).abs() < 0.05);
}

#[test]
fn multiple_lit_blades_follow_the_active_one() {
    let mut detector = detector(constant_speed_params());
    let handle = detector.snapshot_handle();
    let mut scene = small_mechanism().with_lit_inactive(true);
    let delay = detector.params().shoot.flight_delay;

    let start = Instant::now();
    let mut plate = ArmorPlate::default();

    for i in 0..10 {
        let t = i as f64 * 0.1;
        detector.run(&scene.render(at(start, t), t), &mut plate);

        let target = handle.latest().target_armor.unwrap();
        assert!((target.center - scene.target_position(t)).norm() < 1e-6);
    }
    assert_eq!(detector.phase(), TrackPhase::Tracking);

    // A different blade lights up; direction and fit carry over.
    scene.active_blade = 2;
    let mut resumed = None;
    for i in 10..15 {
        let t = i as f64 * 0.1;
        let predicted = detector.run(&scene.render(at(start, t), t), &mut plate);

        let target = handle.latest().target_armor.unwrap();
        assert!((target.center - scene.target_position(t)).norm() < 1e-6);
        if predicted && resumed.is_none() {
            resumed = Some(i);
        }
    }

    assert!(resumed.map_or(false, |frame| frame <= 12), "resumed at {:?}", resumed);
    assert_eq!(detector.rotation(), Rotation::Clockwise);

    let error = (plate.predict_point - scene.target_position(1.4 + delay)).norm();
    assert!(error < 2., "prediction off by {} px", error);
}
