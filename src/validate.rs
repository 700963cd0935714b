//! Shape validators and template-scored selection.
//!
//! Tolerances are data: each family is checked against its
//! [`ShapeTolerance`] and the survivors are ranked by distance from the ideal
//! template, lowest score wins.

use nalgebra::Point2;
use tracing::{debug, trace};

use crate::{
    config::{ArmorParams, CenterRParams, FlowStripParams, ShapeTolerance},
    geometry::{axis_deviation, image_angle, RotatedBox},
    types::ShapeCandidate,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    Degenerate,
    Area(f64),
    AspectRatio(f64),
    Fill(f64),
    Solidity(f64),
    Tilt(f64),
    Intensity { mean: f64, std_dev: f64 },
    MissingIntensity,
}

impl ShapeTolerance {
    pub fn check(&self, candidate: &ShapeCandidate) -> Result<(), Rejection> {
        let rect = &candidate.rect;
        if rect.is_degenerate() || candidate.hull_area <= 0. {
            return Err(Rejection::Degenerate);
        }

        let area = rect.area();
        if !self.area.contains(&area) {
            return Err(Rejection::Area(area));
        }

        let aspect_ratio = rect.aspect_ratio();
        if !self.aspect_ratio.contains(&aspect_ratio) {
            return Err(Rejection::AspectRatio(aspect_ratio));
        }

        let fill = candidate.fill_ratio();
        if fill < self.min_fill {
            return Err(Rejection::Fill(fill));
        }

        let solidity = candidate.solidity();
        if solidity < self.min_solidity {
            return Err(Rejection::Solidity(solidity));
        }

        Ok(())
    }

    /// Distance from the ideal template; 0 is a perfect match.
    pub fn score(&self, rect: &RotatedBox) -> f64 {
        let area_term = (rect.area() / self.ideal_area).ln().abs();
        let aspect_term =
            ((rect.aspect_ratio() - self.ideal_aspect_ratio) / self.ideal_aspect_ratio).abs();

        area_term + aspect_term
    }
}

fn log_rejection(family: &str, candidate: &ShapeCandidate, rejection: Rejection) {
    match rejection {
        Rejection::Degenerate => debug!(family, center = ?candidate.rect.center, "degenerate candidate"),
        _ => trace!(family, center = ?candidate.rect.center, ?rejection, "candidate rejected"),
    }
}

/// Deviation, in degrees, of the armor's long side from perpendicular to the
/// blade's long side.
pub fn armor_tilt(armor: &RotatedBox, flow_strip_fan: &RotatedBox) -> f64 {
    axis_deviation(armor.long_axis() + 90., flow_strip_fan.long_axis())
}

/// Deviation, in degrees, of the fan's long side from the radial through
/// `center`. `None` when the fan sits on the center.
pub fn flow_strip_fan_tilt(flow_strip_fan: &RotatedBox, center: Point2<f64>) -> Option<f64> {
    let radial = flow_strip_fan.center - center;
    if radial.norm() <= f64::EPSILON {
        return None;
    }

    Some(axis_deviation(flow_strip_fan.long_axis(), image_angle(radial)))
}

fn within_tilt(family: &str, candidate: &ShapeCandidate, tilt: Option<f64>, max_tilt: f64) -> bool {
    match tilt {
        Some(tilt) if tilt <= max_tilt => true,
        Some(tilt) => {
            log_rejection(family, candidate, Rejection::Tilt(tilt));
            false
        }
        None => {
            log_rejection(family, candidate, Rejection::Degenerate);
            false
        }
    }
}

/// Arg-min of `score` over the candidates accepted by `accept`.
pub fn select_best<'a, I, A, S>(candidates: I, mut accept: A, mut score: S) -> Option<&'a ShapeCandidate>
where
    I: IntoIterator<Item = &'a ShapeCandidate>,
    A: FnMut(&ShapeCandidate) -> bool,
    S: FnMut(&ShapeCandidate) -> f64,
{
    candidates
        .into_iter()
        .filter(|candidate| accept(*candidate))
        .map(|candidate| (score(candidate), candidate))
        .filter(|(score, _)| score.is_finite())
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, candidate)| candidate)
}

pub fn is_valid_armor(params: &ArmorParams, candidate: &ShapeCandidate) -> bool {
    match params.shape.check(candidate) {
        Ok(()) => true,
        Err(rejection) => {
            log_rejection("armor", candidate, rejection);
            false
        }
    }
}

pub fn is_valid_flow_strip_fan(params: &FlowStripParams, candidate: &ShapeCandidate) -> bool {
    let result = params.shape.check(candidate).and_then(|()| match candidate.intensity {
        None => Err(Rejection::MissingIntensity),
        Some(stats)
            if stats.mean < params.min_intensity_mean || stats.std_dev < params.min_intensity_std =>
        {
            Err(Rejection::Intensity {
                mean: stats.mean,
                std_dev: stats.std_dev,
            })
        }
        Some(_) => Ok(()),
    });

    match result {
        Ok(()) => true,
        Err(rejection) => {
            log_rejection("flow_strip_fan", candidate, rejection);
            false
        }
    }
}

pub fn is_valid_center_r(params: &CenterRParams, candidate: &ShapeCandidate) -> bool {
    match params.shape.check(candidate) {
        Ok(()) => true,
        Err(rejection) => {
            log_rejection("center_r", candidate, rejection);
            false
        }
    }
}

/// Active blade: the best lit fan carrying a flow strip. With a known
/// rotation center the fan must also point at it.
pub fn find_flow_strip_fan<'a>(
    params: &FlowStripParams,
    candidates: &'a [ShapeCandidate],
    center: Option<Point2<f64>>,
) -> Option<&'a ShapeCandidate> {
    select_best(
        candidates,
        |candidate| {
            is_valid_flow_strip_fan(params, candidate)
                && center.map_or(true, |center| {
                    let tilt = flow_strip_fan_tilt(&candidate.rect, center);
                    within_tilt("flow_strip_fan", candidate, tilt, params.max_tilt)
                })
        },
        |candidate| params.shape.score(&candidate.rect),
    )
}

/// Target armor: inside the active fan and across its axis when a fan was
/// found, otherwise the armor continuing the prior target.
pub fn find_target_armor<'a>(
    params: &ArmorParams,
    candidates: &'a [ShapeCandidate],
    flow_strip_fan: Option<&RotatedBox>,
    prior_target_armor: Option<&RotatedBox>,
) -> Option<&'a ShapeCandidate> {
    match (flow_strip_fan, prior_target_armor) {
        (Some(fan), _) => select_best(
            candidates,
            |candidate| {
                is_valid_armor(params, candidate)
                    && fan.contains(candidate.rect.center)
                    && within_tilt(
                        "armor",
                        candidate,
                        Some(armor_tilt(&candidate.rect, fan)),
                        params.max_tilt,
                    )
            },
            |candidate| params.shape.score(&candidate.rect),
        ),
        (None, Some(prior)) => select_best(
            candidates,
            |candidate| {
                is_valid_armor(params, candidate)
                    && (candidate.rect.center - prior.center).norm() <= params.max_prior_jump
            },
            |candidate| (candidate.rect.center - prior.center).norm(),
        ),
        (None, None) => None,
    }
}

/// Center marker closest to the template and to where the center is expected.
pub fn find_center_r<'a>(
    params: &CenterRParams,
    candidates: &'a [ShapeCandidate],
    expected: Option<(Point2<f64>, f64)>,
) -> Option<&'a ShapeCandidate> {
    select_best(
        candidates,
        |candidate| is_valid_center_r(params, candidate),
        |candidate| {
            let shape = params.shape.score(&candidate.rect);
            match expected {
                Some((center, radius)) if radius > 0. => {
                    shape
                        + params.distance_weight * (candidate.rect.center - center).norm() / radius
                }
                _ => shape,
            }
        },
    )
}

/// Rotation center implied by the active blade: on the line from the armor
/// through the fan center, `center_distance_ratio` armor-to-fan distances
/// away from the armor.
pub fn predict_r_center(
    params: &CenterRParams,
    armor: &RotatedBox,
    flow_strip_fan: &RotatedBox,
) -> Option<Point2<f64>> {
    let axis = flow_strip_fan.center - armor.center;
    if axis.norm() <= f64::EPSILON {
        return None;
    }

    Some(armor.center + axis * params.center_distance_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::types::IntensityStats;

    fn candidate(center: (f64, f64), width: f64, height: f64) -> ShapeCandidate {
        turned(center, width, height, 0.)
    }

    fn turned(center: (f64, f64), width: f64, height: f64, angle: f64) -> ShapeCandidate {
        let rect = RotatedBox::new(Point2::new(center.0, center.1), width, height, angle);
        ShapeCandidate {
            rect,
            contour_area: rect.area() * 0.9,
            hull_area: rect.area() * 0.95,
            intensity: None,
        }
    }

    fn lit(mut candidate: ShapeCandidate, mean: f64, std_dev: f64) -> ShapeCandidate {
        candidate.intensity = Some(IntensityStats { mean, std_dev });
        candidate
    }

    #[test]
    fn test_armor_tolerances() {
        let params = ArmorParams::default();

        assert!(is_valid_armor(&params, &candidate((0., 0.), 46., 26.)));
        // Too small, too elongated, and degenerate.
        assert!(!is_valid_armor(&params, &candidate((0., 0.), 10., 8.)));
        assert!(!is_valid_armor(&params, &candidate((0., 0.), 90., 20.)));
        assert!(!is_valid_armor(&params, &candidate((0., 0.), 46., 0.)));

        let mut hollow = candidate((0., 0.), 46., 26.);
        hollow.contour_area = hollow.rect.area() * 0.2;
        assert!(matches!(params.shape.check(&hollow), Err(Rejection::Fill(_))));
    }

    #[test]
    fn test_select_best_is_arg_min() {
        let params = ArmorParams::default();
        let candidates = vec![
            candidate((0., 0.), 40., 30.),
            candidate((50., 0.), 46.5, 25.8),
            candidate((100., 0.), 55., 24.),
        ];

        let best = select_best(
            &candidates,
            |c| is_valid_armor(&params, c),
            |c| params.shape.score(&c.rect),
        )
        .unwrap();

        assert_eq!(best.rect.center, Point2::new(50., 0.));
    }

    #[test]
    fn test_flow_strip_needs_intensity_variation() {
        let params = FlowStripParams::default();

        let active = lit(candidate((0., 0.), 110., 46.), 120., 120.);
        let solid = lit(candidate((0., 0.), 110., 46.), 255., 0.);
        let unmeasured = candidate((0., 0.), 110., 46.);

        assert!(is_valid_flow_strip_fan(&params, &active));
        assert!(!is_valid_flow_strip_fan(&params, &solid));
        assert!(!is_valid_flow_strip_fan(&params, &unmeasured));
    }

    #[test]
    fn test_target_armor_must_sit_in_active_fan() {
        let params = ArmorParams::default();
        let fan = RotatedBox::new(Point2::new(130., 100.), 110., 46., 0.);
        let armors = vec![
            turned((100., 170.), 46.5, 25.8, 0.),
            turned((160., 100.), 44., 25., 90.),
        ];

        let target = find_target_armor(&params, &armors, Some(&fan), None).unwrap();
        assert_eq!(target.rect.center, Point2::new(160., 100.));
    }

    #[test]
    fn test_target_armor_must_lie_across_the_fan() {
        let params = ArmorParams::default();
        let fan = RotatedBox::new(Point2::new(130., 100.), 110., 46., 0.);

        // Long side along the blade axis.
        let along = [turned((160., 100.), 46.5, 25.8, 0.)];
        assert!(find_target_armor(&params, &along, Some(&fan), None).is_none());

        // The same box described with swapped sides is across the axis.
        let swapped = [turned((160., 100.), 25.8, 46.5, 0.)];
        assert!(find_target_armor(&params, &swapped, Some(&fan), None).is_some());

        // Slightly off perpendicular is within tolerance, far off is not.
        let slight = [turned((160., 100.), 46.5, 25.8, 80.)];
        let skewed = [turned((160., 100.), 46.5, 25.8, 45.)];
        assert!(find_target_armor(&params, &slight, Some(&fan), None).is_some());
        assert!(find_target_armor(&params, &skewed, Some(&fan), None).is_none());

        assert_eq!(armor_tilt(&skewed[0].rect, &fan), 45.);
    }

    #[test]
    fn test_flow_strip_fan_must_point_at_center() {
        let params = FlowStripParams::default();
        let center = Point2::new(100., 100.);
        let radial = lit(turned((130., 100.), 110., 46., 0.), 120., 120.);
        let sideways = lit(turned((100., 130.), 110., 46., 0.), 120., 120.);

        let fans = [sideways, radial];
        let best = find_flow_strip_fan(&params, &fans, Some(center)).unwrap();
        assert_eq!(best.rect.center, Point2::new(130., 100.));

        assert!(find_flow_strip_fan(&params, &fans[..1], Some(center)).is_none());
        // Without a center only shape and intensity count.
        assert!(find_flow_strip_fan(&params, &fans[..1], None).is_some());

        let on_center = RotatedBox::new(center, 110., 46., 0.);
        assert_eq!(flow_strip_fan_tilt(&on_center, center), None);
    }

    #[test]
    fn test_target_armor_falls_back_to_prior() {
        let params = ArmorParams::default();
        let prior = RotatedBox::new(Point2::new(160., 100.), 46., 26., 0.);
        let armors = vec![
            candidate((100., 170.), 46.5, 25.8),
            candidate((165., 103.), 44., 25.),
        ];

        let target = find_target_armor(&params, &armors, None, Some(&prior)).unwrap();
        assert_eq!(target.rect.center, Point2::new(165., 103.));

        assert!(find_target_armor(&params, &armors[..1], None, Some(&prior)).is_none());
        assert!(find_target_armor(&params, &armors, None, None).is_none());
    }

    #[test]
    fn test_center_prefers_expected_position() {
        let params = CenterRParams::default();
        let centers = vec![candidate((300., 300.), 12., 12.), candidate((102., 99.), 13., 11.)];

        let best = find_center_r(&params, &centers, Some((Point2::new(100., 100.), 60.))).unwrap();
        assert_eq!(best.rect.center, Point2::new(102., 99.));
    }

    #[test]
    fn test_predict_r_center_from_blade() {
        let params = CenterRParams::default();
        let armor = RotatedBox::new(Point2::new(160., 100.), 46., 26., 90.);
        let fan = RotatedBox::new(Point2::new(130., 100.), 110., 46., 0.);

        let center = predict_r_center(&params, &armor, &fan).unwrap();
        assert_eq!(center, Point2::new(100., 100.));

        assert!(predict_r_center(&params, &armor, &armor).is_none());
    }
}
