//! Planar geometry shared by every stage: rotated boxes, integer rects and
//! the center-relative polar angle convention.
//!
//! Image coordinates have `y` pointing down. Polar angles are measured with
//! `y` flipped (counter-clockwise on screen is positive), the same convention
//! used when ordering contour vertices.

use std::f64::consts::PI;

use nalgebra::{Point2, Rotation2, Vector2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: i32,
    pub height: i32,
}

impl FrameSize {
    pub fn new(width: i32, height: i32) -> Self {
        FrameSize { width, height }
    }

    pub fn full_rect(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }
}

/// Axis-aligned integer rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rect covering the given half extents around `center`.
    pub fn around(center: Point2<f64>, half_width: f64, half_height: f64) -> Self {
        let x0 = (center.x - half_width).floor() as i32;
        let y0 = (center.y - half_height).floor() as i32;
        let x1 = (center.x + half_width).ceil() as i32;
        let y1 = (center.y + half_height).ceil() as i32;

        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, point: Point2<f64>) -> bool {
        point.x >= self.x as f64
            && point.y >= self.y as f64
            && point.x < (self.x + self.width) as f64
            && point.y < (self.y + self.height) as f64
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);

        if x1 <= x0 || y1 <= y0 {
            Rect::default()
        } else {
            Rect::new(x0, y0, x1 - x0, y1 - y0)
        }
    }
}

/// Rotated rectangle. `angle` is in degrees, clockwise on screen, and turns
/// the box's local `width` axis away from the image `x` axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedBox {
    pub center: Point2<f64>,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl Default for RotatedBox {
    fn default() -> Self {
        RotatedBox {
            center: Point2::origin(),
            width: 0.,
            height: 0.,
            angle: 0.,
        }
    }
}

impl RotatedBox {
    pub fn new(center: Point2<f64>, width: f64, height: f64, angle: f64) -> Self {
        RotatedBox {
            center,
            width,
            height,
            angle,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn long_side(&self) -> f64 {
        self.width.max(self.height)
    }

    pub fn short_side(&self) -> f64 {
        self.width.min(self.height)
    }

    /// Long side over short side, independent of orientation.
    pub fn aspect_ratio(&self) -> f64 {
        self.long_side() / self.short_side()
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= f64::EPSILON
            || self.height <= f64::EPSILON
    }

    /// Same box with `width` on the long side.
    pub fn normalized(&self) -> Self {
        if self.width >= self.height {
            *self
        } else {
            RotatedBox {
                width: self.height,
                height: self.width,
                angle: self.angle + 90.,
                ..*self
            }
        }
    }

    /// Direction of the long side as a clockwise image angle, degrees.
    pub fn long_axis(&self) -> f64 {
        self.normalized().angle
    }

    fn rotation(&self) -> Rotation2<f64> {
        // Positive image angles are clockwise on screen, which is a positive
        // rotation in the y-down frame.
        Rotation2::new(self.angle.to_radians())
    }

    /// Corners in order top-left, top-right, bottom-right, bottom-left of the
    /// box's local frame.
    pub fn corners(&self) -> [Point2<f64>; 4] {
        let rotation = self.rotation();
        let (hw, hh) = (self.width / 2., self.height / 2.);

        [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)]
            .map(|(x, y)| self.center + rotation * Vector2::new(x, y))
    }

    pub fn contains(&self, point: Point2<f64>) -> bool {
        let local = self.rotation().inverse() * (point - self.center);

        local.x.abs() <= self.width / 2. && local.y.abs() <= self.height / 2.
    }

    pub fn translated(&self, offset: Vector2<f64>) -> Self {
        RotatedBox {
            center: self.center + offset,
            ..*self
        }
    }

    /// Rotates the box about `pivot` by `radians` of polar angle
    /// (counter-clockwise on screen).
    pub fn rotated_about(&self, pivot: Point2<f64>, radians: f64) -> Self {
        let offset = self.center - pivot;
        let (radius, angle) = (offset.norm(), polar_angle(pivot, self.center));

        RotatedBox {
            center: point_at_polar(pivot, radius, angle + radians),
            angle: self.angle - radians.to_degrees(),
            ..*self
        }
    }
}

/// Polar angle of `point` around `center`, counter-clockwise on screen,
/// in `(-PI, PI]`.
pub fn polar_angle(center: Point2<f64>, point: Point2<f64>) -> f64 {
    (-(point.y - center.y)).atan2(point.x - center.x)
}

/// Inverse of [`polar_angle`].
pub fn point_at_polar(center: Point2<f64>, radius: f64, angle: f64) -> Point2<f64> {
    Point2::new(
        center.x + radius * angle.cos(),
        center.y - radius * angle.sin(),
    )
}

/// Direction of `vector` as a clockwise image angle, degrees.
pub fn image_angle(vector: Vector2<f64>) -> f64 {
    vector.y.atan2(vector.x).to_degrees()
}

/// Unsigned angle between two undirected axes given in degrees, in `[0, 90]`.
pub fn axis_deviation(a: f64, b: f64) -> f64 {
    let difference = (a - b).rem_euclid(180.);
    difference.min(180. - difference)
}

/// Wraps an angle difference into `(-PI, PI]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2. * PI) - PI;

    if wrapped <= -PI {
        wrapped + 2. * PI
    } else {
        wrapped
    }
}

/// Angle equivalent to `angle` closest to `reference`.
pub fn unwrap_angle(reference: f64, angle: f64) -> f64 {
    reference + wrap_angle(angle - reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn test_polar_round_trip_is_screen_counter_clockwise() {
        let center = Point2::new(100., 100.);

        // Straight up on screen is a quarter turn counter-clockwise.
        let up = Point2::new(100., 40.);
        assert_abs_diff_eq!(polar_angle(center, up), PI / 2., epsilon = 1e-12);

        let p = point_at_polar(center, 60., PI / 2.);
        assert_abs_diff_eq!(p.x, up.x, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, up.y, epsilon = 1e-9);
    }

    #[test]
    fn test_wrap_and_unwrap() {
        assert_abs_diff_eq!(wrap_angle(3. * PI / 2.), -PI / 2., epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(unwrap_angle(3.0, -3.0), 2. * PI - 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rect_intersection_and_contains() {
        let frame = Rect::new(0, 0, 640, 480);
        let roi = Rect::new(-20, 400, 100, 200);

        assert_eq!(roi.intersect(&frame), Rect::new(0, 400, 80, 80));
        assert!(frame.contains(Point2::new(0., 0.)));
        assert!(!frame.contains(Point2::new(640., 10.)));
        assert_eq!(Rect::new(10, 10, 5, 5).intersect(&Rect::new(50, 50, 5, 5)).area(), 0);
    }

    #[test]
    fn test_rotated_box_contains_respects_rotation() {
        let rect = RotatedBox::new(Point2::new(0., 0.), 40., 10., 90.);

        assert!(rect.contains(Point2::new(0., 18.)));
        assert!(!rect.contains(Point2::new(18., 0.)));
    }

    #[test]
    fn test_normalized_puts_width_on_long_side() {
        let rect = RotatedBox::new(Point2::new(5., 5.), 10., 30., 15.).normalized();

        assert_eq!(rect.width, 30.);
        assert_eq!(rect.height, 10.);
        assert_abs_diff_eq!(rect.angle, 105.);
        assert_abs_diff_eq!(rect.aspect_ratio(), 3.);
    }

    #[test]
    fn test_axis_deviation_ignores_direction() {
        assert_abs_diff_eq!(axis_deviation(10., 190.), 0., epsilon = 1e-12);
        assert_abs_diff_eq!(axis_deviation(-80., 10.), 90., epsilon = 1e-12);
        assert_abs_diff_eq!(axis_deviation(170., -5.), 5., epsilon = 1e-12);

        // Straight down on screen is a quarter turn clockwise.
        assert_abs_diff_eq!(image_angle(Vector2::new(0., 3.)), 90., epsilon = 1e-12);

        let upright = RotatedBox::new(Point2::new(0., 0.), 10., 30., 0.);
        assert_abs_diff_eq!(axis_deviation(upright.long_axis(), 90.), 0., epsilon = 1e-12);
    }

    #[test]
    fn test_rotated_about_moves_center_along_circle() {
        let pivot = Point2::new(100., 100.);
        let rect = RotatedBox::new(Point2::new(160., 100.), 40., 20., 90.);

        let turned = rect.rotated_about(pivot, -PI / 2.);

        assert_abs_diff_eq!(turned.center.x, 100., epsilon = 1e-9);
        assert_abs_diff_eq!(turned.center.y, 160., epsilon = 1e-9);
        assert_abs_diff_eq!(turned.angle, 180., epsilon = 1e-9);
    }
}
