//! Working window management.
//!
//! The ROI follows the rotation center while the target is tracked, widens
//! with every consecutive miss and falls back to the full frame once the
//! miss threshold is exceeded.

use nalgebra::{Point2, Vector2};

use crate::{
    config::RoiParams,
    geometry::{FrameSize, Rect},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub rect: Rect,
    /// Maps ROI-local coordinates back into the frame.
    pub offset: Vector2<i32>,
}

impl Roi {
    pub fn new(rect: Rect) -> Self {
        Roi {
            rect,
            offset: Vector2::new(rect.x, rect.y),
        }
    }

    pub fn full(size: FrameSize) -> Self {
        Roi::new(size.full_rect())
    }

    pub fn area(&self) -> i64 {
        self.rect.area()
    }

    pub fn offset_f64(&self) -> Vector2<f64> {
        self.offset.cast::<f64>()
    }
}

/// Where the target was when it was last detected.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LastSeen {
    /// Rotation center when known, otherwise the armor center.
    anchor: Point2<f64>,
    /// Armor-to-center distance in pixels, 0 when unknown.
    radius: f64,
}

#[derive(Debug, Clone)]
pub struct RoiManager {
    params: RoiParams,
    roi: Option<Roi>,
    last_seen: Option<LastSeen>,
}

impl RoiManager {
    pub fn new(params: RoiParams) -> Self {
        RoiManager {
            params,
            roi: None,
            last_seen: None,
        }
    }

    /// ROI chosen by the latest [`RoiManager::update`].
    pub fn roi(&self) -> Option<&Roi> {
        self.roi.as_ref()
    }

    pub fn record_target(&mut self, anchor: Point2<f64>, radius: f64) {
        self.last_seen = Some(LastSeen { anchor, radius });
    }

    /// Drops the tracking anchor; the next update scans the full frame.
    pub fn forget(&mut self) {
        self.last_seen = None;
    }

    fn nominal_half_size(&self, radius: f64) -> f64 {
        (radius * self.params.margin).max(self.params.min_half_size)
    }

    /// Chooses this frame's ROI from the last sighting and the current
    /// consecutive miss count.
    pub fn update(&mut self, size: FrameSize, misses: u32) -> Roi {
        let full = size.full_rect();

        let rect = match self.last_seen {
            Some(seen) if misses <= self.params.miss_threshold => {
                let growth = 1. + self.params.growth_step * misses as f64;
                let half = self.nominal_half_size(seen.radius) * growth;
                let rect = Rect::around(seen.anchor, half, half).intersect(&full);

                if rect.is_empty() {
                    full
                } else {
                    rect
                }
            }
            _ => full,
        };

        let roi = Roi::new(rect);
        self.roi = Some(roi);
        roi
    }
}
