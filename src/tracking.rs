//! Explicit tracking state machine and the consecutive miss counter.

/// Per-frame outcome that drives [`TrackPhase::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No valid target armor this frame.
    Missed,
    /// Target found but no usable prediction yet.
    Acquired,
    /// Target found and a prediction was emitted.
    Predicted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPhase {
    /// No motion history; warming up.
    Init,
    /// Center, direction and model available.
    Tracking,
    /// Target missing, prior state kept.
    Degraded,
    /// Target lost for too long; history was discarded.
    Reset,
}

impl Default for TrackPhase {
    fn default() -> Self {
        TrackPhase::Init
    }
}

impl TrackPhase {
    /// `lost` is true once the miss counter exceeded its threshold.
    pub fn next(self, outcome: FrameOutcome, lost: bool) -> TrackPhase {
        match outcome {
            FrameOutcome::Predicted => TrackPhase::Tracking,
            FrameOutcome::Acquired => match self {
                TrackPhase::Tracking | TrackPhase::Degraded => TrackPhase::Degraded,
                TrackPhase::Init | TrackPhase::Reset => TrackPhase::Init,
            },
            FrameOutcome::Missed if lost => TrackPhase::Reset,
            FrameOutcome::Missed => match self {
                TrackPhase::Tracking | TrackPhase::Degraded => TrackPhase::Degraded,
                TrackPhase::Init => TrackPhase::Init,
                TrackPhase::Reset => TrackPhase::Reset,
            },
        }
    }

    /// True on the frame where history has to be discarded.
    pub fn enters_reset(self, next: TrackPhase) -> bool {
        self != TrackPhase::Reset && next == TrackPhase::Reset
    }
}

/// Consecutive frames without a valid target armor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissCounter {
    count: u32,
    threshold: u32,
}

impl MissCounter {
    pub fn new(threshold: u32) -> Self {
        MissCounter {
            count: 0,
            threshold,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Counts a miss and reports whether the target is now considered lost.
    /// The count saturates one past the threshold.
    pub fn record_miss(&mut self) -> bool {
        if self.count <= self.threshold {
            self.count += 1;
        }
        self.is_lost()
    }

    pub fn record_hit(&mut self) {
        self.count = 0;
    }

    pub fn is_lost(&self) -> bool {
        self.count > self.threshold
    }
}
