use serde::Serialize;
use strum_macros::Display;

pub const DEFAULT_DEADBAND_DEG: f64 = 5.0;

/// Smallest change between two readings counted as motion.
const MOTION_EPSILON_DEG: f64 = 0.5;
/// A stationary axis this close to its target is in position.
const IN_POSITION_DEG: f64 = 1.0;

/// What an axis appears to be doing, judged from consecutive readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum MotionState {
    Stopped,
    #[strum(to_string = "Rotating +")]
    RotatingPositive,
    #[strum(to_string = "Rotating -")]
    RotatingNegative,
    #[strum(to_string = "At min limit")]
    AtMinLimit,
    #[strum(to_string = "At max limit")]
    AtMaxLimit,
    #[strum(to_string = "In position")]
    InPosition,
    Unknown,
    #[strum(to_string = "No axis")]
    AxisAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisState {
    pub target: f64,
    pub measured: f64,
    pub previous: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub motion: MotionState,
}

impl AxisState {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            target: min,
            measured: min,
            previous: None,
            min,
            max,
            motion: MotionState::Unknown,
        }
    }

    pub fn absent() -> Self {
        Self {
            motion: MotionState::AxisAbsent,
            ..Self::new(0.0, 0.0)
        }
    }

    pub fn is_present(&self) -> bool {
        self.motion != MotionState::AxisAbsent
    }

    /// First reading after connecting: hold where the axis already is.
    pub fn reset_to(&mut self, measured: f64) {
        if !self.is_present() {
            return;
        }
        self.measured = measured;
        self.previous = None;
        self.target = measured;
        self.motion = MotionState::Unknown;
    }

    pub fn update(&mut self, measured: f64, deadband: f64) {
        if !self.is_present() {
            return;
        }
        self.previous = Some(self.measured);
        self.measured = measured;
        self.motion = infer_motion(measured, self.previous, self.target, self.min, self.max, deadband);
    }

    /// Move the target one step of `step` degrees (signed) to the next
    /// multiple of the step size, clamped to travel.
    pub fn step_target(&mut self, step: f64) {
        let size = step.abs();
        if size == 0.0 || !self.is_present() {
            return;
        }
        let n = self.target / size;
        let quantized = if step > 0.0 {
            (n.floor() + 1.0) * size
        } else {
            (n.ceil() - 1.0) * size
        };
        self.target = quantized.clamp(self.min, self.max);
    }

    pub fn set_target(&mut self, target: f64) {
        if self.is_present() {
            self.target = target.clamp(self.min, self.max);
        }
    }
}

pub fn infer_motion(
    measured: f64,
    previous: Option<f64>,
    target: f64,
    min: f64,
    max: f64,
    deadband: f64,
) -> MotionState {
    if measured < min + deadband {
        return MotionState::AtMinLimit;
    }
    if measured > max - deadband {
        return MotionState::AtMaxLimit;
    }
    let Some(previous) = previous else {
        return MotionState::Unknown;
    };
    let delta = measured - previous;
    if delta > MOTION_EPSILON_DEG {
        MotionState::RotatingPositive
    } else if delta < -MOTION_EPSILON_DEG {
        MotionState::RotatingNegative
    } else if (measured - target).abs() <= IN_POSITION_DEG {
        MotionState::InPosition
    } else {
        MotionState::Stopped
    }
}

/// Express `az` within `[min, max]` by whole turns. Outside a travel range
/// narrower than a full turn, the nearer limit is used.
pub fn fit_azimuth(az: f64, min: f64, max: f64) -> f64 {
    let a = min + (az - min).rem_euclid(360.0);
    if a <= max {
        return a;
    }
    if a - max < min + 360.0 - a {
        max
    } else {
        min
    }
}
