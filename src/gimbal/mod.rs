mod axis;
mod controller;
mod error;
mod link;
mod protocol;
mod upover;

pub use axis::{fit_azimuth, infer_motion, AxisState, MotionState, DEFAULT_DEADBAND_DEG};
pub use controller::{
    Axis, ControllerSettings, GimbalCommand, GimbalController, GimbalState, LinkState,
    NoTargetReason, StepSize, TickInput, TrackingMode,
};
pub use error::GimbalError;
pub use link::{RotatorLink, RotctldLink};
pub use protocol::{Capabilities, Reply, Request};
pub use upover::{decide_upover, does_pass_cross_end_of_travel, UpOver, DEFAULT_UPOVER_EPSILON_DEG};
