use serde::Serialize;
use strum_macros::Display;

use super::axis::{fit_azimuth, AxisState, DEFAULT_DEADBAND_DEG};
use super::error::GimbalError;
use super::link::RotatorLink;
use super::protocol::{parse_position, Capabilities, Request};
use super::upover::{decide_upover, UpOver, DEFAULT_UPOVER_EPSILON_DEG};
use crate::session::TargetView;

pub const SMALL_AZ_STEP_DEG: f64 = 5.0;
pub const LARGE_AZ_STEP_DEG: f64 = 20.0;
pub const SMALL_EL_STEP_DEG: f64 = 5.0;
pub const LARGE_EL_STEP_DEG: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum TrackingMode {
    Manual,
    #[strum(to_string = "Auto")]
    AutoTrack,
}

/// Why auto-track is not following the selected body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum NoTargetReason {
    #[strum(to_string = "No satellite")]
    NoSatellite,
    #[strum(to_string = "No El axis")]
    NoElevationAxis,
    #[strum(to_string = "Clock not UTC")]
    ClockNotUtc,
    #[strum(to_string = "No Rise")]
    NoRise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Azimuth,
    Elevation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSize {
    Small,
    Large,
}

/// Operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GimbalCommand {
    Step {
        axis: Axis,
        size: StepSize,
        positive: bool,
    },
    ToggleAuto,
    ToggleStop,
    /// Manual mode, azimuth to its minimum and elevation to the horizon.
    Park,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub deadband_deg: f64,
    pub upover_epsilon_deg: f64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            deadband_deg: DEFAULT_DEADBAND_DEG,
            upover_epsilon_deg: DEFAULT_UPOVER_EPSILON_DEG,
        }
    }
}

/// Everything a tick needs from outside the controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickInput {
    pub target: Option<TargetView>,
    /// A fresh pass search completed since the previous tick.
    pub new_pass: bool,
    pub clock_valid: bool,
    /// Great-circle bearing to the DX location, for azimuth-only pointing.
    pub dx_bearing_deg: Option<f64>,
}

/// Snapshot for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GimbalState {
    pub visible: bool,
    pub has_elevation_axis: bool,
    pub is_auto_tracking: bool,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub link: LinkState,
    pub user_stopped: bool,
    pub upside_down: bool,
    pub azimuth: AxisState,
    pub elevation: AxisState,
    pub no_target: Option<NoTargetReason>,
}

pub struct GimbalController<L: RotatorLink> {
    link: L,
    settings: ControllerSettings,
    state: LinkState,
    mode: TrackingMode,
    user_stopped: bool,
    upside_down: bool,
    upover_pending: bool,
    az: AxisState,
    el: AxisState,
    last_sent: Option<(i64, i64)>,
    no_target: Option<NoTargetReason>,
}

impl<L: RotatorLink> GimbalController<L> {
    /// Starts disconnected, in manual mode and stopped.
    pub fn new(link: L, settings: ControllerSettings) -> Self {
        Self {
            link,
            settings,
            state: LinkState::Disconnected,
            mode: TrackingMode::Manual,
            user_stopped: true,
            upside_down: false,
            upover_pending: false,
            az: AxisState::new(0.0, 360.0),
            el: AxisState::absent(),
            last_sent: None,
            no_target: None,
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.state
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn is_user_stopped(&self) -> bool {
        self.user_stopped
    }

    pub fn is_upside_down(&self) -> bool {
        self.upside_down
    }

    pub fn no_target(&self) -> Option<NoTargetReason> {
        self.no_target
    }

    pub fn azimuth(&self) -> &AxisState {
        &self.az
    }

    pub fn elevation(&self) -> &AxisState {
        &self.el
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn set_auto(&mut self, auto: bool) {
        if auto {
            self.mode = TrackingMode::AutoTrack;
            self.upover_pending = true;
        } else {
            self.mode = TrackingMode::Manual;
            self.upside_down = false;
            self.upover_pending = false;
            self.no_target = None;
        }
    }

    pub fn state(&self) -> GimbalState {
        GimbalState {
            visible: self.state == LinkState::Ready,
            has_elevation_axis: self.el.is_present(),
            is_auto_tracking: self.mode == TrackingMode::AutoTrack,
            azimuth_deg: self.az.measured,
            elevation_deg: self.el.measured,
            link: self.state,
            user_stopped: self.user_stopped,
            upside_down: self.upside_down,
            azimuth: self.az,
            elevation: self.el,
            no_target: self.no_target,
        }
    }

    /// One control cycle: connect if needed, otherwise
    /// query, infer, compute target, then send if changed.
    pub async fn tick(&mut self, input: &TickInput) -> Result<(), GimbalError> {
        if self.state != LinkState::Ready || !self.link.is_connected() {
            return self.connect().await;
        }

        let reply = match self.link.transact(Request::GetPos).await {
            Ok(reply) => reply,
            Err(e) => return self.fail(e),
        };
        let (az, el) = match parse_position(&reply) {
            Ok(position) => position,
            Err(e) => return self.fail(e),
        };
        self.az.update(az, self.settings.deadband_deg);
        if let Some(el) = el {
            self.el.update(el, self.settings.deadband_deg);
        }

        self.update_upover(input);

        if self.mode == TrackingMode::AutoTrack {
            self.track(input).await?;
        }

        self.send_if_changed().await
    }

    pub async fn command(&mut self, command: GimbalCommand) -> Result<(), GimbalError> {
        if self.state != LinkState::Ready {
            return Err(GimbalError::NotConnected);
        }

        match command {
            GimbalCommand::Step {
                axis,
                size,
                positive,
            } => {
                if self.mode == TrackingMode::AutoTrack && !self.user_stopped {
                    self.set_auto(false);
                }
                let (axis, step) = match (axis, size) {
                    (Axis::Azimuth, StepSize::Small) => (&mut self.az, SMALL_AZ_STEP_DEG),
                    (Axis::Azimuth, StepSize::Large) => (&mut self.az, LARGE_AZ_STEP_DEG),
                    (Axis::Elevation, StepSize::Small) => (&mut self.el, SMALL_EL_STEP_DEG),
                    (Axis::Elevation, StepSize::Large) => (&mut self.el, LARGE_EL_STEP_DEG),
                };
                axis.step_target(if positive { step } else { -step });
                self.send_if_changed().await
            }
            GimbalCommand::ToggleAuto => {
                self.set_auto(self.mode == TrackingMode::Manual);
                log::info!("Gimbal mode {}", self.mode);
                Ok(())
            }
            GimbalCommand::ToggleStop => {
                if self.user_stopped {
                    self.user_stopped = false;
                    log::info!("Gimbal released");
                    if self.mode == TrackingMode::AutoTrack {
                        return self.send_target().await;
                    }
                    Ok(())
                } else {
                    self.stop().await
                }
            }
            GimbalCommand::Park => {
                self.set_auto(false);
                self.az.set_target(self.az.min);
                self.el.set_target(0.0);
                self.send_if_changed().await
            }
        }
    }

    /// Clear the user stop once the link is ready. Returns false while the
    /// rotator is still unreachable so the caller can try again next tick.
    pub async fn release(&mut self) -> Result<bool, GimbalError> {
        if self.state != LinkState::Ready {
            return Ok(false);
        }
        if self.user_stopped {
            self.command(GimbalCommand::ToggleStop).await?;
        }
        Ok(true)
    }

    /// Halt both axes and hold further commands until released.
    pub async fn stop(&mut self) -> Result<(), GimbalError> {
        self.user_stopped = true;
        log::info!("Gimbal stopped");
        match self.link.transact(Request::Stop).await {
            Ok(_) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    async fn connect(&mut self) -> Result<(), GimbalError> {
        self.state = LinkState::Connecting;
        if let Err(e) = self.link.connect().await {
            log::warn!("Rotator connect failed: {}", e);
            self.state = LinkState::Disconnected;
            return Err(e);
        }
        if let Err(e) = self.discover().await {
            log::warn!("Rotator setup failed: {}", e);
            self.link.disconnect();
            self.state = LinkState::Disconnected;
            self.user_stopped = true;
            return Err(e);
        }
        self.state = LinkState::Ready;
        log::info!(
            "Rotator ready: az {:.0}..{:.0}, el {}",
            self.az.min,
            self.az.max,
            if self.el.is_present() {
                format!("{:.0}..{:.0}", self.el.min, self.el.max)
            } else {
                "absent".to_string()
            }
        );
        Ok(())
    }

    async fn discover(&mut self) -> Result<(), GimbalError> {
        match self.link.transact(Request::GetInfo).await {
            Ok(info) => log::debug!("Rotator info: {}", info.lines.join("; ")),
            Err(e @ GimbalError::Rejected { .. }) => log::debug!("{}", e),
            Err(e) => return Err(e),
        }

        let caps = Capabilities::from_reply(&self.link.transact(Request::DumpCaps).await?)?;
        self.az = AxisState::new(caps.azimuth.0, caps.azimuth.1);
        self.el = match caps.elevation {
            Some((min, max)) => AxisState::new(min, max),
            None => AxisState::absent(),
        };

        let (az, el) = parse_position(&self.link.transact(Request::GetPos).await?)?;
        self.az.reset_to(az);
        self.el.reset_to(el.unwrap_or(0.0));
        self.last_sent = Some(self.rounded_target());
        Ok(())
    }

    fn update_upover(&mut self, input: &TickInput) {
        if input.new_pass {
            self.upover_pending = true;
        }
        if !self.upover_pending {
            return;
        }
        let decision = match (&input.target, self.el.is_present()) {
            (Some(view), true) => decide_upover(
                view,
                self.el.max,
                self.az.min,
                self.settings.upover_epsilon_deg,
            ),
            _ => UpOver::Normal,
        };
        self.upover_pending = decision == UpOver::Pending;
        if !self.upover_pending {
            let upside_down = decision == UpOver::UpsideDown;
            if upside_down != self.upside_down {
                log::info!("Upside-down tracking {}", if upside_down { "on" } else { "off" });
            }
            self.upside_down = upside_down;
        }
    }

    async fn track(&mut self, input: &TickInput) -> Result<(), GimbalError> {
        let view = match input.target {
            None => Err(NoTargetReason::NoSatellite),
            Some(_) if !self.el.is_present() => Err(NoTargetReason::NoElevationAxis),
            Some(_) if !input.clock_valid => Err(NoTargetReason::ClockNotUtc),
            Some(view) => Ok(view),
        };

        let view = match view {
            Ok(view) => view,
            Err(reason) => {
                self.no_target = Some(reason);
                if let Some(bearing) = input.dx_bearing_deg {
                    self.az.target = fit_azimuth(bearing, self.az.min, self.az.max);
                }
                return Ok(());
            }
        };

        let (az, el) = if view.is_up() {
            (view.azimuth_deg, view.elevation_deg)
        } else {
            match view.rise_azimuth_deg {
                Some(rise_az) if view.ever_rises => (rise_az, 0.0),
                _ => {
                    if self.no_target != Some(NoTargetReason::NoRise) {
                        log::info!("No rise predicted, stopping gimbal");
                    }
                    self.no_target = Some(NoTargetReason::NoRise);
                    return if self.user_stopped { Ok(()) } else { self.stop().await };
                }
            }
        };
        self.no_target = None;

        let (az, el) = if self.upside_down {
            (az + 180.0, 180.0 - el)
        } else {
            (az, el)
        };
        self.az.target = fit_azimuth(az.rem_euclid(360.0), self.az.min, self.az.max);
        self.el.set_target(el);
        Ok(())
    }

    fn rounded_target(&self) -> (i64, i64) {
        let el = if self.el.is_present() { self.el.target } else { 0.0 };
        (self.az.target.round() as i64, el.round() as i64)
    }

    async fn send_if_changed(&mut self) -> Result<(), GimbalError> {
        if self.user_stopped || self.last_sent == Some(self.rounded_target()) {
            return Ok(());
        }
        self.send_target().await
    }

    async fn send_target(&mut self) -> Result<(), GimbalError> {
        let rounded = self.rounded_target();
        let request = Request::SetPos {
            azimuth_deg: self.az.target,
            elevation_deg: if self.el.is_present() { self.el.target } else { 0.0 },
        };
        match self.link.transact(request).await {
            Ok(_) => {
                self.last_sent = Some(rounded);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    /// Rejections are only logged; anything else drops the connection.
    fn fail(&mut self, e: GimbalError) -> Result<(), GimbalError> {
        if !e.is_transport() {
            log::warn!("{}", e);
            return Ok(());
        }
        log::warn!("Rotator link lost: {}", e);
        self.link.disconnect();
        self.state = LinkState::Disconnected;
        Err(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gimbal::axis::MotionState;
    use crate::gimbal::protocol::Reply;

    struct FakeLink {
        connected: bool,
        position: (f64, Option<f64>),
        caps: &'static str,
        reject_set: Option<i32>,
        drop_next_query: bool,
        log: Vec<Request>,
    }

    impl FakeLink {
        fn new(caps: &'static str) -> Self {
            Self {
                connected: false,
                position: (123.0, Some(45.0)),
                caps,
                reject_set: None,
                drop_next_query: false,
                log: Vec::new(),
            }
        }

        fn set_positions(&self) -> Vec<(f64, f64)> {
            self.log
                .iter()
                .filter_map(|r| match r {
                    Request::SetPos {
                        azimuth_deg,
                        elevation_deg,
                    } => Some((*azimuth_deg, *elevation_deg)),
                    _ => None,
                })
                .collect()
        }

        fn stops(&self) -> usize {
            self.log.iter().filter(|r| **r == Request::Stop).count()
        }
    }

    fn lines(text: &str) -> Reply {
        Reply {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    impl RotatorLink for FakeLink {
        async fn connect(&mut self) -> Result<(), GimbalError> {
            self.connected = true;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }

        async fn transact(&mut self, request: Request) -> Result<Reply, GimbalError> {
            if !self.connected {
                return Err(GimbalError::NotConnected);
            }
            self.log.push(request);
            match request {
                Request::GetInfo => Ok(lines("Info: fake")),
                Request::DumpCaps => Ok(lines(self.caps)),
                Request::GetPos => {
                    if std::mem::take(&mut self.drop_next_query) {
                        self.connected = false;
                        return Err(GimbalError::Timeout);
                    }
                    let (az, el) = self.position;
                    let mut text = format!("Azimuth: {}", az);
                    if let Some(el) = el {
                        text.push_str(&format!("\nElevation: {}", el));
                    }
                    Ok(lines(&text))
                }
                Request::SetPos { .. } => match self.reject_set {
                    Some(code) => Err(GimbalError::Rejected {
                        command: request.to_string(),
                        code,
                    }),
                    None => Ok(Reply::default()),
                },
                Request::Stop => Ok(Reply::default()),
            }
        }
    }

    const CAPS_AZ_EL: &str = "Min Azimuth: 0\nMax Azimuth: 360\nMin Elevation: 0\nMax Elevation: 180";
    const CAPS_AZ_ONLY: &str = "Min Azimuth: 0\nMax Azimuth: 360\nMax Elevation: 0";

    async fn ready(caps: &'static str) -> GimbalController<FakeLink> {
        let mut g = GimbalController::new(FakeLink::new(caps), ControllerSettings::default());
        g.tick(&TickInput::default()).await.unwrap();
        assert_eq!(g.link_state(), LinkState::Ready);
        g
    }

    fn sat(az: f64, el: f64, rise: Option<f64>, set: Option<f64>) -> TargetView {
        TargetView {
            azimuth_deg: az,
            elevation_deg: el,
            min_elevation_deg: 0.0,
            rise_azimuth_deg: rise,
            set_azimuth_deg: set,
            ever_rises: true,
            is_moon: false,
        }
    }

    fn input(view: TargetView, new_pass: bool) -> TickInput {
        TickInput {
            target: Some(view),
            new_pass,
            clock_valid: true,
            dx_bearing_deg: Some(250.0),
        }
    }

    async fn auto_running(caps: &'static str) -> GimbalController<FakeLink> {
        let mut g = ready(caps).await;
        g.command(GimbalCommand::ToggleAuto).await.unwrap();
        g.command(GimbalCommand::ToggleStop).await.unwrap();
        g
    }

    #[tokio::test]
    async fn connect_holds_current_position() {
        let g = ready(CAPS_AZ_EL).await;
        assert_eq!(g.azimuth().target, 123.0);
        assert_eq!(g.elevation().target, 45.0);
        assert!(g.is_user_stopped());
        assert!(g.link().set_positions().is_empty());

        let state = g.state();
        assert!(state.visible && state.has_elevation_axis && !state.is_auto_tracking);
        assert_eq!(state.elevation.max, 180.0);
    }

    #[tokio::test]
    async fn unchanged_target_is_not_resent() {
        let mut g = ready(CAPS_AZ_EL).await;
        g.command(GimbalCommand::ToggleStop).await.unwrap();
        g.command(GimbalCommand::Step {
            axis: Axis::Azimuth,
            size: StepSize::Small,
            positive: true,
        })
        .await
        .unwrap();
        assert_eq!(g.link().set_positions(), vec![(125.0, 45.0)]);

        g.tick(&TickInput::default()).await.unwrap();
        g.tick(&TickInput::default()).await.unwrap();
        assert_eq!(g.link().set_positions().len(), 1);
    }

    #[tokio::test]
    async fn auto_track_sends_once_per_target_change() {
        let mut g = auto_running(CAPS_AZ_EL).await;
        let before = g.link().set_positions().len();

        let view = sat(100.0, 30.0, Some(80.0), Some(200.0));
        g.tick(&input(view, true)).await.unwrap();
        g.tick(&input(view, false)).await.unwrap();
        let sent = g.link().set_positions();
        assert_eq!(sent.len(), before + 1);
        assert_eq!(sent.last(), Some(&(100.0, 30.0)));
        assert_eq!(g.no_target(), None);
    }

    #[tokio::test]
    async fn motion_is_inferred_from_readings() {
        let mut g = ready(CAPS_AZ_EL).await;
        g.link.position = (130.0, Some(45.0));
        g.tick(&TickInput::default()).await.unwrap();
        assert_eq!(g.azimuth().motion, MotionState::RotatingPositive);
        assert_eq!(g.elevation().motion, MotionState::InPosition);

        g.link.position = (3.0, Some(45.0));
        g.tick(&TickInput::default()).await.unwrap();
        assert_eq!(g.azimuth().motion, MotionState::AtMinLimit);
    }

    #[tokio::test]
    async fn azimuth_only_rotator_points_at_dx() {
        let mut g = auto_running(CAPS_AZ_ONLY).await;
        assert!(!g.state().has_elevation_axis);
        assert_eq!(g.elevation().motion, MotionState::AxisAbsent);

        g.tick(&input(sat(100.0, 30.0, None, None), false)).await.unwrap();
        assert_eq!(g.no_target(), Some(NoTargetReason::NoElevationAxis));
        assert_eq!(g.link().set_positions().last(), Some(&(250.0, 0.0)));
    }

    #[tokio::test]
    async fn fallback_reasons() {
        let mut g = auto_running(CAPS_AZ_EL).await;
        g.tick(&TickInput {
            dx_bearing_deg: Some(10.0),
            clock_valid: true,
            ..TickInput::default()
        })
        .await
        .unwrap();
        assert_eq!(g.no_target(), Some(NoTargetReason::NoSatellite));
        assert_eq!(g.azimuth().target, 10.0);
        assert_eq!(g.elevation().target, 45.0);

        let mut tick = input(sat(100.0, 30.0, None, None), false);
        tick.clock_valid = false;
        g.tick(&tick).await.unwrap();
        assert_eq!(g.no_target(), Some(NoTargetReason::ClockNotUtc));
        assert_eq!(NoTargetReason::ClockNotUtc.to_string(), "Clock not UTC");
    }

    #[tokio::test]
    async fn parks_at_rise_azimuth_while_down() {
        let mut g = auto_running(CAPS_AZ_EL).await;
        g.tick(&input(sat(300.0, -20.0, Some(45.0), Some(100.0)), true))
            .await
            .unwrap();
        assert!(!g.is_upside_down());
        assert_eq!(g.link().set_positions().last(), Some(&(45.0, 0.0)));
    }

    #[tokio::test]
    async fn no_rise_stops_the_gimbal() {
        let mut g = auto_running(CAPS_AZ_EL).await;
        let mut view = sat(300.0, -20.0, None, None);
        view.ever_rises = false;
        g.tick(&input(view, true)).await.unwrap();
        assert_eq!(g.no_target(), Some(NoTargetReason::NoRise));
        assert!(g.is_user_stopped());
        assert_eq!(g.link().stops(), 1);

        g.tick(&input(view, false)).await.unwrap();
        assert_eq!(g.link().stops(), 1);
    }

    #[tokio::test]
    async fn wrapping_pass_is_flown_upside_down() {
        let mut g = auto_running(CAPS_AZ_EL).await;
        g.tick(&input(sat(350.0, 30.0, Some(300.0), Some(10.0)), true))
            .await
            .unwrap();
        assert!(g.is_upside_down());
        assert_eq!(g.link().set_positions().last(), Some(&(170.0, 150.0)));

        // Parked upside down while waiting for the next rise.
        g.tick(&input(sat(200.0, -10.0, Some(350.0), Some(10.0)), true))
            .await
            .unwrap();
        assert!(g.is_upside_down());
        assert_eq!(g.link().set_positions().last(), Some(&(170.0, 180.0)));
    }

    #[tokio::test]
    async fn moon_is_never_upside_down() {
        let mut g = auto_running(CAPS_AZ_EL).await;
        let mut moon = sat(350.0, 30.0, Some(300.0), Some(10.0));
        moon.is_moon = true;
        g.tick(&input(moon, true)).await.unwrap();
        assert!(!g.is_upside_down());
        assert_eq!(g.link().set_positions().last(), Some(&(350.0, 30.0)));
    }

    #[tokio::test]
    async fn decision_near_horizon_is_deferred() {
        let mut g = auto_running(CAPS_AZ_EL).await;
        g.tick(&input(sat(350.0, 0.1, Some(350.0), Some(10.0)), true))
            .await
            .unwrap();
        assert!(!g.is_upside_down());
        assert!(g.upover_pending);

        g.tick(&input(sat(352.0, 3.0, Some(350.0), Some(10.0)), false))
            .await
            .unwrap();
        assert!(!g.upover_pending);
        assert!(g.is_upside_down());
    }

    #[tokio::test]
    async fn manual_step_leaves_auto_track() {
        let mut g = auto_running(CAPS_AZ_EL).await;
        g.tick(&input(sat(350.0, 30.0, Some(300.0), Some(10.0)), true))
            .await
            .unwrap();
        assert!(g.is_upside_down());

        g.command(GimbalCommand::Step {
            axis: Axis::Elevation,
            size: StepSize::Large,
            positive: false,
        })
        .await
        .unwrap();
        assert_eq!(g.mode(), TrackingMode::Manual);
        assert!(!g.is_upside_down());
        assert_eq!(g.elevation().target, 140.0);
    }

    #[tokio::test]
    async fn unstopping_in_auto_reissues_target() {
        let mut g = auto_running(CAPS_AZ_EL).await;
        let sent = g.link().set_positions().len();
        assert_eq!(sent, 1);

        g.command(GimbalCommand::ToggleStop).await.unwrap();
        assert!(g.is_user_stopped());
        g.command(GimbalCommand::ToggleStop).await.unwrap();
        assert_eq!(g.link().set_positions().len(), sent + 1);
    }

    #[tokio::test]
    async fn release_after_connect_sends_auto_target() {
        let mut g = GimbalController::new(FakeLink::new(CAPS_AZ_EL), ControllerSettings::default());
        g.set_auto(true);
        assert!(!g.release().await.unwrap());

        let view = sat(100.0, 30.0, Some(80.0), Some(200.0));
        g.tick(&input(view, true)).await.unwrap();
        assert_eq!(g.link_state(), LinkState::Ready);
        assert!(g.release().await.unwrap());
        assert!(!g.is_user_stopped());

        g.tick(&input(view, false)).await.unwrap();
        assert_eq!(g.link().set_positions().last(), Some(&(100.0, 30.0)));

        // Already released: nothing more to do.
        let sent = g.link().set_positions().len();
        assert!(g.release().await.unwrap());
        assert_eq!(g.link().set_positions().len(), sent);
    }

    #[tokio::test]
    async fn stop_on_dead_link_reports_error() {
        let mut g = auto_running(CAPS_AZ_EL).await;
        g.link.connected = false;
        assert!(matches!(g.stop().await, Err(GimbalError::NotConnected)));
        assert!(g.is_user_stopped());
        assert_eq!(g.link_state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn park_goes_to_azimuth_minimum() {
        let mut g = auto_running(CAPS_AZ_EL).await;
        g.command(GimbalCommand::Park).await.unwrap();
        assert_eq!(g.mode(), TrackingMode::Manual);
        assert_eq!(g.link().set_positions().last(), Some(&(0.0, 0.0)));
    }

    #[tokio::test]
    async fn rejected_command_is_retried_next_tick() {
        let mut g = ready(CAPS_AZ_EL).await;
        g.command(GimbalCommand::ToggleStop).await.unwrap();
        g.link.reject_set = Some(-1);
        g.command(GimbalCommand::Step {
            axis: Axis::Azimuth,
            size: StepSize::Large,
            positive: true,
        })
        .await
        .unwrap();
        assert_eq!(g.link_state(), LinkState::Ready);

        g.link.reject_set = None;
        g.tick(&TickInput::default()).await.unwrap();
        assert_eq!(g.link().set_positions(), vec![(140.0, 45.0), (140.0, 45.0)]);
    }

    #[tokio::test]
    async fn lost_link_reconnects_on_next_tick() {
        let mut g = ready(CAPS_AZ_EL).await;
        g.link.drop_next_query = true;
        let err = g.tick(&TickInput::default()).await.unwrap_err();
        assert!(matches!(err, GimbalError::Timeout));
        assert_eq!(g.link_state(), LinkState::Disconnected);
        assert!(!g.state().visible);
        assert!(matches!(
            g.command(GimbalCommand::Park).await,
            Err(GimbalError::NotConnected)
        ));

        g.tick(&TickInput::default()).await.unwrap();
        assert_eq!(g.link_state(), LinkState::Ready);
    }
}
