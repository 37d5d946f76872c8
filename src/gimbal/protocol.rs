//! rotctld extended-response protocol.
//!
//! Requests are single lines starting with `+\`. Every reply is a run of
//! `Label: value` lines closed by `RPRT <code>`, where 0 means success:
//!
//! ```text
//! +\get_pos
//! get_pos:
//! Azimuth: 181.000000
//! Elevation: 12.000000
//! RPRT 0
//! ```

use std::fmt;

use super::error::GimbalError;

pub const STATUS_PREFIX: &str = "RPRT";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Request {
    GetInfo,
    DumpCaps,
    GetPos,
    SetPos { azimuth_deg: f64, elevation_deg: f64 },
    Stop,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::GetInfo => write!(f, "+\\get_info"),
            Request::DumpCaps => write!(f, "+\\dump_caps"),
            Request::GetPos => write!(f, "+\\get_pos"),
            Request::SetPos {
                azimuth_deg,
                elevation_deg,
            } => write!(f, "+\\set_pos {:.2} {:.2}", azimuth_deg, elevation_deg),
            Request::Stop => write!(f, "+\\stop"),
        }
    }
}

/// Status code if `line` is the reply terminator.
pub fn parse_status(line: &str) -> Option<Result<i32, GimbalError>> {
    let rest = line.trim().strip_prefix(STATUS_PREFIX)?;
    Some(
        rest.trim()
            .parse::<i32>()
            .map_err(|_| GimbalError::Malformed(format!("bad status line `{}`", line.trim()))),
    )
}

/// A complete reply with a zero status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub lines: Vec<String>,
}

impl Reply {
    /// Value after `label:` on the first line carrying that label.
    pub fn field(&self, label: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim() == label).then(|| value.trim())
        })
    }

    /// Leading number of a field; trailing units are ignored.
    pub fn number(&self, label: &str) -> Option<f64> {
        self.field(label)?.split_whitespace().next()?.parse().ok()
    }

    fn require(&self, label: &str) -> Result<f64, GimbalError> {
        self.number(label)
            .ok_or_else(|| GimbalError::Malformed(format!("missing `{}`", label)))
    }
}

/// Travel limits reported by `dump_caps`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capabilities {
    pub azimuth: (f64, f64),
    /// Absent for azimuth-only rotators.
    pub elevation: Option<(f64, f64)>,
}

impl Capabilities {
    pub fn from_reply(reply: &Reply) -> Result<Self, GimbalError> {
        let azimuth = (reply.require("Min Azimuth")?, reply.require("Max Azimuth")?);
        let elevation = match reply.number("Max Elevation") {
            Some(max) if max != 0.0 => Some((reply.number("Min Elevation").unwrap_or(0.0), max)),
            _ => None,
        };
        Ok(Self { azimuth, elevation })
    }
}

/// Measured position from `get_pos`. Elevation is absent on azimuth-only rotators.
pub fn parse_position(reply: &Reply) -> Result<(f64, Option<f64>), GimbalError> {
    Ok((reply.require("Azimuth")?, reply.number("Elevation")))
}
