use chrono::{DateTime, Utc};

use crate::predict::types::{PassState, PassStatus, RiseSetResult};

/// Where `now` falls relative to a search result. Pure; call it every time
/// the display or controller needs the state.
pub fn classify(rs: &RiseSetResult, now: DateTime<Utc>) -> PassStatus {
    if !rs.ever_rises_and_sets() {
        return no_pass();
    }

    match (rs.rise_time, rs.set_time) {
        (Some(rise), Some(set)) if rise < set => {
            if now < rise {
                status(PassState::PassAhead, Some(rise - now))
            } else if now < set {
                status(PassState::PassInProgress, Some(set - now))
            } else {
                status(PassState::JustEnded, Some(now - set))
            }
        }
        // Already up when the search ran; the rise belongs to the next pass.
        (_, Some(set)) => {
            if now < set {
                status(PassState::PassInProgress, Some(set - now))
            } else {
                status(PassState::JustEnded, Some(now - set))
            }
        }
        // Set lies beyond the search horizon.
        (Some(rise), None) => {
            if now < rise {
                status(PassState::PassAhead, Some(rise - now))
            } else {
                status(PassState::PassInProgress, None)
            }
        }
        (None, None) => no_pass(),
    }
}

fn status(state: PassState, transition: Option<chrono::Duration>) -> PassStatus {
    PassStatus { state, transition }
}

fn no_pass() -> PassStatus {
    status(PassState::NoPass, None)
}
