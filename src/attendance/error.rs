use serde::Serialize;
use strum_macros::IntoStaticStr;
use thiserror::Error;

use crate::attendance::face::{CaptureError, ComparisonError, VerifyError};

/// An expected refusal. The record is left exactly as it was.
#[derive(Debug, Clone, PartialEq, Error, IntoStaticStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Decline {
    #[error("period {period_id} does not exist")]
    PeriodNotFound { period_id: u32 },

    #[error("period {period_id} is open {start}-{end}, it is now {now}")]
    OutsidePeriodWindow {
        period_id: u32,
        start: String,
        end: String,
        now: String,
    },

    #[error("you are {distance_m:.0} m from {location_name}, the limit is {radius_m:.0} m")]
    LocationMismatch {
        location_name: String,
        distance_m: f64,
        radius_m: f64,
    },

    #[error("attendance for period {period_id} is already marked today")]
    AlreadyMarked { period_id: u32 },

    #[error("no active clock-in for today")]
    NoActiveSession,

    #[error("already clocked out for today")]
    AlreadyClockedOut,

    #[error("clock-out time {clock_out} is earlier than clock-in time {clock_in}")]
    ClockOutBeforeClockIn { clock_in: String, clock_out: String },

    #[error("face not matched (similarity {score:.2})")]
    FaceNotMatched { score: f64 },

    #[error("no reference face is enrolled for this user")]
    FaceNotEnrolled,

    #[error("another attendance action is still in progress")]
    ActionInProgress,
}

impl Decline {
    pub fn reason(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error(transparent)]
    Declined(#[from] Decline),

    #[error("location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("face capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("face comparison failed: {0}")]
    Comparison(#[from] ComparisonError),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("record store failure: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<VerifyError> for AttendanceError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Capture(e) => Self::Capture(e),
            VerifyError::Comparison(e) => Self::Comparison(e),
        }
    }
}

impl AttendanceError {
    /// Sensor and store failures are worth a manual retry; declines are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LocationUnavailable(_) | Self::Capture(_) | Self::Comparison(_) | Self::Store(_)
        )
    }

    pub fn decline(&self) -> Option<&Decline> {
        match self {
            Self::Declined(d) => Some(d),
            _ => None,
        }
    }
}
