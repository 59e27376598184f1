use std::path::Path;

use chrono::NaiveTime;
use thiserror::Error;
use tracing::info;

use crate::model::period::Period;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("failed to read schedule file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse schedule: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate period id {0}")]
    DuplicateId(u32),
    #[error("period {0} must start before it ends")]
    EmptyWindow(u32),
    #[error("period {0} has a non-positive radius")]
    InvalidRadius(u32),
    #[error("period {0} has an invalid location")]
    InvalidLocation(u32),
    #[error("periods {0} and {1} overlap")]
    Overlap(u32, u32),
}

/// The day's periods, ordered by start time and guaranteed not to overlap.
#[derive(Debug, Clone, Default)]
pub struct PeriodSchedule {
    periods: Vec<Period>,
}

impl PeriodSchedule {
    pub fn new(mut periods: Vec<Period>) -> Result<Self, ScheduleError> {
        periods.sort_by_key(|p| p.start);

        for (i, p) in periods.iter().enumerate() {
            if periods[..i].iter().any(|other| other.id == p.id) {
                return Err(ScheduleError::DuplicateId(p.id));
            }
            if p.start >= p.end {
                return Err(ScheduleError::EmptyWindow(p.id));
            }
            if p.radius_m.is_nan() || p.radius_m <= 0.0 {
                return Err(ScheduleError::InvalidRadius(p.id));
            }
            if !p.location.is_valid() {
                return Err(ScheduleError::InvalidLocation(p.id));
            }
        }

        // Windows are inclusive at both ends, so touching bounds overlap.
        for pair in periods.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(ScheduleError::Overlap(pair[0].id, pair[1].id));
            }
        }

        Ok(Self { periods })
    }

    pub fn from_json(raw: &str) -> Result<Self, ScheduleError> {
        Self::new(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScheduleError> {
        let path = path.as_ref();
        let schedule = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!(path = %path.display(), periods = schedule.periods.len(), "Period schedule loaded");
        Ok(schedule)
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn get(&self, id: u32) -> Option<&Period> {
        self.periods.iter().find(|p| p.id == id)
    }

    /// The period whose window contains `now`, if any.
    pub fn current_period(&self, now: NaiveTime) -> Option<&Period> {
        self.periods.iter().find(|p| p.contains(now))
    }

    /// The earliest period starting strictly after `now`.
    pub fn next_period(&self, now: NaiveTime) -> Option<&Period> {
        self.periods.iter().find(|p| p.start > now)
    }
}
