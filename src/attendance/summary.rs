use serde::Serialize;
use utoipa::ToSchema;

use crate::model::attendance::{AttendanceRecord, AttendanceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, ToSchema)]
pub struct AttendanceSummary {
    #[schema(example = 3)]
    pub total: usize,
    #[schema(example = 2)]
    pub present: usize,
    #[schema(example = 1)]
    pub half_day: usize,
    #[schema(example = 0)]
    pub absent: usize,
    #[schema(example = 22.5)]
    pub total_hours: f64,
    /// Average over the records that have hours; 0 when none do.
    #[schema(example = 7.5)]
    pub average_hours: f64,
}

pub fn summarize(records: &[AttendanceRecord]) -> AttendanceSummary {
    let count = |status: AttendanceStatus| records.iter().filter(|r| r.status == Some(status)).count();

    let with_hours: Vec<f64> = records.iter().filter_map(|r| r.total_hours).collect();
    let total_hours: f64 = with_hours.iter().sum();
    let average_hours = if with_hours.is_empty() {
        0.0
    } else {
        total_hours / with_hours.len() as f64
    };

    AttendanceSummary {
        total: records.len(),
        present: count(AttendanceStatus::Present),
        half_day: count(AttendanceStatus::HalfDay),
        absent: count(AttendanceStatus::Absent),
        total_hours,
        average_hours,
    }
}
