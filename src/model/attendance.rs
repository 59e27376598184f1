use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::model::geo::GeoPoint;
use crate::utils::time_format;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    HalfDay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PeriodMark {
    #[schema(example = 3)]
    pub period_id: u32,

    #[serde(with = "time_format")]
    #[schema(example = "10:05", value_type = String)]
    pub marked_at: NaiveTime,

    /// Always true; absence is the lack of a mark.
    pub present: bool,

    #[schema(nullable = true)]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "0f5e3a9c-2b7d-4c43-9a53-61f3f1d1b0aa",
    "user_id": 2,
    "user_name": "John Employee",
    "date": "2025-05-04",
    "clock_in_time": "08:30",
    "clock_out_time": "17:15",
    "total_hours": 8.75,
    "status": "present",
    "clock_in_location": {"latitude": 23.8103, "longitude": 90.4125},
    "clock_out_location": {"latitude": 23.8103, "longitude": 90.4125},
    "period_marks": []
}))]
pub struct AttendanceRecord {
    pub id: String,
    pub user_id: u64,
    pub user_name: String,

    #[schema(example = "2025-05-04", value_type = String)]
    pub date: NaiveDate,

    #[serde(with = "time_format::option")]
    #[schema(example = "08:30", value_type = Option<String>, nullable = true)]
    pub clock_in_time: Option<NaiveTime>,

    #[serde(with = "time_format::option")]
    #[schema(example = "17:15", value_type = Option<String>, nullable = true)]
    pub clock_out_time: Option<NaiveTime>,

    #[schema(example = 8.75, nullable = true)]
    pub total_hours: Option<f64>,

    #[schema(nullable = true)]
    pub status: Option<AttendanceStatus>,

    #[schema(nullable = true)]
    pub clock_in_location: Option<GeoPoint>,

    #[schema(nullable = true)]
    pub clock_out_location: Option<GeoPoint>,

    pub period_marks: Vec<PeriodMark>,
}

impl AttendanceRecord {
    /// Empty in-memory skeleton for a day that has no stored record yet.
    pub fn skeleton(user_id: u64, user_name: &str, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            user_name: user_name.to_string(),
            date,
            clock_in_time: None,
            clock_out_time: None,
            total_hours: None,
            status: None,
            clock_in_location: None,
            clock_out_location: None,
            period_marks: Vec::new(),
        }
    }

    pub fn mark_for(&self, period_id: u32) -> Option<&PeriodMark> {
        self.period_marks.iter().find(|m| m.period_id == period_id)
    }

    pub fn is_clocked_in(&self) -> bool {
        self.clock_in_time.is_some() && self.clock_out_time.is_none()
    }
}
