use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::geo::GeoPoint;
use crate::utils::time_format;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Period {
    #[schema(example = 1)]
    pub id: u32,

    #[schema(example = "Period 1")]
    pub name: String,

    #[serde(with = "time_format")]
    #[schema(example = "08:00", value_type = String)]
    pub start: NaiveTime,

    #[serde(with = "time_format")]
    #[schema(example = "08:50", value_type = String)]
    pub end: NaiveTime,

    pub location: GeoPoint,

    #[schema(example = "Main Building")]
    pub location_name: String,

    /// Acceptance radius in meters.
    #[schema(example = 100.0)]
    pub radius_m: f64,
}

impl Period {
    /// Both window bounds are inclusive.
    pub fn contains(&self, now: NaiveTime) -> bool {
        self.start <= now && now <= self.end
    }
}
