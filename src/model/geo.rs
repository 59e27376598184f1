use derive_more::Display;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema, Display)]
#[display(fmt = "({:.6}, {:.6})", latitude, longitude)]
pub struct GeoPoint {
    #[schema(example = 23.8103)]
    pub latitude: f64,
    #[schema(example = 90.4125)]
    pub longitude: f64,
}

impl GeoPoint {
    /// Builds a point from untrusted input, rejecting out-of-range or non-finite values.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let point = Self {
            latitude,
            longitude,
        };
        point.is_valid().then_some(point)
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}
