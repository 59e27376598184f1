use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::model::geo::GeoPoint;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("no position reported")]
    NotReported,
    #[error("coordinates out of range: {0}, {1}")]
    OutOfRange(f64, f64),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait LocationSensor: Send + Sync {
    async fn current_location(&self) -> Result<GeoPoint, LocationError>;
}

/// Coordinates sent by the client along with the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportedLocation {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl ReportedLocation {
    pub fn new(latitude: Option<f64>, longitude: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[async_trait]
impl LocationSensor for ReportedLocation {
    async fn current_location(&self) -> Result<GeoPoint, LocationError> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => GeoPoint::new(lat, lng).ok_or(LocationError::OutOfRange(lat, lng)),
            _ => Err(LocationError::NotReported),
        }
    }
}

/// What to do when the sensor fails or times out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationPolicy {
    FallbackToDefault(GeoPoint),
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationSettings {
    pub timeout: Duration,
    pub policy: LocationPolicy,
}

/// Parses the `LOCATION_FALLBACK` setting; the default point is supplied separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    Default,
    Fail,
}

impl FromStr for FallbackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown location fallback '{other}', expected 'default' or 'fail'")),
        }
    }
}

impl LocationSettings {
    /// Reads the sensor within the timeout, applying the fallback policy on failure.
    pub async fn locate(&self, sensor: &dyn LocationSensor) -> Result<GeoPoint, LocationError> {
        let outcome = match tokio::time::timeout(self.timeout, sensor.current_location()).await {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout(self.timeout)),
        };

        match (outcome, self.policy) {
            (Ok(point), _) => Ok(point),
            (Err(e), LocationPolicy::FallbackToDefault(default)) => {
                warn!(error = %e, fallback = %default, "Location unavailable, using default location");
                Ok(default)
            }
            (Err(e), LocationPolicy::Fail) => Err(e),
        }
    }
}
