use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;

use crate::attendance::location::{FallbackMode, LocationPolicy, LocationSettings};
use crate::model::geo::GeoPoint;

#[derive(Clone)]
pub struct Config {
    pub server_addr: String,
    /// When unset, records are kept in memory.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub api_prefix: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    pub periods_file: Option<String>,
    pub seed_demo_data: bool,

    // Location
    pub location_timeout: Duration,
    pub location_fallback: FallbackMode,
    pub default_location: GeoPoint,

    pub session_idle: Duration,
    pub log_dir: String,
}

fn var_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|e| anyhow!("{key}={raw:?} is invalid: {e}"))
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let latitude: f64 = var_or("DEFAULT_LATITUDE", "23.8103")?;
        let longitude: f64 = var_or("DEFAULT_LONGITUDE", "90.4125")?;
        let default_location = GeoPoint::new(latitude, longitude)
            .ok_or_else(|| anyhow!("DEFAULT_LATITUDE/DEFAULT_LONGITUDE out of range"))?;

        Ok(Self {
            server_addr: var_or("SERVER_ADDR", "127.0.0.1:8080")?,
            database_url: optional_var("DATABASE_URL"),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            api_prefix: var_or("API_PREFIX", "/api")?,

            rate_protected_per_min: var_or("RATE_PROTECTED_PER_MIN", "1000")?,

            periods_file: optional_var("PERIODS_FILE"),
            seed_demo_data: var_or("SEED_DEMO_DATA", "false")?,

            location_timeout: Duration::from_secs(var_or("LOCATION_TIMEOUT_SECS", "5")?), // default 5 s
            location_fallback: var_or("LOCATION_FALLBACK", "default")?,
            default_location,

            session_idle: Duration::from_secs(var_or("SESSION_IDLE_SECS", "1800")?), // default 30 min
            log_dir: var_or("LOG_DIR", "logs")?,
        })
    }

    pub fn location_settings(&self) -> LocationSettings {
        LocationSettings {
            timeout: self.location_timeout,
            policy: match self.location_fallback {
                FallbackMode::Default => LocationPolicy::FallbackToDefault(self.default_location),
                FallbackMode::Fail => LocationPolicy::Fail,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(fallback: FallbackMode) -> Config {
        Config {
            server_addr: "127.0.0.1:0".into(),
            database_url: None,
            jwt_secret: "secret".into(),
            api_prefix: "/api".into(),
            rate_protected_per_min: 1000,
            periods_file: None,
            seed_demo_data: false,
            location_timeout: Duration::from_secs(5),
            location_fallback: fallback,
            default_location: GeoPoint::new(1.0, 2.0).unwrap(),
            session_idle: Duration::from_secs(60),
            log_dir: "logs".into(),
        }
    }

    #[test]
    fn fallback_mode_selects_policy() {
        let settings = config(FallbackMode::Default).location_settings();
        assert_eq!(settings.policy, LocationPolicy::FallbackToDefault(GeoPoint::new(1.0, 2.0).unwrap()));
        assert_eq!(settings.timeout, Duration::from_secs(5));

        assert_eq!(config(FallbackMode::Fail).location_settings().policy, LocationPolicy::Fail);
    }

    #[test]
    fn defaults_apply_for_unset_keys() {
        let timeout: u64 = var_or("ATTENDANCE_TEST_UNSET_KEY", "5").unwrap();
        assert_eq!(timeout, 5);
        assert!(var_or::<u64>("ATTENDANCE_TEST_UNSET_KEY", "five").is_err());
    }
}
