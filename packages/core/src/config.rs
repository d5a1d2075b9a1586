use std::env;
use std::path::PathBuf;

use crate::sources::{FlightTrackCredentials, RadarImageCredentials};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://harvest.db?mode=rwc";

/// Upper bound for a source's minimum polling interval (one week).
pub const MAX_INTERVAL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for a single request timeout.
pub const MAX_REQUEST_TIMEOUT_SECONDS: u64 = 10 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    FlightTrack,
    RadarImage,
}

impl SourceKind {
    pub fn parse(name: &str) -> Result<Self, String> {
        match name.trim() {
            "flight_track" => Ok(SourceKind::FlightTrack),
            "radar_image" => Ok(SourceKind::RadarImage),
            other => Err(format!("Unknown source: {}", other)),
        }
    }

    pub fn parse_list(list: &str) -> Result<Vec<Self>, String> {
        let kinds = list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect::<Result<Vec<_>, _>>()?;

        if kinds.is_empty() {
            return Err("At least one source must be enabled".to_string());
        }
        Ok(kinds)
    }
}

#[derive(Debug, Clone)]
pub struct FlightTrackConfig {
    pub credentials: FlightTrackCredentials,
    pub endpoints_path: PathBuf,
    pub min_interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RadarImageConfig {
    pub credentials: RadarImageCredentials,
    pub endpoints_path: PathBuf,
    pub min_interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub flight_track: Option<FlightTrackConfig>,
    pub radar_image: Option<RadarImageConfig>,
    pub tick_seconds: u64,
    pub request_timeout_seconds: u64,
    pub http_proxy: Option<String>,
    pub database_url: String,
    pub ops_addr: Option<String>,
}

/// Required variable: missing or blank is an error.
fn required(name: &str, source_label: &str) -> Result<String, String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(format!(
            "Cannot use {} without credentials: {} is required",
            source_label, name
        )),
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn number_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", name)),
        None => Ok(default),
    }
}

/// A count of seconds in `1..=max`. Negative, zero and oversized values are
/// configuration errors.
fn parse_seconds(name: &str, raw: Option<String>, default: u64, max: u64) -> Result<u64, String> {
    let seconds = match raw {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("{} must be a whole number of seconds", name))?,
        None => default,
    };

    if seconds == 0 || seconds > max {
        return Err(format!("{} must be between 1 and {} seconds", name, max));
    }
    Ok(seconds)
}

fn seconds_or(name: &str, default: u64, max: u64) -> Result<u64, String> {
    parse_seconds(name, optional(name), default, max)
}

/// Polling gate interval for `seconds`, or an error when it does not fit a
/// `chrono::Duration`.
pub fn gate_interval(source_label: &str, seconds: u64) -> Result<chrono::Duration, String> {
    i64::try_from(seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| format!("{} polling interval of {}s is out of range", source_label, seconds))
}

impl Config {
    /// Build the configuration from the process environment.
    ///
    /// Credentials are only required for sources listed in
    /// `HARVEST_SOURCES`; a listed source without them is a startup error.
    pub fn from_env() -> Result<Self, String> {
        let sources = SourceKind::parse_list(
            &optional("HARVEST_SOURCES").unwrap_or_else(|| "flight_track,radar_image".to_string()),
        )?;
        Self::from_env_for(&sources)
    }

    pub fn from_env_for(sources: &[SourceKind]) -> Result<Self, String> {
        let flight_track = if sources.contains(&SourceKind::FlightTrack) {
            Some(FlightTrackConfig {
                credentials: FlightTrackCredentials {
                    app_id: required("FS_APP_ID", "FlightStats data source")?,
                    app_key: required("FS_APP_KEY", "FlightStats data source")?,
                },
                endpoints_path: optional("FLIGHT_TRACK_ENDPOINTS")
                    .unwrap_or_else(|| "config/flight_track.json".to_string())
                    .into(),
                min_interval_seconds: seconds_or(
                    "FLIGHT_TRACK_INTERVAL_SECONDS",
                    crate::sources::flight_track::DEFAULT_MIN_INTERVAL_SECS as u64,
                    MAX_INTERVAL_SECONDS,
                )?,
            })
        } else {
            None
        };

        let radar_image = if sources.contains(&SourceKind::RadarImage) {
            Some(RadarImageConfig {
                credentials: RadarImageCredentials {
                    user: required("WZ_AUTH_USER", "WeatherZone Radar Image")?,
                    pass: required("WZ_AUTH_PASS", "WeatherZone Radar Image")?,
                },
                endpoints_path: optional("RADAR_IMAGE_ENDPOINTS")
                    .unwrap_or_else(|| "config/radar_image.json".to_string())
                    .into(),
                min_interval_seconds: seconds_or(
                    "RADAR_IMAGE_INTERVAL_SECONDS",
                    crate::sources::radar_image::DEFAULT_MIN_INTERVAL_SECS as u64,
                    MAX_INTERVAL_SECONDS,
                )?,
            })
        } else {
            None
        };

        let tick_seconds = number_or("HARVEST_TICK_SECONDS", 10u64)?;
        if tick_seconds == 0 {
            return Err("HARVEST_TICK_SECONDS must be greater than zero".to_string());
        }

        Ok(Self {
            flight_track,
            radar_image,
            tick_seconds,
            request_timeout_seconds: seconds_or(
                "REQUEST_TIMEOUT_SECONDS",
                30,
                MAX_REQUEST_TIMEOUT_SECONDS,
            )?,
            http_proxy: optional("HTTP_PROXY").or_else(|| optional("http_proxy")),
            database_url: optional("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            ops_addr: optional("OPS_ADDR"),
        })
    }
}
