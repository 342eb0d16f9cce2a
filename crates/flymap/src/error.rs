use std::path::PathBuf;

use thiserror::Error;

/// Failures of the one-shot device position request. None of them is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("location access was denied, allow it in your settings or enter a place instead")]
    PermissionDenied,
    #[error("your position is currently unavailable")]
    PositionUnavailable,
    #[error("locating your position took too long")]
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    #[error("enter a place to search for")]
    EmptyQuery,
    #[error("no place found for '{0}'")]
    NotFound(String),
    /// Transport, status or decoding failure. The detail is kept for logging only.
    #[error("place lookup failed, try again later")]
    Service(String),
}

impl From<reqwest::Error> for GeocodeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Service(err.to_string())
    }
}

/// Anything the location resolver can end up reporting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error(transparent)]
    Sensor(#[from] SensorError),
    #[error(transparent)]
    Geocode(#[from] GeocodeError),
}

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("no landing site endpoint configured")]
    NotConfigured,
    #[error("landing site request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("landing site endpoint answered with status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("map could not be initialised: {0}")]
    Init(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Geocode(#[from] GeocodeError),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
    #[error("failed to read events '{}': {source}", path.display())]
    Events {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid events file '{}': {source}", path.display())]
    EventsFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
}
