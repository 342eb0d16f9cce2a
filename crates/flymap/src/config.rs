use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use geo::Point;

use crate::{
    error::ConfigError,
    focus::FocusSettings,
    markers::MarkerStyle,
    types::lat_lon,
};

/// Countries the first geocoding attempt is restricted to.
pub const EUROPEAN_COUNTRIES: &[&str] = &[
    "de", "at", "ch", "fr", "it", "nl", "be", "lu", "dk", "pl", "cz", "es", "pt", "gb", "ie",
    "se", "no", "fi", "hu", "sk", "si", "hr",
];

/// Tunables of the map view. Every field has a default, so a config file only
/// needs the values it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// `[lat, lon]` shown before anything else is known.
    pub initial_center: [f64; 2],
    pub initial_zoom: u8,
    /// Lowest zoom used when re-centering on a new reference location.
    pub regional_zoom: u8,
    /// Zoom used when focusing a single event.
    pub detail_zoom: u8,
    pub settle_debounce_ms: u64,
    pub error_display_ms: u64,
    pub device_timeout_ms: u64,
    pub focus_retry_ms: u64,
    pub focus_max_attempts: u32,
    pub focus_open_delay_ms: u64,
    /// Fraction of the viewport span added on every side before filtering the overlay.
    pub overlay_padding: f64,
    pub dimmed_opacity: f32,
    /// Characters of an event description shown in its callout.
    pub description_limit: usize,
    pub geocoder: GeocoderConfig,
    pub sites_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub countries: Vec<String>,
    pub min_interval_ms: u64,
    pub timeout_ms: u64,
}

impl MapConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded config from '{}'", path.display());

        Ok(config)
    }

    pub fn initial_center(&self) -> Point {
        lat_lon(self.initial_center[0], self.initial_center[1])
    }

    pub fn marker_style(&self) -> MarkerStyle {
        MarkerStyle {
            dimmed_opacity: self.dimmed_opacity,
            description_limit: self.description_limit,
        }
    }

    pub fn focus_settings(&self) -> FocusSettings {
        FocusSettings {
            retry: self.focus_retry(),
            max_attempts: self.focus_max_attempts,
            open_delay: self.focus_open_delay(),
            detail_zoom: self.detail_zoom,
        }
    }

    pub fn settle_debounce(&self) -> Duration {
        Duration::from_millis(self.settle_debounce_ms)
    }

    pub fn error_display(&self) -> Duration {
        Duration::from_millis(self.error_display_ms)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    pub fn focus_retry(&self) -> Duration {
        Duration::from_millis(self.focus_retry_ms)
    }

    pub fn focus_open_delay(&self) -> Duration {
        Duration::from_millis(self.focus_open_delay_ms)
    }
}

impl GeocoderConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The country list in the comma separated form the search endpoint expects.
    pub fn country_codes(&self) -> String {
        self.countries.join(",")
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            initial_center: [51.1657, 10.4515],
            initial_zoom: 6,
            regional_zoom: 10,
            detail_zoom: 14,
            settle_debounce_ms: 300,
            error_display_ms: 3000,
            device_timeout_ms: 20_000,
            focus_retry_ms: 1000,
            focus_max_attempts: 3,
            focus_open_delay_ms: 600,
            overlay_padding: 0.1,
            dimmed_opacity: 0.35,
            description_limit: 120,
            geocoder: GeocoderConfig::default(),
            sites_url: None,
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("flymap/", env!("CARGO_PKG_VERSION")).to_string(),
            countries: EUROPEAN_COUNTRIES.iter().map(|c| c.to_string()).collect(),
            min_interval_ms: 1000,
            timeout_ms: 10_000,
        }
    }
}
