use std::fmt::Display;

use geo::{Coord, HaversineDistance, Point, Rect};
use point_index::Located;
use serde::{Deserialize, Serialize};

/// Builds a point from latitude/longitude. Points store `x` = lon, `y` = lat.
pub fn lat_lon(lat: f64, lon: f64) -> Point {
    Point::new(lon, lat)
}

/// Great-circle distance in meters.
pub fn distance_m(a: &Point, b: &Point) -> f64 {
    a.haversine_distance(b)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event record as handed in by the host. Read-only for the map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    pub id: EventId,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub title: String,
    pub description: String,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub image_url: Option<String>,
    pub event_type: Option<String>,
    pub owner: Option<String>,
}

impl Event {
    /// Position of the event if both coordinates parse to finite, non-zero numbers.
    pub fn position(&self) -> Option<Point> {
        let lat = parse_coordinate(self.lat.as_deref())?;
        let lon = parse_coordinate(self.lon.as_deref())?;
        Some(lat_lon(lat, lon))
    }

    pub fn is_mappable(&self) -> bool {
        self.position().is_some()
    }

    /// `None` or an empty tag matches every event.
    pub fn matches_category(&self, category: Option<&str>) -> bool {
        match category {
            None | Some("") => true,
            Some(category) => self.event_type.as_deref() == Some(category),
        }
    }
}

fn parse_coordinate(raw: Option<&str>) -> Option<f64> {
    let value: f64 = raw?.trim().parse().ok()?;
    (value.is_finite() && value != 0.0).then_some(value)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocationSource {
    Device,
    Custom,
}

impl Display for LocationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Device => "device",
                Self::Custom => "custom",
            }
        )
    }
}

/// The single point radius and opacity calculations are made from.
#[derive(Clone, Debug, PartialEq)]
pub enum ReferenceLocation {
    Device { position: Point },
    Custom { position: Point, label: String },
}

impl ReferenceLocation {
    pub fn position(&self) -> Point {
        match self {
            Self::Device { position } | Self::Custom { position, .. } => *position,
        }
    }

    pub fn source(&self) -> LocationSource {
        match self {
            Self::Device { .. } => LocationSource::Device,
            Self::Custom { .. } => LocationSource::Custom,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Viewport {
    pub center: Point,
    pub zoom: u8,
    /// Visible extent as reported by the surface. Never set directly.
    pub bounds: Rect,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandingSite {
    pub icao_code: String,
    #[serde(default)]
    pub iata_code: Option<String>,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub site_type: String,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl LandingSite {
    pub fn position(&self) -> Point {
        lat_lon(self.lat, self.lon)
    }
}

impl Located for LandingSite {
    fn location(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}
