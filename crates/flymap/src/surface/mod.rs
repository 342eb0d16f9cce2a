//! The contract between the map controller and whatever draws the map.
//!
//! A surface turns geographic coordinates into pixels, owns the camera and the
//! drawn markers, and reports user interaction back as [`SurfaceEvent`]s which the
//! host forwards to the controller.

use geo::{Point, Rect};

use crate::{
    error::SurfaceError,
    overlay::GlyphSize,
    types::{EventId, LocationSource, Viewport},
};

pub mod headless;

pub use headless::{HeadlessSurface, SurfaceCall};

/// Opaque handle of a drawn marker. Only meaningful to the surface that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(pub u64);

/// Content of the detail popup attached to an event marker.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Callout {
    pub title: String,
    pub description: String,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Marker {
    Event {
        id: EventId,
        position: Point,
        callout: Callout,
        opacity: f32,
    },
    Reference {
        position: Point,
        source: LocationSource,
    },
    RadiusCircle {
        center: Point,
        radius_m: f64,
    },
    Site {
        position: Point,
        icao_code: String,
        name: String,
        glyph: GlyphSize,
    },
    /// Plain pin used by the single-marker maps.
    Pin { position: Point },
}

/// Native interaction events, forwarded by the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SurfaceEvent {
    MoveEnd,
    ZoomEnd,
    Click(Point),
}

pub trait MapSurface {
    /// Prepares the drawing engine. The map is unusable if this fails.
    fn initialize(&mut self, center: Point, zoom: u8) -> Result<(), SurfaceError>;

    fn set_view(&mut self, center: Point, zoom: u8);

    fn center(&self) -> Point;

    fn zoom(&self) -> u8;

    /// Currently visible extent.
    fn bounds(&self) -> Rect;

    fn add_marker(&mut self, marker: Marker) -> MarkerHandle;

    fn remove_marker(&mut self, handle: MarkerHandle);

    fn set_marker_opacity(&mut self, handle: MarkerHandle, opacity: f32);

    fn open_callout(&mut self, handle: MarkerHandle);

    fn viewport(&self) -> Viewport {
        Viewport {
            center: self.center(),
            zoom: self.zoom(),
            bounds: self.bounds(),
        }
    }
}
