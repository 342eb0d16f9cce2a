//! Maps that show or edit a single position.

use geo::Point;
use tracing::debug;

use crate::{
    config::MapConfig,
    error::SurfaceError,
    surface::{MapSurface, Marker, MarkerHandle, SurfaceEvent},
    types::Event,
};

/// Read-only map of one event, as shown on its detail page.
pub struct EventLocationMap<S> {
    surface: S,
    pin: Option<MarkerHandle>,
}

impl<S: MapSurface> EventLocationMap<S> {
    /// Events without usable coordinates get the default view and no pin.
    pub fn new(mut surface: S, event: &Event, config: &MapConfig) -> Result<Self, SurfaceError> {
        let pin = match event.position() {
            Some(position) => {
                surface.initialize(position, config.detail_zoom)?;
                Some(surface.add_marker(Marker::Pin { position }))
            }
            None => {
                debug!("Event {} has no usable coordinates", event.id);
                surface.initialize(config.initial_center(), config.initial_zoom)?;
                None
            }
        };

        Ok(Self { surface, pin })
    }

    pub fn pin(&self) -> Option<MarkerHandle> {
        self.pin
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

/// Coordinates as stored on an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickedLocation {
    pub lat: String,
    pub lon: String,
}

impl From<Point> for PickedLocation {
    fn from(position: Point) -> Self {
        Self {
            lat: format!("{:.6}", position.y()),
            lon: format!("{:.6}", position.x()),
        }
    }
}

/// Map for choosing an event position by clicking. Each click moves the one pin.
pub struct LocationPicker<S> {
    surface: S,
    pin: Option<MarkerHandle>,
    picked: Option<Point>,
}

impl<S: MapSurface> LocationPicker<S> {
    pub fn new(mut surface: S, seed: Option<Point>, config: &MapConfig) -> Result<Self, SurfaceError> {
        match seed {
            Some(position) => surface.initialize(position, config.regional_zoom)?,
            None => surface.initialize(config.initial_center(), config.initial_zoom)?,
        }

        let mut picker = Self {
            surface,
            pin: None,
            picked: None,
        };
        if let Some(position) = seed {
            picker.place(position);
        }
        Ok(picker)
    }

    pub fn on_surface_event(&mut self, event: SurfaceEvent) -> Option<PickedLocation> {
        match event {
            SurfaceEvent::Click(position) => Some(self.place(position)),
            SurfaceEvent::MoveEnd | SurfaceEvent::ZoomEnd => None,
        }
    }

    pub fn place(&mut self, position: Point) -> PickedLocation {
        if let Some(pin) = self.pin.take() {
            self.surface.remove_marker(pin);
        }
        self.pin = Some(self.surface.add_marker(Marker::Pin { position }));
        self.picked = Some(position);
        position.into()
    }

    pub fn picked(&self) -> Option<PickedLocation> {
        self.picked.map(PickedLocation::from)
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}
