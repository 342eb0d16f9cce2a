use std::collections::BTreeMap;

use geo::{Coord, Point, Rect};

use crate::error::SurfaceError;

use super::{MapSurface, Marker, MarkerHandle};

const TILE_SIZE: f64 = 256.0;
const MAX_LAT: f64 = 85.0511;

/// Programmatic calls a [`HeadlessSurface`] received, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceCall {
    Initialize { center: Point, zoom: u8 },
    SetView { center: Point, zoom: u8 },
    AddMarker(MarkerHandle),
    RemoveMarker(MarkerHandle),
    SetOpacity(MarkerHandle, f32),
    OpenCallout(MarkerHandle),
}

/// In-memory surface without a drawing engine.
///
/// Bounds are derived from center, zoom and a pixel size using a plain
/// degrees-per-tile model, which is close enough for filtering and tests.
#[derive(Debug)]
pub struct HeadlessSurface {
    center: Point,
    zoom: u8,
    size_px: (u32, u32),
    markers: BTreeMap<MarkerHandle, Marker>,
    opened: Option<MarkerHandle>,
    next_handle: u64,
    calls: Vec<SurfaceCall>,
    init_failure: Option<String>,
}

impl HeadlessSurface {
    pub fn new(width_px: u32, height_px: u32) -> Self {
        Self {
            center: Point::new(0.0, 0.0),
            zoom: 0,
            size_px: (width_px.max(1), height_px.max(1)),
            markers: BTreeMap::new(),
            opened: None,
            next_handle: 0,
            calls: Vec::new(),
            init_failure: None,
        }
    }

    /// A surface whose initialisation always fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            init_failure: Some(reason.into()),
            ..Self::new(1, 1)
        }
    }

    /// Moves the camera the way a user drag would. Not recorded as a call.
    pub fn pan_to(&mut self, center: Point) {
        self.center = center;
    }

    /// Changes zoom the way a user scroll would. Not recorded as a call.
    pub fn zoom_to(&mut self, zoom: u8) {
        self.zoom = zoom;
    }

    pub fn markers(&self) -> impl Iterator<Item = (&MarkerHandle, &Marker)> {
        self.markers.iter()
    }

    pub fn marker(&self, handle: MarkerHandle) -> Option<&Marker> {
        self.markers.get(&handle)
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn opened_callout(&self) -> Option<MarkerHandle> {
        self.opened
    }

    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// All programmatic `set_view` calls, oldest first.
    pub fn set_views(&self) -> Vec<(Point, u8)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                SurfaceCall::SetView { center, zoom } => Some((*center, *zoom)),
                _ => None,
            })
            .collect()
    }

    fn span_deg(&self) -> (f64, f64) {
        let tiles = 2f64.powi(i32::from(self.zoom));
        let lon_span = 360.0 * f64::from(self.size_px.0) / (TILE_SIZE * tiles);
        let lat_span = lon_span * f64::from(self.size_px.1) / f64::from(self.size_px.0);
        (lon_span.min(360.0), lat_span.min(2.0 * MAX_LAT))
    }
}

impl MapSurface for HeadlessSurface {
    fn initialize(&mut self, center: Point, zoom: u8) -> Result<(), SurfaceError> {
        if let Some(reason) = &self.init_failure {
            return Err(SurfaceError::Init(reason.clone()));
        }

        self.calls.push(SurfaceCall::Initialize { center, zoom });
        self.center = center;
        self.zoom = zoom;
        Ok(())
    }

    fn set_view(&mut self, center: Point, zoom: u8) {
        self.calls.push(SurfaceCall::SetView { center, zoom });
        self.center = center;
        self.zoom = zoom;
    }

    fn center(&self) -> Point {
        self.center
    }

    fn zoom(&self) -> u8 {
        self.zoom
    }

    fn bounds(&self) -> Rect {
        let (lon_span, lat_span) = self.span_deg();
        let (lon, lat) = self.center.x_y();

        Rect::new(
            Coord {
                x: (lon - lon_span / 2.0).max(-180.0),
                y: (lat - lat_span / 2.0).max(-MAX_LAT),
            },
            Coord {
                x: (lon + lon_span / 2.0).min(180.0),
                y: (lat + lat_span / 2.0).min(MAX_LAT),
            },
        )
    }

    fn add_marker(&mut self, marker: Marker) -> MarkerHandle {
        let handle = MarkerHandle(self.next_handle);
        self.next_handle += 1;

        self.markers.insert(handle, marker);
        self.calls.push(SurfaceCall::AddMarker(handle));
        handle
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        self.calls.push(SurfaceCall::RemoveMarker(handle));
        if self.markers.remove(&handle).is_none() {
            tracing::warn!("Removed unknown marker {handle:?}");
        }
        if self.opened == Some(handle) {
            self.opened = None;
        }
    }

    fn set_marker_opacity(&mut self, handle: MarkerHandle, opacity: f32) {
        self.calls.push(SurfaceCall::SetOpacity(handle, opacity));
        if let Some(Marker::Event { opacity: current, .. }) = self.markers.get_mut(&handle) {
            *current = opacity;
        }
    }

    fn open_callout(&mut self, handle: MarkerHandle) {
        self.calls.push(SurfaceCall::OpenCallout(handle));
        if self.markers.contains_key(&handle) {
            self.opened = Some(handle);
        }
    }
}
