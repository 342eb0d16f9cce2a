use std::fmt::Display;

use geo::Point;
use tokio::sync::mpsc::Sender;

use crate::{
    error::{GeocodeError, OverlayError, SensorError},
    focus::FocusTimer,
    geocoding::Place,
    location::RequestId,
    types::LandingSite,
};

/// Results of background work, delivered to the controller's queue.
#[derive(Debug)]
pub enum MapEvent {
    DeviceResult {
        request: RequestId,
        result: Result<Point, SensorError>,
    },
    GeocodeResult {
        request: RequestId,
        result: Result<Place, GeocodeError>,
    },
    ErrorExpired(u64),
    ViewportSettled(u64),
    SitesLoaded(Result<Vec<LandingSite>, OverlayError>),
    Focus(FocusTimer),
}

impl Display for MapEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::DeviceResult { .. } => "DeviceResult",
                Self::GeocodeResult { .. } => "GeocodeResult",
                Self::ErrorExpired(_) => "ErrorExpired",
                Self::ViewportSettled(_) => "ViewportSettled",
                Self::SitesLoaded(_) => "SitesLoaded",
                Self::Focus(_) => "Focus",
            }
        )
    }
}

pub(super) async fn deliver(sender: &Sender<MapEvent>, event: MapEvent) {
    if let Err(err) = sender.send(event).await {
        tracing::trace!("Controller gone, dropping {}", err.0);
    }
}

type FilterCallback = Box<dyn FnMut(Option<&str>)>;

/// Notifications from the map back to the host. Unset callbacks are skipped.
#[derive(Default)]
pub struct HostCallbacks {
    category_changed: Option<FilterCallback>,
    date_filter_changed: Option<FilterCallback>,
    time_filter_changed: Option<FilterCallback>,
}

impl HostCallbacks {
    pub fn on_category_change(mut self, callback: impl FnMut(Option<&str>) + 'static) -> Self {
        self.category_changed = Some(Box::new(callback));
        self
    }

    pub fn on_date_filter_change(mut self, callback: impl FnMut(Option<&str>) + 'static) -> Self {
        self.date_filter_changed = Some(Box::new(callback));
        self
    }

    pub fn on_time_filter_change(mut self, callback: impl FnMut(Option<&str>) + 'static) -> Self {
        self.time_filter_changed = Some(Box::new(callback));
        self
    }

    pub(super) fn category_changed(&mut self, category: Option<&str>) {
        if let Some(callback) = &mut self.category_changed {
            callback(category);
        }
    }

    pub(super) fn date_filter_changed(&mut self, value: Option<&str>) {
        if let Some(callback) = &mut self.date_filter_changed {
            callback(value);
        }
    }

    pub(super) fn time_filter_changed(&mut self, value: Option<&str>) {
        if let Some(callback) = &mut self.time_filter_changed {
            callback(value);
        }
    }
}
