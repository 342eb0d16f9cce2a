#![allow(dead_code)]

use std::{future::Future, sync::Arc, time::Duration};

use flymap::{
    MapConfig, MapController, Services,
    error::{GeocodeError, OverlayError, SensorError},
    geocoding::{Place, PlaceSearch},
    location::{DeviceLocator, PositionOptions},
    overlay::SiteSource,
    surface::HeadlessSurface,
    types::{Event, LandingSite, lat_lon},
};
use geo::{Point, Rect};
use parking_lot::Mutex;
use tokio::task::LocalSet;

pub type Map = MapController<HeadlessSurface, FakeSearch, FakeLocator, FakeSites>;

#[derive(Clone, Default)]
pub struct FakeSearch {
    pub calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
    pub restricted: Vec<Place>,
    pub worldwide: Vec<Place>,
}

impl PlaceSearch for FakeSearch {
    async fn search(
        &self,
        query: &str,
        country_codes: Option<&str>,
    ) -> Result<Vec<Place>, GeocodeError> {
        self.calls
            .lock()
            .push((query.to_string(), country_codes.map(str::to_string)));
        Ok(match country_codes {
            Some(_) => self.restricted.clone(),
            None => self.worldwide.clone(),
        })
    }
}

#[derive(Clone)]
pub struct FakeLocator {
    pub result: Result<Point, SensorError>,
    pub delay: Duration,
    pub calls: Arc<Mutex<Vec<PositionOptions>>>,
}

impl FakeLocator {
    pub fn answering(result: Result<Point, SensorError>) -> Self {
        Self {
            result,
            delay: Duration::from_millis(5),
            calls: Arc::default(),
        }
    }
}

impl DeviceLocator for FakeLocator {
    async fn current_position(&self, options: PositionOptions) -> Result<Point, SensorError> {
        self.calls.lock().push(options);
        tokio::time::sleep(self.delay).await;
        self.result
    }
}

#[derive(Clone, Default)]
pub struct FakeSites {
    pub sites: Vec<LandingSite>,
    pub fetches: Arc<Mutex<u32>>,
}

impl SiteSource for FakeSites {
    async fn fetch_sites(&self, _bounds: Option<Rect>) -> Result<Vec<LandingSite>, OverlayError> {
        *self.fetches.lock() += 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(self.sites.clone())
    }
}

pub fn map(search: FakeSearch, locator: FakeLocator, sites: FakeSites) -> Map {
    MapController::new(
        MapConfig::default(),
        HeadlessSurface::new(800, 600),
        Services {
            search,
            locator,
            sites,
        },
    )
    .unwrap()
}

pub fn default_map() -> Map {
    map(
        FakeSearch::default(),
        FakeLocator::answering(Err(SensorError::PositionUnavailable)),
        FakeSites::default(),
    )
}

/// Runs `future` inside a local task set, as the controller requires.
pub async fn local<F: Future>(future: F) -> F::Output {
    LocalSet::new().run_until(future).await
}

/// Lets (paused) time pass in small steps, applying queued map events after each.
pub async fn run_for(map: &mut Map, duration: Duration) -> usize {
    let step = Duration::from_millis(10);
    let mut elapsed = Duration::ZERO;
    let mut handled = 0;

    while elapsed < duration {
        tokio::time::sleep(step).await;
        elapsed += step;
        handled += map.handle_events();
    }
    handled
}

pub fn event(id: &str, lat: &str, lon: &str) -> Event {
    Event {
        id: id.into(),
        lat: Some(lat.to_string()),
        lon: Some(lon.to_string()),
        title: format!("Event {id}"),
        description: "Fly-in with breakfast".to_string(),
        event_type: Some("fly-in".to_string()),
        ..Default::default()
    }
}

pub fn place(name: &str, lat: f64, lon: f64) -> Place {
    Place {
        position: lat_lon(lat, lon),
        display_name: name.to_string(),
        place_id: None,
    }
}

pub fn site(icao: &str, lat: f64, lon: f64) -> LandingSite {
    LandingSite {
        icao_code: icao.to_string(),
        iata_code: None,
        name: format!("Airfield {icao}"),
        lat,
        lon,
        site_type: "small_airport".to_string(),
        municipality: None,
        country: None,
    }
}
