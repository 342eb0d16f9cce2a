//! The map view controller.
//!
//! [`MapController`] is the only way host code touches the map. It owns the
//! surface, the marker registry and the landing site master collection, and
//! runs sensor requests, place lookups, dataset fetches and timers as local
//! tasks whose results come back through a bounded queue of [`MapEvent`]s.
//!
//! All methods that start background work must be called from within a
//! [`tokio::task::LocalSet`].

use std::rc::Rc;

use geo::Point;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TryRecvError};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::MapConfig,
    error::{MapError, SensorError},
    focus::{FocusSequencer, FocusState},
    geocoding::{GeocodingClient, PlaceSearch},
    location::{
        Completion, DeviceLocator, LocationResolver, ModeSwitch, PositionOptions, RequestId,
    },
    markers::{MarkerEngine, MarkerRegistry, PassOutcome, ReconcileInput, ReconcileStrategy},
    overlay::{SiteLayer, SiteSource, SpatialOverlayCache},
    surface::{MapSurface, SurfaceEvent},
    timer::{self, TimerHandle},
    types::{Event, EventId, LocationSource, ReferenceLocation},
    viewport::ViewportController,
};

mod events;

pub use events::{HostCallbacks, MapEvent};

use events::deliver;

const QUEUE_SIZE: usize = 64;

/// External collaborators of the controller.
pub struct Services<P, D, O> {
    pub search: P,
    pub locator: D,
    pub sites: O,
}

pub struct MapController<S, P, D, O> {
    config: MapConfig,
    surface: S,
    geocoder: Rc<GeocodingClient<P>>,
    locator: Rc<D>,
    sites: Rc<O>,

    resolver: LocationResolver,
    viewport: ViewportController,
    overlay: SpatialOverlayCache,
    site_layer: SiteLayer,
    markers: MarkerEngine,
    focus: FocusSequencer,

    events: Vec<Event>,
    category: Option<String>,
    radius_km: f64,
    date_filter: Option<String>,
    time_filter: Option<String>,
    callbacks: HostCallbacks,
    focus_input: bool,
    error_timer: Option<TimerHandle>,

    sender: Sender<MapEvent>,
    recv: Receiver<MapEvent>,
}

impl<S, P, D, O> MapController<S, P, D, O>
where
    S: MapSurface,
    P: PlaceSearch + 'static,
    D: DeviceLocator + 'static,
    O: SiteSource + 'static,
{
    /// Initialises the surface at the configured start view. A surface that
    /// fails to initialise makes the whole map unusable and is reported.
    pub fn new(
        config: MapConfig,
        mut surface: S,
        services: Services<P, D, O>,
    ) -> Result<Self, MapError> {
        surface.initialize(config.initial_center(), config.initial_zoom)?;

        let (sender, recv) = mpsc::channel(QUEUE_SIZE);
        let geocoder = GeocodingClient::new(services.search, config.geocoder.country_codes());

        info!(
            "Map initialised at {:?}, zoom {}",
            config.initial_center, config.initial_zoom
        );
        Ok(Self {
            surface,
            geocoder: Rc::new(geocoder),
            locator: Rc::new(services.locator),
            sites: Rc::new(services.sites),
            resolver: LocationResolver::default(),
            viewport: ViewportController::new(config.settle_debounce()),
            overlay: SpatialOverlayCache::new(config.overlay_padding),
            site_layer: SiteLayer::default(),
            markers: MarkerEngine::new(config.marker_style()),
            focus: FocusSequencer::new(config.focus_settings()),
            events: Vec::new(),
            category: None,
            radius_km: 0.0,
            date_filter: None,
            time_filter: None,
            callbacks: HostCallbacks::default(),
            focus_input: false,
            error_timer: None,
            sender,
            recv,
            config,
        })
    }

    /// Replaces the reconcile strategy. Meant to be called right after [`Self::new`].
    pub fn with_strategy(mut self, strategy: Box<dyn ReconcileStrategy>) -> Self {
        self.markers = MarkerEngine::with_strategy(self.config.marker_style(), strategy);
        self
    }

    pub fn with_callbacks(mut self, callbacks: HostCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn set_events(&mut self, events: Vec<Event>) {
        debug!("Received {} events", events.len());
        self.events = events;
        self.reconcile();
    }

    /// Sets the active category. `None` or an empty tag shows everything.
    pub fn set_category(&mut self, category: Option<String>) {
        let category = category.filter(|category| !category.is_empty());
        if category == self.category {
            return;
        }

        self.category = category;
        self.callbacks.category_changed(self.category.as_deref());
        self.reconcile();
    }

    /// Radius around the reference location in kilometres. Zero disables dimming.
    pub fn set_radius(&mut self, radius_km: f64) {
        self.radius_km = if radius_km.is_finite() {
            radius_km.max(0.0)
        } else {
            0.0
        };
        self.reconcile();
    }

    /// Relayed to the host unchanged.
    pub fn set_date_filter(&mut self, value: Option<String>) {
        self.date_filter = value;
        self.callbacks.date_filter_changed(self.date_filter.as_deref());
    }

    /// Relayed to the host unchanged.
    pub fn set_time_filter(&mut self, value: Option<String>) {
        self.time_filter = value;
        self.callbacks.time_filter_changed(self.time_filter.as_deref());
    }

    #[instrument(skip(self))]
    pub fn select_mode(&mut self, mode: LocationSource) {
        let had_reference = self.resolver.reference().is_some();

        match self.resolver.switch_mode(mode) {
            ModeSwitch::Restored => {
                self.recenter_on_reference();
                self.reconcile();
                return;
            }
            ModeSwitch::AlreadyPending => {}
            ModeSwitch::RequestDevice(request) => self.spawn_device_request(request),
            ModeSwitch::Geocode(request, query) => self.spawn_geocode(request, query),
            ModeSwitch::FocusInput => {
                self.focus_input = true;
                self.schedule_error_expiry();
            }
        }

        if had_reference && self.resolver.reference().is_none() {
            self.reconcile();
        }
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.resolver.set_input(text);
    }

    /// Geocodes the current input. Empty input fails without a request.
    pub fn submit_custom(&mut self) {
        let had_reference = self.resolver.reference().is_some();

        match self.resolver.submit() {
            Ok((request, query)) => self.spawn_geocode(request, query),
            Err(_) => {
                self.focus_input = true;
                self.schedule_error_expiry();
            }
        }

        if had_reference && self.resolver.reference().is_none() {
            self.reconcile();
        }
    }

    /// Asks the sensor for a fresh fix, even if a device location is known.
    pub fn request_device_location(&mut self) {
        let had_reference = self.resolver.reference().is_some();
        let request = self.resolver.request_device();
        self.spawn_device_request(request);

        if had_reference && self.resolver.reference().is_none() {
            self.reconcile();
        }
    }

    pub fn clear_reference(&mut self) {
        self.resolver.clear();
        self.error_timer = None;
        self.reconcile();
    }

    pub fn set_overlay_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.overlay.disable();
            self.site_layer.clear(&mut self.surface);
            return;
        }

        if self.overlay.enable() {
            let sites = Rc::clone(&self.sites);
            let sender = self.sender.clone();
            tokio::task::spawn_local(async move {
                let result = sites.fetch_sites(None).await;
                deliver(&sender, MapEvent::SitesLoaded(result)).await;
            });
        } else if self.overlay.on_settled(&self.surface.bounds()) {
            self.site_layer.redraw(&mut self.surface, self.overlay.subset());
        }
    }

    /// Programmatic camera move. Settles like a user move.
    pub fn set_view(&mut self, center: Point, zoom: u8) {
        self.viewport.set_view(&mut self.surface, center, zoom);
        self.camera_changed();
    }

    /// Native surface events, forwarded by the host.
    pub fn on_surface_event(&mut self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::MoveEnd | SurfaceEvent::ZoomEnd => self.camera_changed(),
            SurfaceEvent::Click(_) => {}
        }
    }

    /// Centers on the event and opens its callout once its marker exists.
    pub fn focus_event(&mut self, id: impl Into<EventId>) {
        self.focus.start(id.into());

        let sender = &self.sender;
        let state = self.focus.attempt(
            self.markers.registry(),
            self.markers.passes(),
            &mut self.surface,
            |delay, timer| timer::schedule(delay, sender, MapEvent::Focus(timer)),
        );
        if *state == FocusState::Opening {
            self.camera_changed();
        }
    }

    /// Applies every queued event without waiting. Returns how many were applied.
    pub fn handle_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.recv.try_recv() {
                Ok(event) => {
                    self.apply(event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("Map event queue disconnected");
                    break;
                }
            }
        }
        handled
    }

    /// Waits for the next event and applies it.
    pub async fn process_next(&mut self) -> bool {
        match self.recv.recv().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    #[instrument(skip_all, fields(event = %event))]
    fn apply(&mut self, event: MapEvent) {
        match event {
            MapEvent::DeviceResult { request, result } => {
                let completion = self.resolver.complete_device(request, result);
                self.completed(completion, false);
            }
            MapEvent::GeocodeResult { request, result } => {
                let completion = self.resolver.complete_custom(request, result);
                self.completed(completion, true);
            }
            MapEvent::ErrorExpired(generation) => {
                if self.resolver.expire_error(generation) {
                    self.error_timer = None;
                }
            }
            MapEvent::ViewportSettled(generation) => {
                let Some(viewport) = self.viewport.settle(generation, &self.surface) else {
                    return;
                };
                debug!("Viewport settled at zoom {}", viewport.zoom);
                if self.overlay.on_settled(&viewport.bounds) {
                    self.site_layer.redraw(&mut self.surface, self.overlay.subset());
                }
                self.reconcile();
            }
            MapEvent::SitesLoaded(result) => {
                let bounds = self.surface.bounds();
                if self.overlay.load_finished(result, Some(&bounds)) {
                    self.site_layer.redraw(&mut self.surface, self.overlay.subset());
                }
            }
            MapEvent::Focus(fired) => {
                let was_opening = *self.focus.state() == FocusState::Opening;
                let sender = &self.sender;
                self.focus.fire(
                    fired,
                    self.markers.registry(),
                    self.markers.passes(),
                    &mut self.surface,
                    |delay, timer| timer::schedule(delay, sender, MapEvent::Focus(timer)),
                );
                if !was_opening && *self.focus.state() == FocusState::Opening {
                    self.camera_changed();
                }
            }
        }
    }

    fn completed(&mut self, completion: Completion, expires: bool) {
        match completion {
            Completion::Resolved(location) => {
                info!(
                    "Reference location set from {} source",
                    location.source()
                );
                self.error_timer = None;
                self.recenter_on_reference();
                self.reconcile();
            }
            Completion::Failed(err) => {
                warn!("Reference location failed: {err}");
                if expires {
                    self.schedule_error_expiry();
                }
                self.reconcile();
            }
            Completion::Stale => {}
        }
    }

    fn recenter_on_reference(&mut self) {
        let Some(position) = self.resolver.reference().map(ReferenceLocation::position) else {
            return;
        };
        self.viewport
            .recenter(&mut self.surface, position, self.config.regional_zoom);
        self.camera_changed();
    }

    fn camera_changed(&mut self) {
        let sender = &self.sender;
        self.viewport.camera_changed(|delay, generation| {
            timer::schedule(delay, sender, MapEvent::ViewportSettled(generation))
        });
    }

    fn schedule_error_expiry(&mut self) {
        let generation = self.resolver.error_generation();
        self.error_timer = Some(timer::schedule(
            self.config.error_display(),
            &self.sender,
            MapEvent::ErrorExpired(generation),
        ));
    }

    fn spawn_device_request(&self, request: RequestId) {
        let locator = Rc::clone(&self.locator);
        let sender = self.sender.clone();
        let options = PositionOptions::one_shot(self.config.device_timeout());

        tokio::task::spawn_local(async move {
            let result =
                match tokio::time::timeout(options.timeout, locator.current_position(options))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SensorError::Timeout),
                };
            deliver(&sender, MapEvent::DeviceResult { request, result }).await;
        });
    }

    fn spawn_geocode(&self, request: RequestId, query: String) {
        let geocoder = Rc::clone(&self.geocoder);
        let sender = self.sender.clone();

        tokio::task::spawn_local(async move {
            let result = geocoder.resolve(&query, None).await;
            deliver(&sender, MapEvent::GeocodeResult { request, result }).await;
        });
    }

    fn reconcile(&mut self) -> PassOutcome {
        let input = ReconcileInput {
            events: &self.events,
            category: self.category.as_deref(),
            reference: self.resolver.reference(),
            radius_km: self.radius_km,
        };
        self.markers.reconcile(&mut self.surface, &input)
    }

    /// Returns and resets the request to focus the place input.
    pub fn take_input_focus(&mut self) -> bool {
        std::mem::take(&mut self.focus_input)
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Direct surface access for the host, e.g. to apply user camera moves.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    pub fn reference(&self) -> Option<&ReferenceLocation> {
        self.resolver.reference()
    }

    pub fn registry(&self) -> &MarkerRegistry {
        self.markers.registry()
    }

    pub fn passes(&self) -> u64 {
        self.markers.passes()
    }

    pub fn overlay(&self) -> &SpatialOverlayCache {
        &self.overlay
    }

    pub fn site_markers(&self) -> usize {
        self.site_layer.len()
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn focus(&self) -> &FocusSequencer {
        &self.focus
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    pub fn date_filter(&self) -> Option<&str> {
        self.date_filter.as_deref()
    }

    pub fn time_filter(&self) -> Option<&str> {
        self.time_filter.as_deref()
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn geocoder(&self) -> &GeocodingClient<P> {
        &self.geocoder
    }
}
