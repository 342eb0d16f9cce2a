//! Reference location resolution.
//!
//! [`LocationResolver`] is a plain state machine; the controller performs the
//! actual sensor and geocoding calls and feeds their results back in. Every
//! request carries a [`RequestId`] and the mode it was made for, so a result
//! that arrives after the user moved on is dropped.

use std::time::Duration;

use geo::Point;
use tracing::{debug, trace};

use crate::{
    error::{GeocodeError, LocationError, SensorError},
    geocoding::Place,
    types::{LocationSource, ReferenceLocation},
};

/// How the device sensor is asked for a fix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix that may be returned. Zero forces a fresh reading.
    pub maximum_age: Duration,
}

impl PositionOptions {
    pub fn one_shot(timeout: Duration) -> Self {
        Self {
            high_accuracy: true,
            timeout,
            maximum_age: Duration::ZERO,
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait DeviceLocator {
    async fn current_position(&self, options: PositionOptions) -> Result<Point, SensorError>;
}

/// Locator for hosts without a sensor: a fixed position, or unavailable.
#[derive(Clone, Debug, Default)]
pub struct StaticLocator {
    position: Option<Point>,
}

impl StaticLocator {
    pub fn new(position: Option<Point>) -> Self {
        Self { position }
    }
}

impl DeviceLocator for StaticLocator {
    async fn current_position(&self, _options: PositionOptions) -> Result<Point, SensorError> {
        self.position.ok_or(SensorError::PositionUnavailable)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolverState {
    Idle,
    Pending,
    Resolved,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

/// What the caller has to do after a mode was activated.
#[derive(Clone, Debug, PartialEq)]
pub enum ModeSwitch {
    /// A remembered location of that mode became active again.
    Restored,
    /// A request for this mode is already in flight.
    AlreadyPending,
    RequestDevice(RequestId),
    Geocode(RequestId, String),
    /// Nothing to resolve yet; the place input should get focus.
    FocusInput,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    Resolved(ReferenceLocation),
    Failed(LocationError),
    /// The result belongs to a request the user no longer waits for.
    Stale,
}

#[derive(Debug)]
pub struct LocationResolver {
    mode: LocationSource,
    state: ResolverState,
    active: Option<ReferenceLocation>,
    last_device: Option<Point>,
    last_custom: Option<(Point, String)>,
    input: String,
    pending: Option<(RequestId, LocationSource)>,
    next_request: u64,
    error: Option<LocationError>,
    error_generation: u64,
}

impl Default for LocationResolver {
    fn default() -> Self {
        Self::new(LocationSource::Device)
    }
}

impl LocationResolver {
    pub fn new(mode: LocationSource) -> Self {
        Self {
            mode,
            state: ResolverState::Idle,
            active: None,
            last_device: None,
            last_custom: None,
            input: String::new(),
            pending: None,
            next_request: 0,
            error: None,
            error_generation: 0,
        }
    }

    pub fn state(&self) -> ResolverState {
        self.state
    }

    pub fn mode(&self) -> LocationSource {
        self.mode
    }

    pub fn reference(&self) -> Option<&ReferenceLocation> {
        self.active.as_ref()
    }

    pub fn error(&self) -> Option<&LocationError> {
        self.error.as_ref()
    }

    /// Generation of the current error, used to expire exactly that error.
    pub fn error_generation(&self) -> u64 {
        self.error_generation
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Updates the place text. Never triggers a lookup on its own.
    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Activates `mode`. Switching modes drops the active location and any
    /// request of the other mode.
    pub fn switch_mode(&mut self, mode: LocationSource) -> ModeSwitch {
        if mode != self.mode {
            debug!("Switching reference location source {} -> {mode}", self.mode);
            self.mode = mode;
            self.active = None;
            self.pending = None;
            self.error = None;
            self.state = ResolverState::Idle;
        }

        if matches!(self.pending, Some((_, pending_mode)) if pending_mode == mode) {
            return ModeSwitch::AlreadyPending;
        }

        match mode {
            LocationSource::Device => match self.last_device {
                Some(position) => {
                    self.resolve_to(ReferenceLocation::Device { position });
                    ModeSwitch::Restored
                }
                None => ModeSwitch::RequestDevice(self.begin(LocationSource::Device)),
            },
            LocationSource::Custom => {
                if let Some((position, label)) = self.last_custom.clone() {
                    self.resolve_to(ReferenceLocation::Custom { position, label });
                    ModeSwitch::Restored
                } else if self.input.trim().is_empty() {
                    self.fail(GeocodeError::EmptyQuery.into());
                    ModeSwitch::FocusInput
                } else {
                    let query = self.input.trim().to_string();
                    ModeSwitch::Geocode(self.begin(LocationSource::Custom), query)
                }
            }
        }
    }

    /// Explicit "locate me": always asks the sensor again.
    pub fn request_device(&mut self) -> RequestId {
        if self.mode != LocationSource::Device {
            self.switch_mode_silently(LocationSource::Device);
        }
        self.begin(LocationSource::Device)
    }

    /// Submits the current input for geocoding. Empty input fails locally.
    pub fn submit(&mut self) -> Result<(RequestId, String), LocationError> {
        if self.mode != LocationSource::Custom {
            self.switch_mode_silently(LocationSource::Custom);
        }

        let query = self.input.trim().to_string();
        if query.is_empty() {
            let err = LocationError::from(GeocodeError::EmptyQuery);
            self.fail(err.clone());
            return Err(err);
        }

        Ok((self.begin(LocationSource::Custom), query))
    }

    pub fn complete_device(
        &mut self,
        request: RequestId,
        result: Result<Point, SensorError>,
    ) -> Completion {
        if !self.accepts(request, LocationSource::Device) {
            trace!("Dropping stale device result {request:?}");
            return Completion::Stale;
        }
        self.pending = None;

        match result {
            Ok(position) => {
                self.last_device = Some(position);
                let location = ReferenceLocation::Device { position };
                self.resolve_to(location.clone());
                Completion::Resolved(location)
            }
            Err(err) => {
                self.fail(err.into());
                Completion::Failed(err.into())
            }
        }
    }

    pub fn complete_custom(
        &mut self,
        request: RequestId,
        result: Result<Place, GeocodeError>,
    ) -> Completion {
        if !self.accepts(request, LocationSource::Custom) {
            trace!("Dropping stale geocoding result {request:?}");
            return Completion::Stale;
        }
        self.pending = None;

        match result {
            Ok(place) => {
                self.last_custom = Some((place.position, place.display_name.clone()));
                let location = ReferenceLocation::Custom {
                    position: place.position,
                    label: place.display_name,
                };
                self.resolve_to(location.clone());
                Completion::Resolved(location)
            }
            Err(err) => {
                let err = LocationError::from(err);
                self.fail(err.clone());
                Completion::Failed(err)
            }
        }
    }

    /// Clears the error of `generation` if it is still shown. Returns whether it was.
    pub fn expire_error(&mut self, generation: u64) -> bool {
        if self.error.is_none() || generation != self.error_generation {
            return false;
        }

        self.error = None;
        if self.state == ResolverState::Error {
            self.state = ResolverState::Idle;
        }
        true
    }

    /// Drops the active location and forgets the remembered one of the current mode.
    pub fn clear(&mut self) {
        match self.mode {
            LocationSource::Device => self.last_device = None,
            LocationSource::Custom => self.last_custom = None,
        }
        self.active = None;
        self.pending = None;
        self.error = None;
        self.state = ResolverState::Idle;
    }

    fn switch_mode_silently(&mut self, mode: LocationSource) {
        self.mode = mode;
        self.active = None;
        self.pending = None;
        self.error = None;
    }

    fn begin(&mut self, mode: LocationSource) -> RequestId {
        let request = RequestId(self.next_request);
        self.next_request += 1;

        self.pending = Some((request, mode));
        self.error = None;
        self.state = ResolverState::Pending;
        request
    }

    fn accepts(&self, request: RequestId, mode: LocationSource) -> bool {
        self.mode == mode && self.pending == Some((request, mode))
    }

    fn resolve_to(&mut self, location: ReferenceLocation) {
        self.active = Some(location);
        self.error = None;
        self.state = ResolverState::Resolved;
    }

    fn fail(&mut self, err: LocationError) {
        debug!("Reference location failed: {err}");
        self.active = None;
        self.error = Some(err);
        self.error_generation += 1;
        self.state = ResolverState::Error;
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::{GeocodeError, LocationError, SensorError},
        geocoding::Place,
        types::{LocationSource, ReferenceLocation, lat_lon},
    };

    use super::{Completion, LocationResolver, ModeSwitch, ResolverState};

    fn place(lat: f64, lon: f64) -> Place {
        Place {
            position: lat_lon(lat, lon),
            display_name: "Konstanz".to_string(),
            place_id: Some(1),
        }
    }

    #[test]
    fn device_success() {
        let mut resolver = LocationResolver::default();
        let ModeSwitch::RequestDevice(request) = resolver.switch_mode(LocationSource::Device)
        else {
            panic!("expected a device request");
        };
        assert_eq!(resolver.state(), ResolverState::Pending);

        let completion = resolver.complete_device(request, Ok(lat_lon(48.0, 9.0)));

        assert_eq!(
            completion,
            Completion::Resolved(ReferenceLocation::Device {
                position: lat_lon(48.0, 9.0)
            })
        );
        assert_eq!(resolver.state(), ResolverState::Resolved);
        assert_eq!(
            resolver.reference().map(|r| r.source()),
            Some(LocationSource::Device)
        );
    }

    #[test]
    fn device_permission_denied() {
        let mut resolver = LocationResolver::default();
        let request = resolver.request_device();

        let completion = resolver.complete_device(request, Err(SensorError::PermissionDenied));

        assert_eq!(
            completion,
            Completion::Failed(LocationError::Sensor(SensorError::PermissionDenied))
        );
        assert_eq!(resolver.state(), ResolverState::Error);
        assert!(resolver.reference().is_none());
    }

    #[test]
    fn pending_request_is_not_duplicated() {
        let mut resolver = LocationResolver::default();
        assert!(matches!(
            resolver.switch_mode(LocationSource::Device),
            ModeSwitch::RequestDevice(_)
        ));
        assert_eq!(
            resolver.switch_mode(LocationSource::Device),
            ModeSwitch::AlreadyPending
        );
    }

    #[test]
    fn empty_custom_input_focuses() {
        let mut resolver = LocationResolver::default();

        assert_eq!(
            resolver.switch_mode(LocationSource::Custom),
            ModeSwitch::FocusInput
        );
        assert_eq!(
            resolver.error(),
            Some(&LocationError::Geocode(GeocodeError::EmptyQuery))
        );

        resolver.set_input("   ");
        assert!(resolver.submit().is_err());
        assert_eq!(resolver.state(), ResolverState::Error);
    }

    #[test]
    fn custom_input_is_submitted_on_activation() {
        let mut resolver = LocationResolver::default();
        resolver.set_input(" Konstanz ");

        let ModeSwitch::Geocode(request, query) = resolver.switch_mode(LocationSource::Custom)
        else {
            panic!("expected a geocoding request");
        };
        assert_eq!(query, "Konstanz");

        let completion = resolver.complete_custom(request, Ok(place(47.66, 9.17)));
        assert!(matches!(
            completion,
            Completion::Resolved(ReferenceLocation::Custom { .. })
        ));
    }

    #[test]
    fn switching_discards_in_flight_results() {
        let mut resolver = LocationResolver::default();
        let device_request = resolver.request_device();

        resolver.set_input("Konstanz");
        let (custom_request, _) = resolver.submit().unwrap();

        assert_eq!(
            resolver.complete_device(device_request, Ok(lat_lon(48.0, 9.0))),
            Completion::Stale
        );
        assert_eq!(resolver.state(), ResolverState::Pending);

        assert!(matches!(
            resolver.complete_custom(custom_request, Ok(place(47.66, 9.17))),
            Completion::Resolved(_)
        ));
    }

    #[test]
    fn newer_submission_wins() {
        let mut resolver = LocationResolver::new(LocationSource::Custom);
        resolver.set_input("Berlin");
        let (first, _) = resolver.submit().unwrap();
        resolver.set_input("Konstanz");
        let (second, _) = resolver.submit().unwrap();

        assert_eq!(
            resolver.complete_custom(first, Ok(place(52.5, 13.4))),
            Completion::Stale
        );
        assert!(matches!(
            resolver.complete_custom(second, Ok(place(47.66, 9.17))),
            Completion::Resolved(_)
        ));
    }

    #[test]
    fn remembered_locations_are_restored() {
        let mut resolver = LocationResolver::default();
        let request = resolver.request_device();
        resolver.complete_device(request, Ok(lat_lon(48.0, 9.0)));

        resolver.set_input("Konstanz");
        let (request, _) = resolver.submit().unwrap();
        resolver.complete_custom(request, Ok(place(47.66, 9.17)));

        assert_eq!(
            resolver.switch_mode(LocationSource::Device),
            ModeSwitch::Restored
        );
        assert_eq!(
            resolver.reference().map(|r| r.position()),
            Some(lat_lon(48.0, 9.0))
        );

        assert_eq!(
            resolver.switch_mode(LocationSource::Custom),
            ModeSwitch::Restored
        );
        assert_eq!(
            resolver.reference().map(|r| r.position()),
            Some(lat_lon(47.66, 9.17))
        );
    }

    #[test]
    fn errors_expire_by_generation() {
        let mut resolver = LocationResolver::new(LocationSource::Custom);
        resolver.set_input("Nowhere");
        let (request, _) = resolver.submit().unwrap();
        resolver.complete_custom(request, Err(GeocodeError::NotFound("Nowhere".to_string())));
        let first = resolver.error_generation();

        resolver.set_input("");
        assert!(resolver.submit().is_err());

        assert!(!resolver.expire_error(first));
        assert!(resolver.error().is_some());

        assert!(resolver.expire_error(resolver.error_generation()));
        assert!(resolver.error().is_none());
        assert_eq!(resolver.state(), ResolverState::Idle);
    }

    #[test]
    fn clear() {
        let mut resolver = LocationResolver::default();
        let request = resolver.request_device();
        resolver.complete_device(request, Ok(lat_lon(48.0, 9.0)));

        resolver.clear();

        assert!(resolver.reference().is_none());
        assert_eq!(resolver.state(), ResolverState::Idle);
        assert!(matches!(
            resolver.switch_mode(LocationSource::Device),
            ModeSwitch::RequestDevice(_)
        ));
    }
}
