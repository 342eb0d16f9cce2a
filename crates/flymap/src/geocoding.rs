//! Free-text place lookup.
//!
//! [`GeocodingClient`] implements the lookup policy (default country bias with a
//! single worldwide fallback) on top of any [`PlaceSearch`] backend.
//! [`NominatimSearch`] is the HTTP backend for Nominatim-compatible endpoints.

use std::time::Duration;

use geo::Point;
use serde::Deserialize;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, instrument};

use crate::{config::GeocoderConfig, error::GeocodeError, types::lat_lon};

#[derive(Clone, Debug, PartialEq)]
pub struct Place {
    pub position: Point,
    pub display_name: String,
    pub place_id: Option<u64>,
}

#[allow(async_fn_in_trait)]
pub trait PlaceSearch {
    /// Best matches for `query`, most relevant first. `country_codes` is a comma
    /// separated list restricting the search, `None` searches worldwide.
    async fn search(
        &self,
        query: &str,
        country_codes: Option<&str>,
    ) -> Result<Vec<Place>, GeocodeError>;
}

pub struct GeocodingClient<S> {
    search: S,
    default_countries: String,
}

impl<S: PlaceSearch> GeocodingClient<S> {
    pub fn new(search: S, default_countries: impl Into<String>) -> Self {
        Self {
            search,
            default_countries: default_countries.into(),
        }
    }

    /// Resolves `query` to the first match.
    ///
    /// Without `region_bias` the default countries are searched first, and only if
    /// that yields nothing a single unrestricted search follows. An explicit bias
    /// is never widened.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        query: &str,
        region_bias: Option<&str>,
    ) -> Result<Place, GeocodeError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(GeocodeError::EmptyQuery);
        }

        let restriction = region_bias
            .unwrap_or(&self.default_countries)
            .trim()
            .to_string();
        let restriction = (!restriction.is_empty()).then_some(restriction);

        let mut places = self.search.search(query, restriction.as_deref()).await?;

        if places.is_empty() && region_bias.is_none() && restriction.is_some() {
            debug!("No match within default countries, searching worldwide");
            places = self.search.search(query, None).await?;
        }

        places
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::NotFound(query.to_string()))
    }

    pub fn backend(&self) -> &S {
        &self.search
    }
}

/// Nominatim `search` endpoint client.
///
/// Requests are spaced at least `min_interval` apart; a caller arriving earlier
/// waits for its turn instead of bursting.
pub struct NominatimSearch {
    client: reqwest::Client,
    base_url: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimSearch {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            min_interval: config.min_interval(),
            last_request: Mutex::new(None),
        })
    }

    async fn wait_turn(&self) {
        let mut last_request = self.last_request.lock().await;
        if let Some(previous) = *last_request {
            let next = previous + self.min_interval;
            if next > Instant::now() {
                tokio::time::sleep_until(next).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

impl PlaceSearch for NominatimSearch {
    async fn search(
        &self,
        query: &str,
        country_codes: Option<&str>,
    ) -> Result<Vec<Place>, GeocodeError> {
        self.wait_turn().await;

        let mut request = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("format", "json"), ("limit", "1"), ("q", query)]);
        if let Some(country_codes) = country_codes {
            request = request.query(&[("countrycodes", country_codes)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Service(format!("status {status}")));
        }

        let places: Vec<NominatimPlace> = response.json().await?;
        debug!("Nominatim answered {} places", places.len());

        places.into_iter().map(Place::try_from).collect()
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    #[serde(default)]
    place_id: Option<u64>,
    lat: String,
    lon: String,
    display_name: String,
}

impl TryFrom<NominatimPlace> for Place {
    type Error = GeocodeError;

    fn try_from(value: NominatimPlace) -> Result<Self, Self::Error> {
        let parse = |raw: &str| {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| GeocodeError::Service(format!("invalid coordinate '{raw}'")))
        };

        Ok(Place {
            position: lat_lon(parse(&value.lat)?, parse(&value.lon)?),
            display_name: value.display_name,
            place_id: value.place_id,
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::{error::GeocodeError, types::lat_lon};

    use super::{GeocodingClient, NominatimPlace, Place, PlaceSearch};

    #[derive(Default)]
    struct FakeSearch {
        calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
        restricted: Vec<Place>,
        worldwide: Vec<Place>,
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

    fn place(name: &str, lat: f64, lon: f64) -> Place {
        Place {
            position: lat_lon(lat, lon),
            display_name: name.to_string(),
            place_id: None,
        }
    }

    #[tokio::test]
    async fn restricted_hit_needs_one_request() {
        let search = FakeSearch {
            restricted: vec![place("Konstanz", 47.66, 9.17), place("Other", 1.0, 1.0)],
            ..Default::default()
        };
        let calls = search.calls.clone();
        let client = GeocodingClient::new(search, "de,at,ch");

        let found = client.resolve(" Konstanz ", None).await.unwrap();

        assert_eq!(found.display_name, "Konstanz");
        assert_eq!(
            *calls.lock(),
            vec![("Konstanz".to_string(), Some("de,at,ch".to_string()))]
        );
    }

    #[tokio::test]
    async fn falls_back_once() {
        let search = FakeSearch {
            worldwide: vec![place("Oshkosh", 43.98, -88.55)],
            ..Default::default()
        };
        let calls = search.calls.clone();
        let client = GeocodingClient::new(search, "de,at,ch");

        let found = client.resolve("Oshkosh", None).await.unwrap();

        assert_eq!(found.display_name, "Oshkosh");
        assert_eq!(calls.lock().len(), 2);
        assert_eq!(calls.lock()[1].1, None);
    }

    #[tokio::test]
    async fn explicit_bias_never_falls_back() {
        let search = FakeSearch {
            worldwide: vec![place("Oshkosh", 43.98, -88.55)],
            ..Default::default()
        };
        let calls = search.calls.clone();
        let client = GeocodingClient::new(search, "de,at,ch");

        let err = client.resolve("Oshkosh", Some("fr")).await.unwrap_err();

        assert_eq!(err, GeocodeError::NotFound("Oshkosh".to_string()));
        assert_eq!(
            *calls.lock(),
            vec![("Oshkosh".to_string(), Some("fr".to_string()))]
        );
    }

    #[tokio::test]
    async fn empty_query_is_local() {
        let search = FakeSearch::default();
        let calls = search.calls.clone();
        let client = GeocodingClient::new(search, "de");

        assert_eq!(
            client.resolve("   ", None).await.unwrap_err(),
            GeocodeError::EmptyQuery
        );
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn failure_messages_differ() {
        assert_ne!(
            GeocodeError::NotFound("x".to_string()).to_string(),
            GeocodeError::Service("timeout".to_string()).to_string()
        );
        assert!(
            !GeocodeError::Service("connection refused".to_string())
                .to_string()
                .contains("refused")
        );
    }

    #[test]
    fn nominatim_place() {
        let raw: Vec<NominatimPlace> = serde_json::from_str(
            r#"[{
                "place_id": 128372,
                "licence": "Data © OpenStreetMap contributors",
                "lat": "47.6779496",
                "lon": "9.1732384",
                "display_name": "Konstanz, Baden-Württemberg, Deutschland",
                "importance": 0.71
            }]"#,
        )
        .unwrap();

        let places: Vec<Place> = raw
            .into_iter()
            .map(Place::try_from)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(places[0].place_id, Some(128372));
        assert!((places[0].position.y() - 47.6779496).abs() < 1e-9);

        let broken = NominatimPlace {
            place_id: None,
            lat: "north".to_string(),
            lon: "9.0".to_string(),
            display_name: String::new(),
        };
        assert!(matches!(Place::try_from(broken), Err(GeocodeError::Service(_))));
    }
}
