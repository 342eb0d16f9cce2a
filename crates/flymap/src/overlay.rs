//! Landing site overlay.
//!
//! The regional dataset is fetched once per overlay session into an r-tree
//! backed master collection. Every viewport settle filters that collection in
//! memory against the padded viewport; the network is not involved again.

use std::time::Duration;

use geo::Rect;
use point_index::{PointIndex, pad_rect};
use tracing::{debug, info, warn};

use crate::{
    error::OverlayError,
    surface::{MapSurface, Marker, MarkerHandle},
    types::LandingSite,
};

/// Marker glyph size band for a zoom level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlyphSize {
    Low,
    Mid,
    High,
    Full,
}

impl GlyphSize {
    pub fn for_zoom(zoom: u8) -> Self {
        match zoom {
            0..=6 => Self::Low,
            7..=8 => Self::Mid,
            9..=10 => Self::High,
            _ => Self::Full,
        }
    }

    pub fn pixels(self) -> u32 {
        match self {
            Self::Low => 12,
            Self::Mid => 16,
            Self::High => 20,
            Self::Full => 24,
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait SiteSource {
    /// All landing sites of the region, or only those in `bounds` if given.
    async fn fetch_sites(&self, bounds: Option<Rect>) -> Result<Vec<LandingSite>, OverlayError>;
}

pub struct HttpSiteSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSiteSource {
    pub fn new(
        url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, OverlayError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl SiteSource for HttpSiteSource {
    async fn fetch_sites(&self, bounds: Option<Rect>) -> Result<Vec<LandingSite>, OverlayError> {
        let mut request = self.client.get(&self.url);
        if let Some(bounds) = bounds {
            let bbox = format!(
                "{},{},{},{}",
                bounds.min().x,
                bounds.min().y,
                bounds.max().x,
                bounds.max().y
            );
            request = request.query(&[("bbox", bbox)]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(OverlayError::Status(response.status()));
        }

        let sites: Vec<LandingSite> = response.json().await?;
        info!("Fetched {} landing sites from '{}'", sites.len(), self.url);
        Ok(sites)
    }
}

enum Master {
    Empty,
    Loading,
    Loaded(PointIndex<LandingSite>),
}

/// Master collection plus the viewport-scoped subset.
pub struct SpatialOverlayCache {
    enabled: bool,
    master: Master,
    subset: Vec<LandingSite>,
    padding: f64,
    fetches: u64,
}

impl SpatialOverlayCache {
    pub fn new(padding: f64) -> Self {
        Self {
            enabled: false,
            master: Master::Empty,
            subset: Vec::new(),
            padding,
            fetches: 0,
        }
    }

    /// Turns the overlay on. Returns `true` if the caller has to fetch the
    /// master collection, which happens at most once per loaded session.
    pub fn enable(&mut self) -> bool {
        self.enabled = true;
        match self.master {
            Master::Empty => {
                self.master = Master::Loading;
                self.fetches += 1;
                debug!("Overlay enabled, fetching landing sites");
                true
            }
            Master::Loading | Master::Loaded(_) => false,
        }
    }

    /// Turns the overlay off and drops the subset. The master stays.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.subset.clear();
    }

    /// Stores the fetched master. With `bounds` the subset is computed right away.
    /// Returns whether the subset changed.
    pub fn load_finished(
        &mut self,
        result: Result<Vec<LandingSite>, OverlayError>,
        bounds: Option<&Rect>,
    ) -> bool {
        match result {
            Ok(sites) => {
                self.master = Master::Loaded(PointIndex::new(sites));
                match bounds {
                    Some(bounds) => self.on_settled(bounds),
                    None => false,
                }
            }
            Err(err) => {
                warn!("Failed to load landing sites, overlay stays empty: {err}");
                self.master = Master::Empty;
                false
            }
        }
    }

    /// Refilters the master against the padded `bounds`. Returns whether the
    /// subset was recomputed.
    pub fn on_settled(&mut self, bounds: &Rect) -> bool {
        if !self.enabled {
            return false;
        }
        let Master::Loaded(index) = &self.master else {
            return false;
        };

        let padded = pad_rect(bounds, self.padding);
        self.subset = index
            .locate_in_rect(&padded)
            .into_iter()
            .cloned()
            .collect();
        debug!(
            "Overlay subset: {} of {} landing sites",
            self.subset.len(),
            index.len()
        );
        true
    }

    pub fn subset(&self) -> &[LandingSite] {
        &self.subset
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.master, Master::Loaded(_))
    }

    pub fn master_len(&self) -> usize {
        match &self.master {
            Master::Loaded(index) => index.len(),
            _ => 0,
        }
    }

    /// Number of master fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches
    }
}

/// Site markers currently drawn on the surface.
#[derive(Debug, Default)]
pub struct SiteLayer {
    handles: Vec<MarkerHandle>,
}

impl SiteLayer {
    pub fn redraw<S: MapSurface>(&mut self, surface: &mut S, sites: &[LandingSite]) {
        self.clear(surface);

        let glyph = GlyphSize::for_zoom(surface.zoom());
        self.handles = sites
            .iter()
            .map(|site| {
                surface.add_marker(Marker::Site {
                    position: site.position(),
                    icao_code: site.icao_code.clone(),
                    name: site.name.clone(),
                    glyph,
                })
            })
            .collect();
    }

    pub fn clear<S: MapSurface>(&mut self, surface: &mut S) {
        for handle in self.handles.drain(..) {
            surface.remove_marker(handle);
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
