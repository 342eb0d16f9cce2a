//! Marker reconciliation.
//!
//! Every pass derives the wanted marker layer from the current inputs
//! ([`Desired`]) and hands it to a [`ReconcileStrategy`] which brings the
//! surface and the [`MarkerRegistry`] in line with it. After a pass the
//! registry holds exactly one entry per mappable, category matching event.

use geo::Point;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, instrument};

use crate::{
    surface::{Callout, MapSurface, MarkerHandle},
    types::{Event, EventId, ReferenceLocation, distance_m},
};

mod strategy;

pub use strategy::{Diff, Rebuild, ReconcileStrategy};

pub const FULL_OPACITY: f32 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub struct EventMarker {
    pub handle: MarkerHandle,
    pub position: Point,
    pub opacity: f32,
    pub callout: Callout,
}

/// Handles registered by the last pass.
#[derive(Debug, Default)]
pub struct MarkerRegistry {
    events: FxHashMap<EventId, EventMarker>,
    reference: Option<(MarkerHandle, ReferenceLocation)>,
    circle: Option<(MarkerHandle, RadiusCircle)>,
}

impl MarkerRegistry {
    pub fn get(&self, id: &EventId) -> Option<&EventMarker> {
        self.events.get(id)
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.events.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &EventId> {
        self.events.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EventId, &EventMarker)> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn reference_handle(&self) -> Option<MarkerHandle> {
        self.reference.as_ref().map(|(handle, _)| *handle)
    }

    pub fn circle_handle(&self) -> Option<MarkerHandle> {
        self.circle.as_ref().map(|(handle, _)| *handle)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadiusCircle {
    pub center: Point,
    pub radius_m: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DesiredMarker {
    pub id: EventId,
    pub position: Point,
    pub opacity: f32,
    pub callout: Callout,
}

/// The marker layer one pass has to produce.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Desired {
    pub circle: Option<RadiusCircle>,
    pub reference: Option<ReferenceLocation>,
    pub events: Vec<DesiredMarker>,
}

/// Inputs of a reconciliation pass.
#[derive(Clone, Copy, Debug)]
pub struct ReconcileInput<'a> {
    pub events: &'a [Event],
    /// Active category tag, `None` or empty for all.
    pub category: Option<&'a str>,
    pub reference: Option<&'a ReferenceLocation>,
    pub radius_km: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerStyle {
    pub dimmed_opacity: f32,
    pub description_limit: usize,
}

impl Desired {
    pub fn from_input(input: &ReconcileInput<'_>, style: &MarkerStyle) -> Self {
        let radius_m = input.radius_km * 1000.0;
        let circle = input
            .reference
            .filter(|_| radius_m > 0.0)
            .map(|reference| RadiusCircle {
                center: reference.position(),
                radius_m,
            });

        // First occurrence of an id wins.
        let mut seen = FxHashSet::default();
        let events = input
            .events
            .iter()
            .filter(|event| event.matches_category(input.category))
            .filter(|event| seen.insert(&event.id))
            .filter_map(|event| {
                let position = event.position()?;
                Some(DesiredMarker {
                    id: event.id.clone(),
                    position,
                    opacity: opacity_for(
                        &position,
                        input.reference,
                        input.radius_km,
                        style.dimmed_opacity,
                    ),
                    callout: callout_for(event, style.description_limit),
                })
            })
            .collect();

        Self {
            circle,
            reference: input.reference.cloned(),
            events,
        }
    }
}

/// Dimmed iff a reference and a positive radius are set and the event lies
/// farther away than the radius.
pub fn opacity_for(
    position: &Point,
    reference: Option<&ReferenceLocation>,
    radius_km: f64,
    dimmed: f32,
) -> f32 {
    match reference {
        Some(reference) if radius_km > 0.0 => {
            if distance_m(&reference.position(), position) > radius_km * 1000.0 {
                dimmed
            } else {
                FULL_OPACITY
            }
        }
        _ => FULL_OPACITY,
    }
}

pub fn callout_for(event: &Event, description_limit: usize) -> Callout {
    Callout {
        title: event.title.clone(),
        description: truncate(&event.description, description_limit),
        date: event.date.clone(),
        start_time: event.start_time.clone(),
        end_time: event.end_time.clone(),
        category: event.event_type.clone(),
        image_url: event.image_url.clone(),
    }
}

fn truncate(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let mut truncated: String = text.chars().take(limit).collect();
    truncated.truncate(truncated.trim_end().len());
    truncated.push('…');
    truncated
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    Completed,
    /// Another pass was still running.
    Dropped,
}

/// Owns the registry and serializes reconciliation passes.
pub struct MarkerEngine {
    registry: MarkerRegistry,
    strategy: Box<dyn ReconcileStrategy>,
    style: MarkerStyle,
    busy: bool,
    passes: u64,
}

impl MarkerEngine {
    pub fn new(style: MarkerStyle) -> Self {
        Self::with_strategy(style, Box::new(Rebuild))
    }

    pub fn with_strategy(style: MarkerStyle, strategy: Box<dyn ReconcileStrategy>) -> Self {
        Self {
            registry: MarkerRegistry::default(),
            strategy,
            style,
            busy: false,
            passes: 0,
        }
    }

    /// Runs one pass unless one is already in flight, in which case the call is
    /// dropped; the next trigger re-evaluates the state anyway.
    ///
    /// A pass is in flight while a surface callback reenters the controller
    /// from inside `apply`.
    #[instrument(skip_all, fields(events = input.events.len(), strategy = self.strategy.name()))]
    pub fn reconcile(
        &mut self,
        surface: &mut dyn MapSurface,
        input: &ReconcileInput<'_>,
    ) -> PassOutcome {
        if self.busy {
            debug!("Reconciliation already running, dropping pass");
            return PassOutcome::Dropped;
        }
        self.busy = true;

        let desired = Desired::from_input(input, &self.style);
        self.strategy.apply(&mut self.registry, surface, desired);

        self.passes += 1;
        self.busy = false;
        debug!(
            "Pass {} done: {} event markers",
            self.passes,
            self.registry.len()
        );
        PassOutcome::Completed
    }

    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    /// Number of completed passes.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }
}
