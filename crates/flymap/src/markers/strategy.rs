use rustc_hash::FxHashSet;
use tracing::trace;

use crate::surface::{MapSurface, Marker, MarkerHandle};

use super::{Desired, DesiredMarker, EventMarker, MarkerRegistry, RadiusCircle};

/// Brings surface and registry in line with a [`Desired`] layer.
pub trait ReconcileStrategy {
    fn name(&self) -> &'static str;

    fn apply(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn MapSurface,
        desired: Desired,
    );
}

/// Removes everything the previous pass registered and draws the layer anew.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rebuild;

impl ReconcileStrategy for Rebuild {
    fn name(&self) -> &'static str {
        "rebuild"
    }

    fn apply(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn MapSurface,
        desired: Desired,
    ) {
        if let Some((handle, _)) = registry.circle.take() {
            surface.remove_marker(handle);
        }
        if let Some((handle, _)) = registry.reference.take() {
            surface.remove_marker(handle);
        }
        for (_, marker) in registry.events.drain() {
            surface.remove_marker(marker.handle);
        }

        registry.circle = desired
            .circle
            .map(|circle| (add_circle(surface, &circle), circle));
        registry.reference = desired.reference.map(|reference| {
            let handle = surface.add_marker(Marker::Reference {
                position: reference.position(),
                source: reference.source(),
            });
            (handle, reference)
        });
        for wanted in desired.events {
            let handle = add_event(surface, &wanted);
            registry.events.insert(wanted.id.clone(), entry(handle, wanted));
        }
    }
}

/// Keeps markers whose content is unchanged and only touches the difference.
/// Opacity changes are applied in place.
#[derive(Clone, Copy, Debug, Default)]
pub struct Diff;

impl ReconcileStrategy for Diff {
    fn name(&self) -> &'static str {
        "diff"
    }

    fn apply(
        &mut self,
        registry: &mut MarkerRegistry,
        surface: &mut dyn MapSurface,
        desired: Desired,
    ) {
        let current_circle = registry.circle.as_ref().map(|(_, circle)| circle);
        if current_circle != desired.circle.as_ref() {
            if let Some((handle, _)) = registry.circle.take() {
                surface.remove_marker(handle);
            }
            registry.circle = desired
                .circle
                .map(|circle| (add_circle(surface, &circle), circle));
        }

        let current_reference = registry.reference.as_ref().map(|(_, reference)| reference);
        if current_reference != desired.reference.as_ref() {
            if let Some((handle, _)) = registry.reference.take() {
                surface.remove_marker(handle);
            }
            registry.reference = desired.reference.map(|reference| {
                let handle = surface.add_marker(Marker::Reference {
                    position: reference.position(),
                    source: reference.source(),
                });
                (handle, reference)
            });
        }

        let wanted_ids: FxHashSet<_> = desired
            .events
            .iter()
            .map(|wanted| wanted.id.clone())
            .collect();
        registry.events.retain(|id, marker| {
            let keep = wanted_ids.contains(id);
            if !keep {
                surface.remove_marker(marker.handle);
            }
            keep
        });

        let mut added = 0;
        let mut restyled = 0;
        for wanted in desired.events {
            match registry.events.get_mut(&wanted.id) {
                Some(current)
                    if current.position == wanted.position && current.callout == wanted.callout =>
                {
                    if current.opacity != wanted.opacity {
                        surface.set_marker_opacity(current.handle, wanted.opacity);
                        current.opacity = wanted.opacity;
                        restyled += 1;
                    }
                }
                Some(current) => {
                    surface.remove_marker(current.handle);
                    let handle = add_event(surface, &wanted);
                    *current = entry(handle, wanted);
                    added += 1;
                }
                None => {
                    let handle = add_event(surface, &wanted);
                    registry
                        .events
                        .insert(wanted.id.clone(), entry(handle, wanted));
                    added += 1;
                }
            }
        }
        trace!("Diff pass added {added} and restyled {restyled} event markers");
    }
}

fn add_circle(surface: &mut dyn MapSurface, circle: &RadiusCircle) -> MarkerHandle {
    surface.add_marker(Marker::RadiusCircle {
        center: circle.center,
        radius_m: circle.radius_m,
    })
}

fn add_event(surface: &mut dyn MapSurface, wanted: &DesiredMarker) -> MarkerHandle {
    surface.add_marker(Marker::Event {
        id: wanted.id.clone(),
        position: wanted.position,
        callout: wanted.callout.clone(),
        opacity: wanted.opacity,
    })
}

fn entry(handle: MarkerHandle, wanted: DesiredMarker) -> EventMarker {
    EventMarker {
        handle,
        position: wanted.position,
        opacity: wanted.opacity,
        callout: wanted.callout,
    }
}

#[cfg(test)]
mod test {
    use crate::{
        markers::{MarkerEngine, MarkerStyle, ReconcileInput},
        surface::{HeadlessSurface, MapSurface, SurfaceCall},
        types::{Event, ReferenceLocation, lat_lon},
    };

    use super::Diff;

    fn event(id: &str, lat: &str, lon: &str) -> Event {
        Event {
            id: id.into(),
            lat: Some(lat.to_string()),
            lon: Some(lon.to_string()),
            title: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn diff_only_touches_changes() {
        let mut surface = HeadlessSurface::new(800, 600);
        surface.initialize(lat_lon(48.0, 9.0), 8).unwrap();
        let mut engine = MarkerEngine::with_strategy(
            MarkerStyle {
                dimmed_opacity: 0.35,
                description_limit: 120,
            },
            Box::new(Diff),
        );
        let reference = ReferenceLocation::Device {
            position: lat_lon(48.0, 9.0),
        };

        let mut events = vec![
            event("near", "48.01", "9.01"),
            event("far", "52.0", "13.0"),
        ];
        engine.reconcile(
            &mut surface,
            &ReconcileInput {
                events: &events,
                category: None,
                reference: Some(&reference),
                radius_km: 50.0,
            },
        );
        surface.clear_calls();

        // Only the radius grows; both events end up inside.
        engine.reconcile(
            &mut surface,
            &ReconcileInput {
                events: &events,
                category: None,
                reference: Some(&reference),
                radius_km: 1000.0,
            },
        );
        let far = engine.registry().get(&"far".into()).unwrap().handle;
        assert!(surface.calls().contains(&SurfaceCall::SetOpacity(far, 1.0)));
        assert_eq!(
            surface
                .calls()
                .iter()
                .filter(|call| matches!(call, SurfaceCall::AddMarker(_)))
                .count(),
            1
        );
        surface.clear_calls();

        events.remove(0);
        engine.reconcile(
            &mut surface,
            &ReconcileInput {
                events: &events,
                category: None,
                reference: Some(&reference),
                radius_km: 1000.0,
            },
        );
        assert_eq!(surface.calls().len(), 1);
        assert!(matches!(surface.calls()[0], SurfaceCall::RemoveMarker(_)));
        assert_eq!(engine.registry().len(), 1);
    }
}
