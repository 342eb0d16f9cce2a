use std::time::Duration;

use geo::{Point, Rect};
use tracing::trace;

use crate::{surface::MapSurface, timer::TimerHandle, types::Viewport};

/// Debounces camera movement into "viewport settled" signals.
///
/// Each move or zoom end restarts the timer. Only a timer carrying the current
/// generation may settle, and the viewport is read from the surface when it
/// fires, so a burst of changes yields one signal with the final camera.
#[derive(Debug)]
pub struct ViewportController {
    debounce: Duration,
    generation: u64,
    timer: Option<TimerHandle>,
    last_settled: Option<Viewport>,
    settled_count: u64,
}

impl ViewportController {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            generation: 0,
            timer: None,
            last_settled: None,
            settled_count: 0,
        }
    }

    /// Cancels the running timer and arms a new one through `schedule`, which
    /// receives the delay and the generation the timer has to report back.
    pub fn camera_changed(&mut self, schedule: impl FnOnce(Duration, u64) -> TimerHandle) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.timer = Some(schedule(self.debounce, self.generation));
    }

    /// Handles a fired timer. Returns the settled viewport unless the timer was stale.
    pub fn settle<S: MapSurface>(&mut self, generation: u64, surface: &S) -> Option<Viewport> {
        if generation != self.generation {
            trace!(
                "Ignoring settle of generation {generation}, current is {}",
                self.generation
            );
            return None;
        }
        self.timer = None;

        let viewport = surface.viewport();
        self.last_settled = Some(viewport.clone());
        self.settled_count += 1;
        Some(viewport)
    }

    /// Centers on `center` without zooming out below `min_zoom`.
    pub fn recenter<S: MapSurface>(&self, surface: &mut S, center: Point, min_zoom: u8) {
        let zoom = surface.zoom().max(min_zoom);
        surface.set_view(center, zoom);
    }

    pub fn set_view<S: MapSurface>(&self, surface: &mut S, center: Point, zoom: u8) {
        surface.set_view(center, zoom);
    }

    pub fn bounds<S: MapSurface>(&self, surface: &S) -> Rect {
        surface.bounds()
    }

    pub fn is_settling(&self) -> bool {
        self.timer.is_some()
    }

    pub fn last_settled(&self) -> Option<&Viewport> {
        self.last_settled.as_ref()
    }

    pub fn settled_count(&self) -> u64 {
        self.settled_count
    }
}
