use std::time::Duration;

use tracing::{debug, instrument};

use crate::{
    markers::MarkerRegistry, surface::MapSurface, timer::TimerHandle, types::EventId,
};

/// Timer payloads of the focus sequence. The generation ties them to the
/// sequence that scheduled them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusTimer {
    Retry(u64),
    Open(u64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FocusState {
    Idle,
    Waiting { attempt: u32 },
    Opening,
    Done,
    GaveUp,
}

#[derive(Clone, Copy, Debug)]
pub struct FocusSettings {
    pub retry: Duration,
    pub max_attempts: u32,
    pub open_delay: Duration,
    pub detail_zoom: u8,
}

/// Centers the map on one event marker and opens its callout, waiting for the
/// marker to exist first.
#[derive(Debug)]
pub struct FocusSequencer {
    settings: FocusSettings,
    target: Option<EventId>,
    state: FocusState,
    generation: u64,
    timer: Option<TimerHandle>,
}

impl FocusSequencer {
    pub fn new(settings: FocusSettings) -> Self {
        Self {
            settings,
            target: None,
            state: FocusState::Idle,
            generation: 0,
            timer: None,
        }
    }

    /// Starts a sequence for `target`, abandoning any running one.
    pub fn start(&mut self, target: EventId) {
        self.reset();
        debug!("Focusing event {target}");
        self.target = Some(target);
        self.state = FocusState::Waiting { attempt: 0 };
    }

    /// Cancels the pending timer and forgets the target.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.timer = None;
        self.target = None;
        self.state = FocusState::Idle;
    }

    /// One lookup of the target marker. `passes` is the number of completed
    /// reconciliation passes; no lookup is trusted before the first one.
    #[instrument(skip_all, fields(target = ?self.target))]
    pub fn attempt(
        &mut self,
        registry: &MarkerRegistry,
        passes: u64,
        surface: &mut dyn MapSurface,
        schedule: impl FnOnce(Duration, FocusTimer) -> TimerHandle,
    ) -> &FocusState {
        let (Some(target), FocusState::Waiting { attempt }) = (&self.target, &self.state) else {
            return &self.state;
        };
        let attempt = attempt + 1;

        let found = (passes > 0)
            .then(|| registry.get(target))
            .flatten()
            .map(|marker| marker.position);

        self.state = match found {
            Some(position) => {
                surface.set_view(position, self.settings.detail_zoom);
                self.timer = Some(schedule(
                    self.settings.open_delay,
                    FocusTimer::Open(self.generation),
                ));
                FocusState::Opening
            }
            None if attempt < self.settings.max_attempts => {
                self.timer = Some(schedule(
                    self.settings.retry,
                    FocusTimer::Retry(self.generation),
                ));
                FocusState::Waiting { attempt }
            }
            None => {
                debug!("Focus target not found after {attempt} attempts, giving up");
                self.timer = None;
                FocusState::GaveUp
            }
        };
        &self.state
    }

    /// Handles a fired timer. Stale timers are ignored.
    pub fn fire(
        &mut self,
        timer: FocusTimer,
        registry: &MarkerRegistry,
        passes: u64,
        surface: &mut dyn MapSurface,
        schedule: impl FnOnce(Duration, FocusTimer) -> TimerHandle,
    ) {
        match timer {
            FocusTimer::Retry(generation) if generation == self.generation => {
                self.timer = None;
                self.attempt(registry, passes, surface, schedule);
            }
            FocusTimer::Open(generation)
                if generation == self.generation && self.state == FocusState::Opening =>
            {
                self.timer = None;
                // Rebuilds replace handles, so look the marker up again.
                if let Some(marker) = self.target.as_ref().and_then(|id| registry.get(id)) {
                    surface.open_callout(marker.handle);
                }
                self.state = FocusState::Done;
            }
            _ => {}
        }
    }

    pub fn state(&self) -> &FocusState {
        &self.state
    }

    pub fn target(&self) -> Option<&EventId> {
        self.target.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }
}
