//! Tempo-driven timeline clock
//!
//! The clock walks a bounded position counter forward once per tick and
//! publishes every step as [`StepAdvanced`]. Ticks are delivered by a
//! [`ClockSource`] on its own thread, so all clock state sits behind one
//! mutex shared by the control methods and the tick handler.
//!
//! Each arm of the timer gets a fresh generation number. A tick that arrives
//! for an older generation, or after the clock left `Running`, is dropped.
//! Once `pause`, `stop` or `remove_listener` returns, no further step is
//! committed.

pub mod tempo;
pub mod timer;

pub use tempo::Bpm;
pub use timer::{ClockSource, ManualClockSource, ThreadTimer, TickFn, TimerHandle};

use crate::config::TIMELINE_MAX_LENGTH;
use crate::event_bus::{EventBus, StepAdvanced, SubscriptionId, TempoChanged};
use crate::save::{SaveError, SaveFile, Saveable};
use log::{debug, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("invalid tempo {0} BPM (expected 1..=60000)")]
    InvalidTempo(u32),

    #[error("failed to arm timeline timer: {0}")]
    Timer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Stopped => "stopped",
            RunState::Running => "running",
            RunState::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// Initial clock configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineOptions {
    pub bpm: Bpm,
    /// Last step reached before the loop/stop boundary applies.
    pub max_length: u32,
    pub loop_enabled: bool,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        TimelineOptions {
            bpm: Bpm::default(),
            max_length: TIMELINE_MAX_LENGTH,
            loop_enabled: true,
        }
    }
}

#[derive(Debug)]
struct ClockState {
    bpm: Bpm,
    position: u32,
    max_length: u32,
    loop_enabled: bool,
    run_state: RunState,
    generation: u64,
    timer: Option<TimerHandle>,
    detached: bool,
}

impl ClockState {
    /// Applies the boundary policy, then steps. Returns the published
    /// position, or `None` when the clock stopped at the boundary.
    fn advance(&mut self) -> Option<u32> {
        if self.position >= self.max_length {
            if self.loop_enabled {
                self.position = 0;
            } else {
                self.disarm(RunState::Stopped);
                return None;
            }
        }
        self.position += 1;
        Some(self.position)
    }

    fn disarm(&mut self, next: RunState) {
        self.timer = None;
        self.run_state = next;
    }

    fn accepts_tick(&self, generation: u64) -> bool {
        !self.detached && self.generation == generation && self.run_state == RunState::Running
    }
}

fn lock(state: &Mutex<ClockState>) -> MutexGuard<'_, ClockState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct TimelineClock {
    state: Arc<Mutex<ClockState>>,
    source: Arc<dyn ClockSource>,
    bus: Arc<EventBus>,
    tempo_subscription: Mutex<Option<SubscriptionId>>,
}

impl TimelineClock {
    /// Creates a stopped clock at position 0 and subscribes it to
    /// [`TempoChanged`].
    pub fn new(
        bus: Arc<EventBus>,
        source: Arc<dyn ClockSource>,
        options: TimelineOptions,
    ) -> Self {
        let state = Arc::new(Mutex::new(ClockState {
            bpm: options.bpm,
            position: 0,
            max_length: options.max_length,
            loop_enabled: options.loop_enabled,
            run_state: RunState::Stopped,
            generation: 0,
            timer: None,
            detached: false,
        }));

        let weak_state = Arc::downgrade(&state);
        let subscription = bus.subscribe(move |event: &TempoChanged| {
            apply_tempo_event(&weak_state, event.0);
        });

        info!(
            "Timeline clock created at {} (max length {}, loop {})",
            options.bpm, options.max_length, options.loop_enabled
        );

        TimelineClock {
            state,
            source,
            bus,
            tempo_subscription: Mutex::new(Some(subscription)),
        }
    }

    /// Arms the timer. Resets the position unless resuming from a pause.
    pub fn start(&self) -> Result<(), ClockError> {
        let mut state = lock(&self.state);
        if state.detached {
            warn!("Ignoring start on a detached timeline clock");
            return Ok(());
        }
        if state.run_state == RunState::Running {
            return Ok(());
        }

        let generation = state.generation + 1;
        let handle = self
            .source
            .arm(state.bpm.tick_interval(), self.tick_handler(generation))
            .map_err(|e| ClockError::Timer(e.to_string()))?;

        if state.run_state == RunState::Stopped {
            state.position = 0;
        }
        let resumed = state.run_state == RunState::Paused;
        state.generation = generation;
        state.timer = Some(handle);
        state.run_state = RunState::Running;

        info!(
            "Timeline {} at position {} ({} ms per step)",
            if resumed { "resumed" } else { "started" },
            state.position,
            state.bpm.interval_millis()
        );
        Ok(())
    }

    /// Disarms the timer and keeps the position. No-op unless running.
    pub fn pause(&self) {
        let mut state = lock(&self.state);
        if state.run_state != RunState::Running {
            return;
        }
        state.disarm(RunState::Paused);
        info!("Timeline paused at position {}", state.position);
    }

    /// Disarms the timer; the next start begins from position 0.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        if state.run_state != RunState::Stopped {
            info!("Timeline stopped at position {}", state.position);
        }
        state.disarm(RunState::Stopped);
    }

    /// Flips loop mode and returns the new value.
    pub fn toggle_loop(&self) -> bool {
        let mut state = lock(&self.state);
        state.loop_enabled = !state.loop_enabled;
        info!(
            "Timeline loop {}",
            if state.loop_enabled { "enabled" } else { "disabled" }
        );
        state.loop_enabled
    }

    /// Sets the tempo. A running timer picks the new interval up after the
    /// interval already in flight.
    pub fn change_tempo(&self, bpm: u32) -> Result<(), ClockError> {
        let tempo = Bpm::new(bpm)?;
        lock(&self.state).bpm = tempo;
        info!("Timeline tempo changed to {}", tempo);
        Ok(())
    }

    /// Detaches the tick callback and the tempo subscription.
    ///
    /// Safe to call repeatedly and before any start. The clock is left
    /// stopped and ignores further start requests.
    pub fn remove_listener(&self) {
        let subscription = self
            .tempo_subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(id) = subscription {
            self.bus.unsubscribe(id);
        }

        let mut state = lock(&self.state);
        if !state.detached {
            debug!("Timeline clock listeners removed");
        }
        state.disarm(RunState::Stopped);
        state.detached = true;
    }

    pub fn bpm(&self) -> u32 {
        lock(&self.state).bpm.get()
    }

    pub fn tempo(&self) -> Bpm {
        lock(&self.state).bpm
    }

    pub fn tick_interval(&self) -> Duration {
        lock(&self.state).bpm.tick_interval()
    }

    pub fn position(&self) -> u32 {
        lock(&self.state).position
    }

    pub fn run_state(&self) -> RunState {
        lock(&self.state).run_state
    }

    pub fn is_loop_enabled(&self) -> bool {
        lock(&self.state).loop_enabled
    }

    pub fn max_length(&self) -> u32 {
        lock(&self.state).max_length
    }

    pub fn is_detached(&self) -> bool {
        lock(&self.state).detached
    }

    fn tick_handler(&self, generation: u64) -> TickFn {
        let state = Arc::downgrade(&self.state);
        let bus = Arc::clone(&self.bus);

        Box::new(move || -> Option<Duration> {
            let state = state.upgrade()?;
            let (position, next) = {
                let mut state = lock(&state);
                if !state.accepts_tick(generation) {
                    return None;
                }
                match state.advance() {
                    Some(position) => (position, state.bpm.tick_interval()),
                    None => {
                        info!("Timeline reached its end at position {}", state.position);
                        return None;
                    }
                }
            };

            // Published outside the lock so subscribers may call back in.
            debug!("Timeline step {}", position);
            bus.publish(&StepAdvanced(position));
            Some(next)
        })
    }
}

fn apply_tempo_event(state: &Weak<Mutex<ClockState>>, bpm: u32) {
    let Some(state) = state.upgrade() else {
        return;
    };
    match Bpm::new(bpm) {
        Ok(tempo) => {
            lock(&state).bpm = tempo;
            info!("Timeline tempo changed to {}", tempo);
        }
        Err(e) => warn!("Ignoring tempo change: {}", e),
    }
}

impl Saveable for TimelineClock {
    fn save(&self, file: &mut SaveFile) {
        file.bpm = self.bpm();
    }

    fn load(&self, file: &SaveFile) -> Result<(), SaveError> {
        let tempo = Bpm::new(file.bpm)?;
        lock(&self.state).bpm = tempo;
        info!("Timeline tempo loaded: {}", tempo);
        Ok(())
    }
}

impl Drop for TimelineClock {
    fn drop(&mut self) {
        self.remove_listener();
    }
}
