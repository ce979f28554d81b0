use crate::event_bus::{EventBus, LoopToggled, NotesCleared, StepAdvanced, SubscriptionId};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// Bus events the terminal UI reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    Step(u32),
    Loop(bool),
    Cleared,
}

/// Forwards bus events into a channel drained by the UI thread.
///
/// Step events arrive on the timer thread; the feed only enqueues them so
/// that indicator state is touched from one thread. Dropping the feed
/// unsubscribes it.
pub struct StepFeed {
    bus: Arc<EventBus>,
    subscriptions: Vec<SubscriptionId>,
    events: Receiver<UiEvent>,
}

impl StepFeed {
    pub fn attach(bus: &Arc<EventBus>) -> Self {
        let (tx, events) = channel::unbounded();

        let step_tx = tx.clone();
        let loop_tx = tx.clone();
        let subscriptions = vec![
            bus.subscribe(move |event: &StepAdvanced| {
                let _ = step_tx.send(UiEvent::Step(event.0));
            }),
            bus.subscribe(move |event: &LoopToggled| {
                let _ = loop_tx.send(UiEvent::Loop(event.0));
            }),
            bus.subscribe(move |_: &NotesCleared| {
                let _ = tx.send(UiEvent::Cleared);
            }),
        ];

        StepFeed {
            bus: Arc::clone(bus),
            subscriptions,
            events,
        }
    }

    /// Everything queued so far, without blocking.
    pub fn drain(&self) -> Vec<UiEvent> {
        self.events.try_iter().collect()
    }

    /// Waits up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<UiEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for StepFeed {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
    }
}
