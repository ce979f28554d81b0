//! Type-keyed publish/subscribe
//!
//! Every event is a plain Rust type implementing [`Event`]. The type is the
//! registry key and the value is the payload, so a handler registered for
//! [`StepAdvanced`] can only ever see step positions.
//!
//! Handlers run synchronously on the publishing thread. A step event
//! published by the timeline clock is therefore delivered on the timer
//! thread; subscribers that own thread-bound state must hand the value over
//! to their own thread (see `ui::StepFeed`).

use log::{error, trace};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Marker for types that can travel over the [`EventBus`].
pub trait Event: Any + Send + Sync {}

/// The timeline advanced to the carried position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepAdvanced(pub u32);

/// A tempo control asked for a new BPM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoChanged(pub u32);

/// Loop mode was flipped; carries the new value for indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopToggled(pub bool);

/// The user asked for every placed note to be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotesCleared;

/// An editing tool was picked; carries its panel index for the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSelected(pub i32);

impl Event for StepAdvanced {}
impl Event for TempoChanged {}
impl Event for LoopToggled {}
impl Event for NotesCleared {}
impl Event for ToolSelected {}

/// Token returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    key: TypeId,
    serial: u64,
}

type ErasedHandler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

struct Registration {
    serial: u64,
    handler: ErasedHandler,
}

#[derive(Default)]
pub struct EventBus {
    registry: Mutex<HashMap<TypeId, Vec<Registration>>>,
    next_serial: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of type `E`.
    ///
    /// Registering the same closure twice yields two independent
    /// subscriptions, each of which fires on every publish.
    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let key = TypeId::of::<E>();
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let handler: ErasedHandler = Arc::new(move |payload: &dyn Any| {
            if let Some(event) = payload.downcast_ref::<E>() {
                handler(event);
            }
        });

        self.registry()
            .entry(key)
            .or_default()
            .push(Registration { serial, handler });
        trace!(
            "Subscribed #{} to {}",
            serial,
            std::any::type_name::<E>()
        );

        SubscriptionId { key, serial }
    }

    /// Removes a subscription. Returns `false` when it was not registered,
    /// which is not an error.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry();
        let Some(handlers) = registry.get_mut(&id.key) else {
            return false;
        };

        let before = handlers.len();
        handlers.retain(|registration| registration.serial != id.serial);
        let removed = handlers.len() != before;

        if handlers.is_empty() {
            registry.remove(&id.key);
        }
        removed
    }

    /// Invokes every handler registered for `E`, in registration order.
    ///
    /// A panicking handler is logged and skipped; the remaining handlers
    /// still receive the event.
    pub fn publish<E: Event>(&self, event: &E) {
        // Snapshot so handlers can re-enter the bus.
        let handlers: Vec<ErasedHandler> = match self.registry().get(&TypeId::of::<E>()) {
            Some(handlers) => handlers
                .iter()
                .map(|registration| Arc::clone(&registration.handler))
                .collect(),
            None => return,
        };

        for handler in handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(event as &dyn Any)));
            if outcome.is_err() {
                error!(
                    "Subscriber panicked while handling {}",
                    std::any::type_name::<E>()
                );
            }
        }
    }

    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.registry()
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<TypeId, Vec<Registration>>> {
        // Handlers never run under this lock, so poisoning cannot leave it half-updated.
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
