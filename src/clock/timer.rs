//! Periodic timers that drive the timeline clock
//!
//! A timer is armed with an initial interval and a tick callback. After each
//! elapse the callback returns the interval to wait next, or `None` to end
//! the timer. Dropping the returned [`TimerHandle`] disarms it.

use crate::scheduler::{Scheduler, ThreadScheduler};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::trace;
use std::io;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Tick callback. Returns the next interval, `None` to stop.
pub type TickFn = Box<dyn FnMut() -> Option<Duration> + Send + 'static>;

/// Keeps a timer armed for as long as it is alive.
#[derive(Debug)]
pub struct TimerHandle {
    _cancel: Sender<()>,
}

impl TimerHandle {
    /// Creates a handle and the receiver a timer waits on. The receiver
    /// reports a disconnect as soon as the handle is dropped.
    pub fn pair() -> (TimerHandle, Receiver<()>) {
        let (cancel, cancelled) = channel::bounded(1);
        (TimerHandle { _cancel: cancel }, cancelled)
    }
}

fn is_disarmed(cancelled: &Receiver<()>) -> bool {
    matches!(cancelled.try_recv(), Err(TryRecvError::Disconnected))
}

/// Source of periodic ticks for the timeline clock
pub trait ClockSource: Send + Sync {
    fn arm(&self, interval: Duration, on_elapsed: TickFn) -> io::Result<TimerHandle>;
}

/// Fires ticks from a dedicated background thread.
///
/// Waiting happens on the cancel channel, so disarming wakes the thread
/// immediately instead of letting it sleep out the interval.
#[derive(Debug, Default)]
pub struct ThreadTimer<S = ThreadScheduler> {
    scheduler: S,
}

impl ThreadTimer<ThreadScheduler> {
    pub fn new() -> Self {
        Self::with_scheduler(ThreadScheduler::new())
    }
}

impl<S: Scheduler> ThreadTimer<S> {
    pub fn with_scheduler(scheduler: S) -> Self {
        ThreadTimer { scheduler }
    }
}

impl<S: Scheduler> ClockSource for ThreadTimer<S> {
    fn arm(&self, interval: Duration, mut on_elapsed: TickFn) -> io::Result<TimerHandle> {
        let (handle, cancelled) = TimerHandle::pair();

        self.scheduler.spawn("timeline-timer", move || {
            let mut interval = interval;
            loop {
                match cancelled.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match on_elapsed() {
                        Some(next) => interval = next,
                        None => break,
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            trace!("Timeline timer thread finished");
        })?;

        Ok(handle)
    }
}

struct ManualTimer {
    cancelled: Receiver<()>,
    on_elapsed: TickFn,
}

/// Clock source that only ticks when told to.
///
/// Used for offline rendering and deterministic tests: every [`fire`]
/// behaves like one full interval elapsing on the armed timer.
///
/// [`fire`]: ManualClockSource::fire
#[derive(Default)]
pub struct ManualClockSource {
    armed: Mutex<Option<ManualTimer>>,
    intervals: Mutex<Vec<Duration>>,
}

impl ManualClockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Elapses the armed timer once. Returns `false` when nothing was armed.
    pub fn fire(&self) -> bool {
        let Some(mut timer) = self.slot().take() else {
            return false;
        };
        if is_disarmed(&timer.cancelled) {
            return false;
        }

        if let Some(next) = (timer.on_elapsed)() {
            self.record(next);
            let mut slot = self.slot();
            // The callback may have re-armed or disarmed the clock.
            if slot.is_none() && !is_disarmed(&timer.cancelled) {
                *slot = Some(timer);
            }
        }
        true
    }

    /// Fires up to `count` times, returning how many ticks were delivered.
    pub fn fire_n(&self, count: usize) -> usize {
        (0..count).take_while(|_| self.fire()).count()
    }

    pub fn is_armed(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|timer| !is_disarmed(&timer.cancelled))
    }

    /// Every interval the clock asked for, in order: the arming interval
    /// followed by the one returned from each tick.
    pub fn requested_intervals(&self) -> Vec<Duration> {
        self.intervals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, interval: Duration) {
        self.intervals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(interval);
    }

    fn slot(&self) -> MutexGuard<'_, Option<ManualTimer>> {
        self.armed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ClockSource for ManualClockSource {
    fn arm(&self, interval: Duration, on_elapsed: TickFn) -> io::Result<TimerHandle> {
        let (handle, cancelled) = TimerHandle::pair();
        self.record(interval);
        *self.slot() = Some(ManualTimer {
            cancelled,
            on_elapsed,
        });
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn counting_tick(count: Arc<AtomicUsize>, next: Duration) -> TickFn {
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
            Some(next)
        })
    }

    #[test]
    fn test_manual_source_fires_until_handle_dropped() {
        let source = ManualClockSource::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = source
            .arm(
                Duration::from_millis(500),
                counting_tick(count.clone(), Duration::from_millis(250)),
            )
            .unwrap();

        assert!(source.is_armed());
        assert_eq!(source.fire_n(3), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);

        drop(handle);
        assert!(!source.is_armed());
        assert!(!source.fire());
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(
            source.requested_intervals(),
            vec![
                Duration::from_millis(500),
                Duration::from_millis(250),
                Duration::from_millis(250),
                Duration::from_millis(250),
            ]
        );
    }

    #[test]
    fn test_manual_source_stops_when_callback_returns_none() {
        let source = ManualClockSource::new();
        let _handle = source
            .arm(Duration::from_millis(10), Box::new(|| None))
            .unwrap();

        assert!(source.fire());
        assert!(!source.fire());
    }

    #[test]
    fn test_thread_timer_ticks_and_disarms() {
        let timer = ThreadTimer::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = timer
            .arm(
                Duration::from_millis(5),
                counting_tick(count.clone(), Duration::from_millis(5)),
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while count.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(count.load(Ordering::SeqCst) >= 3);

        drop(handle);
        std::thread::sleep(Duration::from_millis(30));
        let settled = count.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), settled);
    }
}
