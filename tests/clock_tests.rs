use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use stepsyncrs::{
    Bpm, EventBus, ManualClockSource, RunState, SaveFile, Saveable, StepAdvanced, TempoChanged,
    ThreadTimer, TimelineClock, TimelineOptions,
};

struct Harness {
    bus: Arc<EventBus>,
    source: Arc<ManualClockSource>,
    clock: TimelineClock,
    steps: Arc<Mutex<Vec<u32>>>,
}

impl Harness {
    fn new(options: TimelineOptions) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let bus = Arc::new(EventBus::new());
        let source = Arc::new(ManualClockSource::new());
        let clock = TimelineClock::new(bus.clone(), source.clone(), options);

        let steps = Arc::new(Mutex::new(Vec::new()));
        let recorded = steps.clone();
        bus.subscribe(move |event: &StepAdvanced| recorded.lock().unwrap().push(event.0));

        Harness {
            bus,
            source,
            clock,
            steps,
        }
    }

    fn looping() -> Self {
        Self::new(TimelineOptions::default())
    }

    fn one_shot() -> Self {
        Self::new(TimelineOptions {
            loop_enabled: false,
            ..TimelineOptions::default()
        })
    }

    fn take_steps(&self) -> Vec<u32> {
        std::mem::take(&mut *self.steps.lock().unwrap())
    }
}

#[test]
fn test_start_from_stopped_resets_position() {
    let h = Harness::looping();
    h.clock.start().unwrap();
    h.source.fire_n(5);
    assert_eq!(h.clock.position(), 5);

    h.clock.stop();
    assert_eq!(h.clock.position(), 5);

    h.clock.start().unwrap();
    assert_eq!(h.clock.position(), 0);
    h.source.fire();
    assert_eq!(h.clock.position(), 1);
}

#[test]
fn test_pause_then_start_preserves_position() {
    let h = Harness::looping();
    h.clock.start().unwrap();
    h.source.fire_n(7);

    h.clock.pause();
    assert_eq!(h.clock.run_state(), RunState::Paused);
    assert!(!h.source.fire());
    assert_eq!(h.clock.position(), 7);

    h.clock.start().unwrap();
    assert_eq!(h.clock.run_state(), RunState::Running);
    assert_eq!(h.clock.position(), 7);

    h.source.fire();
    assert_eq!(h.take_steps(), (1..=8).collect::<Vec<_>>());
}

#[test]
fn test_loop_boundary_publishes_one_after_reset() {
    let h = Harness::looping();
    h.clock.start().unwrap();

    let max_length = h.clock.max_length();
    assert_eq!(max_length, 29);
    assert_eq!(h.source.fire_n(max_length as usize + 1), 30);

    let mut expected: Vec<u32> = (1..=29).collect();
    expected.push(1);
    assert_eq!(h.take_steps(), expected);
    assert_eq!(h.clock.run_state(), RunState::Running);
}

#[test]
fn test_loop_continues_across_several_cycles() {
    let h = Harness::new(TimelineOptions {
        max_length: 3,
        ..TimelineOptions::default()
    });
    h.clock.start().unwrap();
    h.source.fire_n(9);
    assert_eq!(h.take_steps(), vec![1, 2, 3, 1, 2, 3, 1, 2, 3]);
}

#[test]
fn test_without_loop_clock_stops_at_boundary() {
    let h = Harness::one_shot();
    h.clock.start().unwrap();

    h.source.fire_n(29);
    assert_eq!(h.clock.position(), 29);
    assert_eq!(h.clock.run_state(), RunState::Running);

    // The overflow tick stops the clock without publishing.
    assert!(h.source.fire());
    assert_eq!(h.clock.run_state(), RunState::Stopped);
    assert!(!h.source.is_armed());
    assert_eq!(h.source.fire_n(5), 0);
    assert_eq!(h.take_steps(), (1..=29).collect::<Vec<_>>());

    h.clock.start().unwrap();
    assert_eq!(h.clock.position(), 0);
    h.source.fire();
    assert_eq!(h.take_steps(), vec![1]);
}

#[test]
fn test_toggle_loop_does_not_touch_transport() {
    let h = Harness::looping();
    h.clock.start().unwrap();
    h.source.fire_n(3);

    assert!(!h.clock.toggle_loop());
    assert_eq!(h.clock.run_state(), RunState::Running);
    assert_eq!(h.clock.position(), 3);
    assert!(h.clock.toggle_loop());
}

#[test]
fn test_toggling_loop_off_mid_run_stops_at_boundary() {
    let h = Harness::new(TimelineOptions {
        max_length: 4,
        ..TimelineOptions::default()
    });
    h.clock.start().unwrap();
    h.source.fire_n(2);
    h.clock.toggle_loop();
    h.source.fire_n(10);

    assert_eq!(h.take_steps(), vec![1, 2, 3, 4]);
    assert_eq!(h.clock.run_state(), RunState::Stopped);
}

#[test]
fn test_pause_and_stop_are_idempotent() {
    let h = Harness::looping();
    h.clock.start().unwrap();
    h.source.fire_n(4);

    h.clock.pause();
    h.clock.pause();
    assert_eq!(h.clock.run_state(), RunState::Paused);
    assert_eq!(h.clock.position(), 4);

    h.clock.stop();
    h.clock.stop();
    assert_eq!(h.clock.run_state(), RunState::Stopped);
    assert_eq!(h.clock.position(), 4);
    assert!(!h.source.is_armed());
}

#[test]
fn test_pause_while_stopped_keeps_reset_on_start() {
    let h = Harness::looping();
    h.clock.start().unwrap();
    h.source.fire_n(6);
    h.clock.stop();

    h.clock.pause();
    assert_eq!(h.clock.run_state(), RunState::Stopped);

    h.clock.start().unwrap();
    assert_eq!(h.clock.position(), 0);
}

#[test]
fn test_tempo_change_applies_after_interval_in_flight() {
    let h = Harness::looping();
    h.clock.start().unwrap();

    h.clock.change_tempo(120).unwrap();
    assert_eq!(h.clock.bpm(), 120);
    h.source.fire();

    assert_eq!(
        h.source.requested_intervals(),
        vec![Duration::from_millis(1000), Duration::from_millis(500)]
    );
}

#[test]
fn test_tempo_changed_event_updates_clock() {
    let h = Harness::looping();
    h.bus.publish(&TempoChanged(70));
    assert_eq!(h.clock.bpm(), 70);
    assert_eq!(h.clock.tick_interval(), Duration::from_millis(857));

    h.bus.publish(&TempoChanged(0));
    assert_eq!(h.clock.bpm(), 70);
}

#[test]
fn test_tick_interval_matches_bpm() {
    let h = Harness::looping();
    for bpm in [60, 70, 90, 128, 333] {
        h.clock.change_tempo(bpm).unwrap();
        assert_eq!(
            h.clock.tick_interval(),
            Duration::from_millis(u64::from(60_000 / bpm))
        );
    }
    assert!(h.clock.change_tempo(0).is_err());
}

#[test]
fn test_save_load_round_trips_bpm_only() {
    let h = Harness::looping();
    h.clock.change_tempo(133).unwrap();
    h.clock.start().unwrap();
    h.source.fire_n(3);

    let mut file = SaveFile::default();
    h.clock.save(&mut file);
    assert_eq!(file.bpm, 133);

    let other = Harness::looping();
    other.clock.start().unwrap();
    other.source.fire_n(11);
    other.clock.pause();
    other.clock.load(&file).unwrap();

    assert_eq!(other.clock.bpm(), 133);
    assert_eq!(other.clock.position(), 11);
    assert_eq!(other.clock.run_state(), RunState::Paused);
}

#[test]
fn test_load_rejects_zero_bpm() {
    let h = Harness::looping();
    let file = SaveFile {
        bpm: 0,
        ..SaveFile::default()
    };
    assert!(h.clock.load(&file).is_err());
    assert_eq!(h.clock.bpm(), 60);
}

#[test]
fn test_remove_listener_detaches_everything() {
    let h = Harness::looping();
    assert_eq!(h.bus.subscriber_count::<TempoChanged>(), 1);

    h.clock.start().unwrap();
    h.source.fire_n(2);
    h.clock.remove_listener();
    h.clock.remove_listener();

    assert_eq!(h.bus.subscriber_count::<TempoChanged>(), 0);
    assert_eq!(h.clock.run_state(), RunState::Stopped);
    assert!(!h.source.fire());

    h.bus.publish(&TempoChanged(200));
    assert_eq!(h.clock.bpm(), 60);
    assert_eq!(h.take_steps(), vec![1, 2]);
}

#[test]
fn test_remove_listener_before_start_is_safe() {
    let h = Harness::looping();
    h.clock.remove_listener();
    assert!(h.clock.is_detached());
    assert_eq!(h.clock.run_state(), RunState::Stopped);
}

#[test]
fn test_subscriber_can_stop_clock_from_tick() {
    let h = Harness::looping();
    let clock = Arc::new(h.clock);
    let weak = Arc::downgrade(&clock);
    h.bus.subscribe(move |event: &StepAdvanced| {
        if event.0 == 3 {
            if let Some(clock) = weak.upgrade() {
                clock.stop();
            }
        }
    });

    clock.start().unwrap();
    h.source.fire_n(10);
    assert_eq!(clock.run_state(), RunState::Stopped);
    assert_eq!(clock.position(), 3);
    assert_eq!(h.steps.lock().unwrap().clone(), vec![1, 2, 3]);
}

fn threaded_clock(bpm: u32) -> (TimelineClock, Arc<Mutex<Vec<u32>>>) {
    let bus = Arc::new(EventBus::new());
    let clock = TimelineClock::new(
        bus.clone(),
        Arc::new(ThreadTimer::new()),
        TimelineOptions {
            bpm: Bpm::new(bpm).unwrap(),
            ..TimelineOptions::default()
        },
    );
    let steps = Arc::new(Mutex::new(Vec::new()));
    let recorded = steps.clone();
    bus.subscribe(move |event: &StepAdvanced| recorded.lock().unwrap().push(event.0));
    (clock, steps)
}

fn wait_for(steps: &Mutex<Vec<u32>>, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while steps.lock().unwrap().len() < count && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_threaded_clock_ticks_on_background_thread() {
    // 6000 BPM -> 10 ms per step
    let (clock, steps) = threaded_clock(6000);
    clock.start().unwrap();
    wait_for(&steps, 3);
    clock.pause();
    // Let a step committed just before the pause finish publishing.
    thread::sleep(Duration::from_millis(20));

    let recorded = steps.lock().unwrap().clone();
    assert!(recorded.len() >= 3);
    assert_eq!(recorded[..3], [1, 2, 3]);
    assert_eq!(clock.position() as usize, recorded.len());
}

#[test]
fn test_threaded_clock_stays_silent_after_pause() {
    let (clock, steps) = threaded_clock(6000);
    clock.start().unwrap();
    wait_for(&steps, 2);
    clock.pause();

    let position = clock.position();
    let count = steps.lock().unwrap().len();
    thread::sleep(Duration::from_millis(60));

    assert_eq!(clock.position(), position);
    assert!(steps.lock().unwrap().len() <= count + 1);
    assert_eq!(clock.run_state(), RunState::Paused);
}

#[test]
fn test_concurrent_control_leaves_consistent_state() {
    let (clock, steps) = threaded_clock(60_000);
    let clock = Arc::new(clock);

    let mut handles = vec![];
    for worker in 0..4 {
        let clock = clock.clone();
        handles.push(thread::spawn(move || {
            for i in 0..200 {
                match (worker + i) % 4 {
                    0 => clock.start().unwrap(),
                    1 => clock.pause(),
                    2 => clock.stop(),
                    _ => {
                        clock.toggle_loop();
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    clock.stop();
    let position = clock.position();
    assert!(position <= clock.max_length());
    assert_eq!(clock.run_state(), RunState::Stopped);

    thread::sleep(Duration::from_millis(20));
    assert_eq!(clock.position(), position);
    assert!(steps
        .lock()
        .unwrap()
        .iter()
        .all(|step| (1..=clock.max_length()).contains(step)));
}
