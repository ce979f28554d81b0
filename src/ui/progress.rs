use super::UiEvent;
use crate::clock::TimelineClock;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

pub fn create_position_progress(max_length: u32) -> ProgressBar {
    let pb = ProgressBar::new(u64::from(max_length));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("⣀⣤⣦⣶⣷⣿ "),
    );
    pb.set_prefix("Step");
    pb
}

pub fn create_transport_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix("Transport");
    pb
}

/// Timeline position bar plus a transport status line.
///
/// Only touched from the thread that drains the [`super::StepFeed`].
pub struct PositionIndicator {
    #[allow(dead_code)]
    multi_progress: MultiProgress,
    position_pb: ProgressBar,
    transport_pb: ProgressBar,
    loop_enabled: bool,
}

impl PositionIndicator {
    pub fn new(max_length: u32, loop_enabled: bool) -> Self {
        Self::with_draw_target(max_length, loop_enabled, ProgressDrawTarget::stderr())
    }

    pub fn hidden(max_length: u32, loop_enabled: bool) -> Self {
        Self::with_draw_target(max_length, loop_enabled, ProgressDrawTarget::hidden())
    }

    fn with_draw_target(max_length: u32, loop_enabled: bool, target: ProgressDrawTarget) -> Self {
        let multi_progress = MultiProgress::with_draw_target(target);
        let position_pb = multi_progress.add(create_position_progress(max_length));
        let transport_pb = multi_progress.add(create_transport_spinner());

        PositionIndicator {
            multi_progress,
            position_pb,
            transport_pb,
            loop_enabled,
        }
    }

    pub fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::Step(position) => self.position_pb.set_position(u64::from(position)),
            UiEvent::Loop(enabled) => self.loop_enabled = enabled,
            UiEvent::Cleared => self.transport_pb.println("Notes cleared"),
        }
    }

    /// Refreshes the bar and status line from the clock's current state.
    ///
    /// Catches position resets that happen without a step event, such as a
    /// restart after stop.
    pub fn refresh(&self, clock: &TimelineClock) {
        self.position_pb.set_position(u64::from(clock.position()));
        self.transport_pb.set_message(format!(
            "BPM: {}, Position: {}, Transport: {}, Loop: {}",
            clock.bpm(),
            clock.position(),
            clock.run_state(),
            if self.loop_enabled { "on" } else { "off" }
        ));
        self.transport_pb.tick();
    }

    pub fn position(&self) -> u64 {
        self.position_pb.position()
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn println(&self, line: impl AsRef<str>) {
        self.transport_pb.println(line);
    }

    pub fn finish(&self) {
        self.position_pb.finish_and_clear();
        self.transport_pb.finish_and_clear();
    }
}
