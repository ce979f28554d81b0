pub mod cli;
pub mod clock;
pub mod config;
pub mod event_bus;
pub mod logging;
pub mod save;
pub mod scheduler;
pub mod session;
pub mod ui;

pub use cli::Args;
pub use clock::{
    Bpm, ClockError, ClockSource, ManualClockSource, RunState, ThreadTimer, TimelineClock,
    TimelineOptions,
};
pub use config::Settings;
pub use event_bus::{
    EventBus, LoopToggled, NotesCleared, StepAdvanced, SubscriptionId, TempoChanged,
    ToolSelected,
};
pub use save::{
    ConfirmOutcome, Confirmation, FixedConfirmation, SaveError, SaveFile, SaveManager,
    SaveOutcome, Saveable,
};
pub use scheduler::{Scheduler, ThreadScheduler};
pub use session::{SaveCommand, SaveReport, Session, TimelineCommand, ToolCommand};

use std::sync::Arc;

pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::new())
}

pub fn create_clock_source() -> Arc<dyn ClockSource> {
    Arc::new(ThreadTimer::new())
}
