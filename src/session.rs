//! One authoring session: the bus, the clock and the save manager
//!
//! Collaborators receive the pieces they need from the session explicitly;
//! nothing in the crate is reachable through a global.

use crate::clock::{Bpm, ClockError, ClockSource, TimelineClock};
use crate::config::{Settings, SettingsError};
use crate::event_bus::{EventBus, LoopToggled, NotesCleared, TempoChanged, ToolSelected};
use crate::save::{Confirmation, SaveError, SaveFile, SaveManager, SaveOutcome};
use log::{debug, info, warn};
use std::sync::Arc;

/// Editing tools, numbered as the tool panel sends them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolCommand {
    #[default]
    Pointer,
    PlaceNote,
    RemoveNote,
}

impl TryFrom<i32> for ToolCommand {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ToolCommand::Pointer),
            1 => Ok(ToolCommand::PlaceNote),
            2 => Ok(ToolCommand::RemoveNote),
            other => Err(other),
        }
    }
}

impl From<ToolCommand> for i32 {
    fn from(tool: ToolCommand) -> Self {
        match tool {
            ToolCommand::Pointer => 0,
            ToolCommand::PlaceNote => 1,
            ToolCommand::RemoveNote => 2,
        }
    }
}

/// Transport buttons, numbered as the UI sends them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineCommand {
    Start,
    Pause,
    Stop,
    ToggleLoop,
}

impl TryFrom<i32> for TimelineCommand {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TimelineCommand::Start),
            1 => Ok(TimelineCommand::Pause),
            2 => Ok(TimelineCommand::Stop),
            3 => Ok(TimelineCommand::ToggleLoop),
            other => Err(other),
        }
    }
}

/// Save panel buttons, numbered as the UI sends them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveCommand {
    Save,
    Load,
    ToggleOverwritePrompt,
    Clear,
}

impl TryFrom<i32> for SaveCommand {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(SaveCommand::Save),
            1 => Ok(SaveCommand::Load),
            2 => Ok(SaveCommand::ToggleOverwritePrompt),
            3 => Ok(SaveCommand::Clear),
            other => Err(other),
        }
    }
}

/// What a save panel command did.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveReport {
    Saved(SaveOutcome),
    Loaded(SaveFile),
    OverwritePrompt(bool),
    Cleared,
    Ignored,
}

pub struct Session {
    bus: Arc<EventBus>,
    clock: Arc<TimelineClock>,
    saves: SaveManager,
    selected_tool: ToolCommand,
}

impl Session {
    pub fn new(
        settings: &Settings,
        source: Arc<dyn ClockSource>,
        confirmation: Box<dyn Confirmation>,
    ) -> Result<Self, SettingsError> {
        let bus = Arc::new(EventBus::new());
        let clock = Arc::new(TimelineClock::new(
            Arc::clone(&bus),
            source,
            settings.timeline_options()?,
        ));

        let mut saves = SaveManager::new(settings.save_dir.clone(), confirmation);
        if !settings.overwrite_prompt {
            saves.toggle_overwrite_prompt();
        }
        saves.add_saveable(clock.clone());

        info!("Session ready, saves in {:?}", settings.save_dir);
        Ok(Session {
            bus,
            clock,
            saves,
            selected_tool: ToolCommand::default(),
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn clock(&self) -> &Arc<TimelineClock> {
        &self.clock
    }

    pub fn saves(&self) -> &SaveManager {
        &self.saves
    }

    pub fn saves_mut(&mut self) -> &mut SaveManager {
        &mut self.saves
    }

    pub fn selected_tool(&self) -> ToolCommand {
        self.selected_tool
    }

    /// Handles a tool button. Unknown codes are logged and ignored.
    pub fn tool_command(&mut self, code: i32) {
        match ToolCommand::try_from(code) {
            Ok(tool) => self.select_tool(tool),
            Err(code) => warn!("Unknown tool index: {}", code),
        }
    }

    pub fn select_tool(&mut self, tool: ToolCommand) {
        self.selected_tool = tool;
        debug!("Selected tool {:?}", tool);
        self.bus.publish(&ToolSelected(i32::from(tool)));
    }

    /// Handles a transport button. Unknown codes are logged and ignored.
    pub fn timeline_command(&self, code: i32) -> Result<(), ClockError> {
        match TimelineCommand::try_from(code) {
            Ok(command) => self.run_timeline(command),
            Err(code) => {
                warn!("Unknown timeline index: {}", code);
                Ok(())
            }
        }
    }

    pub fn run_timeline(&self, command: TimelineCommand) -> Result<(), ClockError> {
        match command {
            TimelineCommand::Start => self.clock.start()?,
            TimelineCommand::Pause => self.clock.pause(),
            TimelineCommand::Stop => self.clock.stop(),
            TimelineCommand::ToggleLoop => {
                let enabled = self.clock.toggle_loop();
                self.bus.publish(&LoopToggled(enabled));
            }
        }
        Ok(())
    }

    /// Handles a save panel button. Unknown codes are logged and ignored.
    pub fn save_command(&mut self, code: i32, name: &str) -> Result<SaveReport, SaveError> {
        match SaveCommand::try_from(code) {
            Ok(command) => self.run_save(command, name),
            Err(code) => {
                warn!("Unknown save index: {}", code);
                Ok(SaveReport::Ignored)
            }
        }
    }

    pub fn run_save(&mut self, command: SaveCommand, name: &str) -> Result<SaveReport, SaveError> {
        match command {
            SaveCommand::Save => Ok(SaveReport::Saved(self.saves.save(name)?)),
            SaveCommand::Load => Ok(SaveReport::Loaded(self.saves.load(name)?)),
            SaveCommand::ToggleOverwritePrompt => Ok(SaveReport::OverwritePrompt(
                self.saves.toggle_overwrite_prompt(),
            )),
            SaveCommand::Clear => {
                self.bus.publish(&NotesCleared);
                Ok(SaveReport::Cleared)
            }
        }
    }

    /// Announces a tempo change on the bus, as a tempo control would.
    pub fn change_tempo(&self, bpm: u32) -> Result<(), ClockError> {
        let tempo = Bpm::new(bpm)?;
        self.bus.publish(&TempoChanged(tempo.get()));
        Ok(())
    }

    /// Detaches the clock from the bus and its timer.
    pub fn shutdown(&self) {
        self.clock.remove_listener();
        info!("Session shut down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
