use crate::config::Settings;
use crate::session::{SaveCommand, TimelineCommand, ToolCommand};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Settings file (TOML, YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Initial tempo in beats per minute
    #[arg(short, long)]
    pub bpm: Option<u32>,

    /// Last step before the timeline loops or stops
    #[arg(long)]
    pub max_length: Option<u32>,

    /// Stop at the end of the timeline instead of looping
    #[arg(long)]
    pub no_loop: bool,

    /// Directory where saves are written
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    /// Overwrite existing saves without asking
    #[arg(long)]
    pub no_overwrite_prompt: bool,
}

impl Args {
    /// Command line flags win over file and environment settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(bpm) = self.bpm {
            settings.bpm = bpm;
        }
        if let Some(max_length) = self.max_length {
            settings.max_length = max_length;
        }
        if self.no_loop {
            settings.loop_enabled = false;
        }
        if let Some(save_dir) = &self.save_dir {
            settings.save_dir = save_dir.clone();
        }
        if self.no_overwrite_prompt {
            settings.overwrite_prompt = false;
        }
    }
}

/// A line typed into the interactive console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Timeline(TimelineCommand),
    Save(SaveCommand, String),
    Tempo(u32),
    Tool(i32),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  start | pause | stop | loop        transport (or timeline codes 0-3)
  tempo <bpm>                        change tempo
  tool pointer|place|remove          select a tool (or tool codes 0-2)
  save <name> | load <name>          persist or restore the tempo
  prompt                             toggle overwrite confirmation
  clear                              clear all notes
  status | help | quit";

pub fn parse_console_line(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".to_string());
    };
    let rest = words.collect::<Vec<_>>().join(" ");

    let command = match head.to_ascii_lowercase().as_str() {
        "start" | "play" => ConsoleCommand::Timeline(TimelineCommand::Start),
        "pause" => ConsoleCommand::Timeline(TimelineCommand::Pause),
        "stop" => ConsoleCommand::Timeline(TimelineCommand::Stop),
        "loop" => ConsoleCommand::Timeline(TimelineCommand::ToggleLoop),
        "tempo" | "bpm" => ConsoleCommand::Tempo(
            rest.parse()
                .map_err(|_| format!("invalid tempo '{}'", rest))?,
        ),
        "tool" => ConsoleCommand::Tool(match rest.to_ascii_lowercase().as_str() {
            "pointer" => i32::from(ToolCommand::Pointer),
            "place" => i32::from(ToolCommand::PlaceNote),
            "remove" => i32::from(ToolCommand::RemoveNote),
            code => code
                .parse::<i32>()
                .map_err(|_| format!("invalid tool '{}'", rest))?,
        }),
        "save" => ConsoleCommand::Save(SaveCommand::Save, rest),
        "load" => ConsoleCommand::Save(SaveCommand::Load, rest),
        "prompt" => ConsoleCommand::Save(SaveCommand::ToggleOverwritePrompt, rest),
        "clear" => ConsoleCommand::Save(SaveCommand::Clear, rest),
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => match other.parse::<i32>() {
            Ok(code) => ConsoleCommand::Timeline(
                TimelineCommand::try_from(code)
                    .map_err(|code| format!("unknown timeline code {}", code))?,
            ),
            Err(_) => return Err(format!("unknown command '{}'", other)),
        },
    };
    Ok(command)
}
