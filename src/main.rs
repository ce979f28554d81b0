use clap::Parser;
use crossbeam::channel::{self, Receiver, TryRecvError};
use simplelog::LevelFilter;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use stepsyncrs::{
    cli::{parse_console_line, ConsoleCommand, HELP},
    create_clock_source, logging,
    ui::{PositionIndicator, StepFeed, TerminalConfirmation},
    Args, SaveReport, Session, Settings, TimelineClock,
};

fn main() {
    initialize_logging();
    let args = Args::parse();

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => exit_with_error(format!("Error loading settings: {}", e)),
    };

    let mut session = match Session::new(
        &settings,
        create_clock_source(),
        Box::new(TerminalConfirmation),
    ) {
        Ok(session) => session,
        Err(e) => exit_with_error(format!("Error starting session: {}", e)),
    };

    let (ui_done, ui_stop) = channel::bounded::<()>(1);
    let ui_thread = spawn_indicator(&session, &settings, ui_stop);

    println!("{}", HELP);
    run_console(&mut session);

    drop(ui_done);
    if let Some(handle) = ui_thread {
        let _ = handle.join();
    }
    drop(session);
    log::info!("Application exiting");
}

fn initialize_logging() {
    if let Err(e) = logging::init_logger(LevelFilter::Debug) {
        eprintln!("Logging disabled: {}", e);
        return;
    }
    log::info!("Application starting");
}

fn load_settings(args: &Args) -> Result<Settings, stepsyncrs::config::SettingsError> {
    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn exit_with_error(message: String) -> ! {
    log::error!("{}", message);
    eprintln!("{}", message);
    std::process::exit(1);
}

/// Draws the position bar on its own thread, fed by step events.
fn spawn_indicator(
    session: &Session,
    settings: &Settings,
    stop: Receiver<()>,
) -> Option<thread::JoinHandle<()>> {
    let feed = StepFeed::attach(session.bus());
    let clock = Arc::clone(session.clock());
    let max_length = settings.max_length;
    let loop_enabled = settings.loop_enabled;

    let spawned = thread::Builder::new()
        .name("timeline-indicator".to_string())
        .spawn(move || run_indicator(feed, clock, max_length, loop_enabled, stop));

    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::error!("Failed to start position indicator: {}", e);
            None
        }
    }
}

fn run_indicator(
    feed: StepFeed,
    clock: Arc<TimelineClock>,
    max_length: u32,
    loop_enabled: bool,
    stop: Receiver<()>,
) {
    let mut indicator = PositionIndicator::new(max_length, loop_enabled);
    while let Err(TryRecvError::Empty) = stop.try_recv() {
        if let Some(event) = feed.next_timeout(Duration::from_millis(100)) {
            indicator.apply(event);
            for event in feed.drain() {
                indicator.apply(event);
            }
        }
        indicator.refresh(&clock);
    }
    indicator.finish();
}

fn run_console(session: &mut Session) {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                log::error!("Failed to read console input: {}", e);
                break;
            }
            None => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_console_line(&line) {
            Ok(ConsoleCommand::Quit) => break,
            Ok(command) => handle_command(session, command),
            Err(e) => {
                log::warn!("Rejected console input {:?}: {}", line, e);
                println!("{} (type 'help')", e);
            }
        }
    }
}

fn handle_command(session: &mut Session, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Timeline(command) => {
            if let Err(e) = session.run_timeline(command) {
                println!("{}", e);
            }
        }
        ConsoleCommand::Tempo(bpm) => match session.change_tempo(bpm) {
            Ok(()) => println!("Tempo set to {} BPM", bpm),
            Err(e) => println!("{}", e),
        },
        ConsoleCommand::Tool(code) => {
            session.tool_command(code);
            println!("Tool: {:?}", session.selected_tool());
        }
        ConsoleCommand::Save(command, name) => match session.run_save(command, &name) {
            Ok(report) => println!("{}", describe(&report)),
            Err(e) => {
                log::error!("Save command failed: {}", e);
                println!("{}", e);
            }
        },
        ConsoleCommand::Status => {
            let clock = session.clock();
            println!(
                "{} at position {}/{} ({} BPM, loop {})",
                clock.run_state(),
                clock.position(),
                clock.max_length(),
                clock.bpm(),
                if clock.is_loop_enabled() { "on" } else { "off" }
            );
        }
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
}

fn describe(report: &SaveReport) -> String {
    match report {
        SaveReport::Saved(outcome) => format!("Save {:?}", outcome).to_lowercase(),
        SaveReport::Loaded(file) => format!("Loaded tempo {} BPM", file.bpm),
        SaveReport::OverwritePrompt(enabled) => format!(
            "Overwrite prompt {}",
            if *enabled { "enabled" } else { "disabled" }
        ),
        SaveReport::Cleared => "Notes cleared".to_string(),
        SaveReport::Ignored => "Ignored".to_string(),
    }
}
