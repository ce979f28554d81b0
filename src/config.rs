// config.rs

use crate::clock::{Bpm, ClockError, TimelineOptions};
use config::{Config, Environment, File};
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_BPM: u32 = 60;
pub const TIMELINE_MAX_LENGTH: u32 = 29;
pub const ENV_PREFIX: &str = "STEPSYNC";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid timeline setting: {0}")]
    Clock(#[from] ClockError),

    #[error("Timeline max length must be at least 1")]
    InvalidMaxLength,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub bpm: u32,
    pub max_length: u32,
    pub loop_enabled: bool,
    pub save_dir: PathBuf,
    pub overwrite_prompt: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bpm: DEFAULT_BPM,
            max_length: TIMELINE_MAX_LENGTH,
            loop_enabled: true,
            save_dir: default_save_dir(),
            overwrite_prompt: true,
        }
    }
}

fn default_save_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("stepsyncrs")
            .join("saves"),
        Err(_) => PathBuf::from("saves"),
    }
}

impl Settings {
    /// Defaults, then the optional config file, then `STEPSYNC_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with_prefix(file, ENV_PREFIX)
    }

    pub fn load_with_prefix(file: Option<&Path>, env_prefix: &str) -> Result<Self, SettingsError> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("bpm", i64::from(defaults.bpm))?
            .set_default("max_length", i64::from(defaults.max_length))?
            .set_default("loop_enabled", defaults.loop_enabled)?
            .set_default("save_dir", defaults.save_dir.to_string_lossy().into_owned())?
            .set_default("overwrite_prompt", defaults.overwrite_prompt)?;

        if let Some(path) = file {
            info!("Reading settings from {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix(env_prefix).try_parsing(true));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        Bpm::new(self.bpm)?;
        if self.max_length == 0 {
            return Err(SettingsError::InvalidMaxLength);
        }
        Ok(())
    }

    pub fn timeline_options(&self) -> Result<TimelineOptions, SettingsError> {
        self.validate()?;
        Ok(TimelineOptions {
            bpm: Bpm::new(self.bpm)?,
            max_length: self.max_length,
            loop_enabled: self.loop_enabled,
        })
    }
}
