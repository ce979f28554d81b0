//! Save documents and the manager that writes them to disk
//!
//! A [`SaveFile`] is the shared document every [`Saveable`] collaborator
//! reads its own fragment from. The timeline clock owns `bpm`; fields
//! belonging to other collaborators are kept verbatim in `other`, so a load
//! followed by a save never loses data this crate does not understand.

use crate::clock::ClockError;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

const SAVE_EXTENSION: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("Save name must not be empty")]
    EmptyName,

    #[error("Save name must be a plain file name: {0:?}")]
    InvalidName(String),

    #[error("Save file not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFile {
    #[serde(rename = "BPM")]
    pub bpm: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl Default for SaveFile {
    fn default() -> Self {
        SaveFile {
            bpm: crate::config::DEFAULT_BPM,
            saved_at: None,
            other: BTreeMap::new(),
        }
    }
}

impl SaveFile {
    pub fn from_json(json: &str) -> Result<Self, SaveError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SaveError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A collaborator that persists a fragment of the [`SaveFile`].
pub trait Saveable: Send + Sync {
    fn save(&self, file: &mut SaveFile);
    fn load(&self, file: &SaveFile) -> Result<(), SaveError>;
}

/// Answer to an overwrite confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    Cancelled,
}

/// Asks the user whether an existing save may be replaced.
pub trait Confirmation: Send + Sync {
    fn confirm_overwrite(&self, name: &str) -> ConfirmOutcome;
}

/// Always gives the same answer. Useful for headless runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirmation(pub ConfirmOutcome);

impl Confirmation for FixedConfirmation {
    fn confirm_overwrite(&self, _name: &str) -> ConfirmOutcome {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    Overwritten,
    Cancelled,
}

pub struct SaveManager {
    directory: PathBuf,
    confirmation: Box<dyn Confirmation>,
    saveables: Vec<Arc<dyn Saveable>>,
    overwrite_prompt: bool,
}

impl SaveManager {
    pub fn new(directory: impl Into<PathBuf>, confirmation: Box<dyn Confirmation>) -> Self {
        SaveManager {
            directory: directory.into(),
            confirmation,
            saveables: Vec::new(),
            overwrite_prompt: true,
        }
    }

    pub fn add_saveable(&mut self, saveable: Arc<dyn Saveable>) {
        self.saveables.push(saveable);
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Maps a save name to its file inside the save directory.
    ///
    /// Names must be a single normal path component; separators, `..` and
    /// absolute paths are rejected.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, SaveError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SaveError::EmptyName);
        }
        let file_name = format!("{}.{}", name, SAVE_EXTENSION);
        let mut components = Path::new(&file_name).components();
        let single_component = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_component || name.contains(['/', '\\']) || name.contains("..") {
            return Err(SaveError::InvalidName(name.to_string()));
        }
        Ok(self.directory.join(file_name))
    }

    /// Collects every saveable into a fresh document.
    pub fn snapshot(&self) -> SaveFile {
        let mut file = SaveFile {
            saved_at: Some(Utc::now()),
            ..SaveFile::default()
        };
        for saveable in &self.saveables {
            saveable.save(&mut file);
        }
        file
    }

    /// Writes the current state under `name`.
    ///
    /// An existing save is only replaced after confirmation, unless the
    /// overwrite prompt has been switched off.
    pub fn save(&self, name: &str) -> Result<SaveOutcome, SaveError> {
        let path = self.path_for(name)?;
        let exists = path.exists();

        if exists && self.overwrite_prompt {
            match self.confirmation.confirm_overwrite(name.trim()) {
                ConfirmOutcome::Confirmed => debug!("Overwrite of {:?} confirmed", path),
                ConfirmOutcome::Cancelled => {
                    info!("Overwrite of {:?} cancelled", path);
                    return Ok(SaveOutcome::Cancelled);
                }
            }
        }

        let mut file = self.snapshot();
        if exists {
            // Keep fragments written by collaborators that are not registered here.
            match self.read(&path) {
                Ok(previous) => {
                    for (key, value) in previous.other {
                        file.other.entry(key).or_insert(value);
                    }
                }
                Err(e) => warn!("Dropping unreadable fields of {:?}: {}", path, e),
            }
        }

        fs::create_dir_all(&self.directory)?;
        fs::write(&path, file.to_json()?)?;
        info!("Saved {:?}", path);

        Ok(if exists {
            SaveOutcome::Overwritten
        } else {
            SaveOutcome::Written
        })
    }

    /// Reads `name` and hands it to every saveable.
    ///
    /// Every saveable is given the document even if an earlier one fails;
    /// the first failure is returned.
    pub fn load(&self, name: &str) -> Result<SaveFile, SaveError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(SaveError::NotFound(path));
        }

        let file = self.read(&path)?;
        let mut first_error = None;
        for saveable in &self.saveables {
            if let Err(e) = saveable.load(&file) {
                warn!("Failed to load fragment from {:?}: {}", path, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Loaded {:?}", path);
                Ok(file)
            }
        }
    }

    /// Flips whether overwriting asks first. Returns the new value.
    pub fn toggle_overwrite_prompt(&mut self) -> bool {
        self.overwrite_prompt = !self.overwrite_prompt;
        info!(
            "Overwrite prompt {}",
            if self.overwrite_prompt { "enabled" } else { "disabled" }
        );
        self.overwrite_prompt
    }

    pub fn overwrite_prompt(&self) -> bool {
        self.overwrite_prompt
    }

    fn read(&self, path: &Path) -> Result<SaveFile, SaveError> {
        SaveFile::from_json(&fs::read_to_string(path)?)
    }
}
