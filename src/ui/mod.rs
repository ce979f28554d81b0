//! Terminal collaborators of the timeline
//!
//! This module provides the terminal side of a session:
//! - a step feed that moves bus events from the timer thread to the UI thread
//! - a position bar and transport line drawn with indicatif
//! - an overwrite confirmation prompt built on dialoguer

mod confirm;
mod feed;
mod progress;

pub use confirm::TerminalConfirmation;
pub use feed::{StepFeed, UiEvent};
pub use progress::{create_position_progress, create_transport_spinner, PositionIndicator};
