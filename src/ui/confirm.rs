use crate::save::{ConfirmOutcome, Confirmation};
use dialoguer::Confirm;
use log::warn;

/// Asks on the terminal before a save is overwritten.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmation;

impl Confirmation for TerminalConfirmation {
    fn confirm_overwrite(&self, name: &str) -> ConfirmOutcome {
        let answer = Confirm::new()
            .with_prompt(format!("Save '{}' already exists. Overwrite it?", name))
            .default(false)
            .interact();

        match answer {
            Ok(true) => ConfirmOutcome::Confirmed,
            Ok(false) => ConfirmOutcome::Cancelled,
            Err(e) => {
                warn!("Overwrite prompt failed, keeping existing save: {}", e);
                ConfirmOutcome::Cancelled
            }
        }
    }
}
