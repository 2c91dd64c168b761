use anyhow::Result;
use std::sync::Arc;

pub mod command_handlers;
pub mod confirm;
pub mod dependency_container;

pub use command_handlers::{
    BackupCommandHandler, ConfigCommandHandler, DraftOverrides, SessionCommandHandler,
};
pub use confirm::{is_affirmative, prompt_line, AssumeYes, Confirm, StdinConfirm};
pub use dependency_container::DependencyContainer;

use crate::Config;

/// Application layer - coordinates operations without containing business logic
pub struct Application {
    pub container: Arc<DependencyContainer>,
}

impl Application {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let container = Arc::new(DependencyContainer::new(config)?);
        Ok(Self { container })
    }
}
