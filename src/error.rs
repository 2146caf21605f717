//! Error types shared across the crate.
use thiserror::Error;

use crate::config::ConfigError;
use crate::ui::keymap::KeymapError;

#[derive(Debug, Error)]
pub enum SqncError {
    #[error("midi error: {0}")]
    Midi(String),
    #[error("audio error: {0}")]
    Audio(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Keymap(#[from] KeymapError),
    #[error("terminal i/o: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SqncError>;
