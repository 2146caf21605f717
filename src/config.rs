//! Settings file: tempo, pattern size, outputs, refresh rate and logging.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::Result;

use crate::sequencer::{DEFAULT_STEPS, DEFAULT_TEMPO};

pub const ENV_SQNC_CONFIG: &str = "SQNC_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "sqnc.toml";

const DEFAULT_TRACKS: usize = 1;
const DEFAULT_REFRESH_MS: u64 = 33;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub tempo: f64,
    pub tracks: usize,
    pub steps: usize,
    /// Index into the MIDI output port list.
    pub midi_port: Option<usize>,
    pub audio_preview: bool,
    /// Interval between UI refreshes, independent of the playback clock.
    pub refresh_ms: u64,
    pub log_file: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            tracks: DEFAULT_TRACKS,
            steps: DEFAULT_STEPS,
            midi_port: None,
            audio_preview: true,
            refresh_ms: DEFAULT_REFRESH_MS,
            log_file: None,
            log_level: DEFAULT_LOG_LEVEL.to_owned(),
        }
    }
}

impl Config {
    /// Load from `path`, else `$SQNC_CONFIG`, else `./sqnc.toml` if present,
    /// else defaults. An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        if let Ok(env_path) = std::env::var(ENV_SQNC_CONFIG) {
            return Self::from_file(Path::new(&env_path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::from_file(local);
        }
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.refresh_ms == 0 {
            return Err(ConfigError::Invalid(
                "refresh_ms must be greater than zero".to_owned(),
            ));
        }
        if !self.tempo.is_finite() {
            return Err(ConfigError::Invalid("tempo must be a number".to_owned()));
        }
        Ok(())
    }
}
