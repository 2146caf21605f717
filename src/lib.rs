//! SQNC - A terminal step sequencer library
//!
//! This library provides the components behind the terminal control surface:
//! - Multi-track sequencing with paged step grids
//! - Playback clock driving MIDI output and an audio preview
//! - Keyboard dispatch and grid rendering on ratatui
pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod sequencer;
pub mod ui;

// Re-export commonly used types
pub use audio::AudioOutput;
pub use config::Config;
pub use error::{Result, SqncError};
pub use midi::{midi_note_name, MidiOutputDevice, Note};
pub use sequencer::playback::{NoteSink, PlaybackEngine, PlaybackEvent};
pub use sequencer::{Engine, Sequencer};
pub use ui::keymap::KeyMap;
pub use ui::App;
