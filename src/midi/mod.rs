//! MIDI output using midir
use std::fmt;

use midir::{MidiOutput, MidiOutputConnection};

use crate::error::{Result, SqncError};
use crate::sequencer::playback::NoteSink;

const CLIENT_NAME: &str = "SQNC MIDI Output";

/// A MIDI note number, 0..=127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Note(pub u8);

impl Note {
    pub fn value(self) -> u8 {
        self.0
    }

    pub fn display(self) -> String {
        midi_note_name(self.0)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    port_name: Option<String>,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self {
            connection: None,
            port_name: None,
        }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<()> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| SqncError::Midi(format!("failed to create output: {e}")))?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| SqncError::Midi(format!("no port at index {port_index}")))?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "sqnc")
            .map_err(|e| SqncError::Midi(format!("failed to connect: {e}")))?;

        tracing::info!(port = %name, "connected midi output");
        self.connection = Some(connection);
        self.port_name = Some(name);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn send_note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()> {
        if let Some(ref mut conn) = self.connection {
            conn.send(&[0x90 | (channel & 0x0f), note, velocity])
                .map_err(|e| SqncError::Midi(format!("failed to send note on: {e}")))?;
        }
        Ok(())
    }

    pub fn send_note_off(&mut self, channel: u8, note: u8) -> Result<()> {
        if let Some(ref mut conn) = self.connection {
            conn.send(&[0x80 | (channel & 0x0f), note, 0])
                .map_err(|e| SqncError::Midi(format!("failed to send note off: {e}")))?;
        }
        Ok(())
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteSink for MidiOutputDevice {
    fn note_on(&mut self, channel: u8, note: Note, velocity: u8) -> Result<()> {
        self.send_note_on(channel, note.value(), velocity)
    }

    fn note_off(&mut self, channel: u8, note: Note) -> Result<()> {
        self.send_note_off(channel, note.value())
    }
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_names() {
        assert_eq!(Note(60).display(), "C4");
        assert_eq!(Note(0).display(), "C-1");
        assert_eq!(Note(66).display(), "F#4");
        assert_eq!(Note(127).to_string(), "G9");
    }

    #[test]
    fn test_unconnected_device_swallows_notes() {
        let mut device = MidiOutputDevice::new();
        assert!(!device.is_connected());
        assert!(device.note_on(0, Note(60), 100).is_ok());
        assert!(device.note_off(0, Note(60)).is_ok());
    }
}
