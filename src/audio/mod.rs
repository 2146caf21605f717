//! Audio preview using cpal
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

use crate::error::{Result, SqncError};
use crate::midi::Note;
use crate::sequencer::playback::NoteSink;

const MAX_AMPLITUDE: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tone {
    note: Note,
    frequency: f32,
    amplitude: f32,
}

/// Keeps the output stream alive; notes are played through [`AudioVoice`].
pub struct AudioOutput {
    _stream: cpal::Stream,
    voice: AudioVoice,
}

impl AudioOutput {
    pub fn new() -> Result<Self> {
        let voice = AudioVoice::default();
        let stream = Self::setup_audio_stream(Arc::clone(&voice.tone))?;

        Ok(Self {
            _stream: stream,
            voice,
        })
    }

    fn setup_audio_stream(tone: Arc<Mutex<Option<Tone>>>) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SqncError::Audio("no default output device".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| SqncError::Audio(e.to_string()))?;

        let sample_rate = config.sample_rate().0 as f32;
        let mut phase = 0.0f32;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let current = tone.lock().ok().and_then(|t| *t);
                    for sample in data.iter_mut() {
                        if let Some(tone) = current {
                            let phase_increment = tone.frequency / sample_rate;
                            *sample = (phase * 2.0 * std::f32::consts::PI).sin() * tone.amplitude;
                            phase += phase_increment;
                            if phase >= 1.0 {
                                phase -= 1.0;
                            }
                        } else {
                            *sample = 0.0;
                            phase = 0.0;
                        }
                    }
                },
                |err| tracing::warn!(error = %err, "audio stream error"),
                None,
            ),
            format => {
                return Err(SqncError::Audio(format!(
                    "unsupported sample format {format:?}"
                )))
            }
        }
        .map_err(|e| SqncError::Audio(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SqncError::Audio(e.to_string()))?;
        Ok(stream)
    }

    pub fn voice(&self) -> AudioVoice {
        self.voice.clone()
    }
}

/// Sendable handle onto the single sine voice of an [`AudioOutput`].
#[derive(Clone, Default)]
pub struct AudioVoice {
    tone: Arc<Mutex<Option<Tone>>>,
}

impl AudioVoice {
    pub fn trigger_note(&self, note: Note, velocity: u8) {
        if let Ok(mut tone) = self.tone.lock() {
            *tone = Some(Tone {
                note,
                frequency: midi_note_to_frequency(note.value()),
                amplitude: MAX_AMPLITUDE * f32::from(velocity.min(127)) / 127.0,
            });
        }
    }

    /// Silence the voice, unless a later note has taken it over.
    pub fn stop_note(&self, note: Note) {
        if let Ok(mut tone) = self.tone.lock() {
            if tone.is_some_and(|t| t.note == note) {
                *tone = None;
            }
        }
    }

    #[cfg(test)]
    fn sounding(&self) -> Option<Note> {
        self.tone.lock().ok().and_then(|t| (*t).map(|t| t.note))
    }
}

impl NoteSink for AudioVoice {
    fn note_on(&mut self, _channel: u8, note: Note, velocity: u8) -> Result<()> {
        self.trigger_note(note, velocity);
        Ok(())
    }

    fn note_off(&mut self, _channel: u8, note: Note) -> Result<()> {
        self.stop_note(note);
        Ok(())
    }
}

fn midi_note_to_frequency(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}
