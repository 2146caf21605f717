//! Per-track parameters editable from the keyboard.
use crate::midi::Note;
use crate::sequencer::{Engine, Track, PULSES_PER_STEP};

const MAX_LENGTH: u8 = 16 * PULSES_PER_STEP;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Note,
    Velocity,
    Length,
    Probability,
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    kind: ParamKind,
}

pub fn parameters() -> Vec<Parameter> {
    [
        ParamKind::Note,
        ParamKind::Velocity,
        ParamKind::Length,
        ParamKind::Probability,
        ParamKind::Channel,
    ]
    .into_iter()
    .map(|kind| Parameter { kind })
    .collect()
}

impl Parameter {
    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            ParamKind::Note => "note",
            ParamKind::Velocity => "velocity",
            ParamKind::Length => "length",
            ParamKind::Probability => "probability",
            ParamKind::Channel => "channel",
        }
    }

    fn range(&self) -> (u8, u8) {
        match self.kind {
            ParamKind::Note | ParamKind::Velocity => (0, 127),
            ParamKind::Length => (1, MAX_LENGTH),
            ParamKind::Probability => (0, 100),
            ParamKind::Channel => (0, 15),
        }
    }

    fn value(&self, track: &Track) -> u8 {
        match self.kind {
            ParamKind::Note => track.defaults.note.value(),
            ParamKind::Velocity => track.defaults.velocity,
            ParamKind::Length => track.defaults.length,
            ParamKind::Probability => track.defaults.probability,
            ParamKind::Channel => track.channel,
        }
    }

    pub fn display(&self, track: &Track) -> String {
        let value = self.value(track);
        match self.kind {
            ParamKind::Note => Note(value).display(),
            ParamKind::Length => format!("{:.1}", f64::from(value) / f64::from(PULSES_PER_STEP)),
            ParamKind::Probability => format!("{value}%"),
            ParamKind::Channel => format!("{}", value + 1),
            ParamKind::Velocity => value.to_string(),
        }
    }

    /// Shift the value for `track` by `delta`, clamped to the parameter's
    /// range. Applies to the track's defaults and to every step it owns.
    pub fn update<E: Engine + ?Sized>(&self, engine: &mut E, track: usize, delta: i32) {
        let Some(track) = engine.track_mut(track) else {
            return;
        };
        let (min, max) = self.range();
        let next = (i32::from(self.value(track)) + delta).clamp(i32::from(min), i32::from(max));
        let next = next as u8;

        match self.kind {
            ParamKind::Note => {
                track.defaults.note = Note(next);
                for step in track.steps_mut() {
                    if let Some(root) = step.chord.first_mut() {
                        *root = Note(next);
                    }
                }
            }
            ParamKind::Velocity => {
                track.defaults.velocity = next;
                track.steps_mut().iter_mut().for_each(|s| s.velocity = next);
            }
            ParamKind::Length => {
                track.defaults.length = next;
                track.steps_mut().iter_mut().for_each(|s| s.length = next);
            }
            ParamKind::Probability => {
                track.defaults.probability = next;
                track.steps_mut().iter_mut().for_each(|s| s.probability = next);
            }
            ParamKind::Channel => track.channel = next,
        }
        tracing::debug!(param = self.name(), value = next, "parameter updated");
    }
}
