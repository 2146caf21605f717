//! Core sequencer logic - tracks, steps and the engine contract the UI drives
use std::sync::{Arc, Mutex};

use crate::midi::Note;

pub mod playback;

use playback::{NoteSink, PlaybackEngine, PlaybackEvent};

pub const MIN_TRACKS: usize = 1;
pub const MAX_TRACKS: usize = 10;
pub const MIN_STEPS: usize = 1;
pub const MAX_STEPS: usize = 128;
pub const DEFAULT_STEPS: usize = 16;

pub const MIN_TEMPO: f64 = 40.0;
pub const MAX_TEMPO: f64 = 240.0;
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Sub-step ticks per step (24 pulses per quarter note, sixteenth-note steps).
pub const PULSES_PER_STEP: u8 = 6;

/// Everything the control surface needs from a sequencing engine.
///
/// Structural requests are fire-and-forget: an implementation rejects
/// out-of-range indices and capacity overflows by doing nothing.
pub trait Engine {
    fn is_playing(&self) -> bool;
    fn toggle_play(&mut self);
    fn reset(&mut self);
    fn tempo(&self) -> f64;
    fn set_tempo(&mut self, tempo: f64);

    fn tracks(&self) -> &[Track];
    fn track_mut(&mut self, track: usize) -> Option<&mut Track>;
    fn add_track(&mut self);
    fn remove_track(&mut self);
    fn toggle_track(&mut self, track: usize);

    fn add_step(&mut self, track: usize);
    fn remove_step(&mut self, track: usize);
    fn toggle_step(&mut self, track: usize, step: usize);

    /// Called once per UI tick, before rendering.
    fn sync(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    position: usize,
    active: bool,
    current: bool,
    pub velocity: u8,
    pub probability: u8,
    pub length: u8,
    pub chord: Vec<Note>,
}

impl Step {
    pub fn new(position: usize, defaults: &StepDefaults) -> Self {
        Self {
            position,
            active: false,
            current: false,
            velocity: defaults.velocity,
            probability: defaults.probability,
            length: defaults.length,
            chord: vec![defaults.note],
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_current_step(&self) -> bool {
        self.current
    }

    pub fn set_current(&mut self, current: bool) {
        self.current = current;
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn probability(&self) -> u8 {
        self.probability
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn chord(&self) -> &[Note] {
        &self.chord
    }
}

/// Values a track stamps onto the steps it creates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDefaults {
    pub note: Note,
    pub velocity: u8,
    pub probability: u8,
    pub length: u8,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            note: Note(60), // Middle C
            velocity: 100,
            probability: 100,
            length: PULSES_PER_STEP,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    steps: Vec<Step>,
    active: bool,
    pub channel: u8,
    pub defaults: StepDefaults,
}

impl Track {
    pub fn new(channel: u8, steps: usize) -> Self {
        let defaults = StepDefaults::default();
        Self {
            steps: (0..steps).map(|i| Step::new(i, &defaults)).collect(),
            active: true,
            channel,
            defaults,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut [Step] {
        &mut self.steps
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn toggle(&mut self) {
        self.active = !self.active;
    }

    fn push_step(&mut self) {
        let position = self.steps.len();
        self.steps.push(Step::new(position, &self.defaults));
    }

    fn pop_step(&mut self) {
        self.steps.pop();
    }

    fn set_current(&mut self, current: Option<usize>) {
        for step in &mut self.steps {
            step.current = Some(step.position) == current;
        }
    }
}

pub struct Sequencer {
    tracks: Vec<Track>,
    pattern: Arc<Mutex<Vec<Track>>>,
    tempo: Arc<Mutex<f64>>,
    playback: PlaybackEngine,
}

impl Sequencer {
    pub fn new(tracks: usize, steps: usize) -> Self {
        let tracks = tracks.clamp(MIN_TRACKS, MAX_TRACKS);
        let steps = steps.clamp(MIN_STEPS, MAX_STEPS);
        let tracks: Vec<Track> = (0..tracks).map(|i| Track::new(i as u8, steps)).collect();

        Self {
            pattern: Arc::new(Mutex::new(tracks.clone())),
            tracks,
            tempo: Arc::new(Mutex::new(DEFAULT_TEMPO)),
            playback: PlaybackEngine::new(),
        }
    }

    /// Route note output of the playback clock to `sink`.
    pub fn add_sink(&mut self, sink: Box<dyn NoteSink + Send>) {
        self.playback.add_sink(sink);
    }

    /// Push the current pattern to the playback thread.
    fn publish(&self) {
        if let Ok(mut shared) = self.pattern.lock() {
            *shared = self.tracks.clone();
        }
    }

    fn clear_current(&mut self) {
        for track in &mut self.tracks {
            track.set_current(None);
        }
    }
}

impl Engine for Sequencer {
    fn is_playing(&self) -> bool {
        self.playback.is_running()
    }

    fn toggle_play(&mut self) {
        if self.playback.is_running() {
            tracing::info!("stopping playback");
            self.playback.stop();
        } else {
            tracing::info!(tempo = self.tempo(), "starting playback");
            self.publish();
            self.playback
                .start(Arc::clone(&self.tempo), Arc::clone(&self.pattern));
        }
    }

    fn reset(&mut self) {
        tracing::debug!("resetting transport");
        let was_playing = self.playback.is_running();
        if was_playing {
            self.playback.stop();
        }
        // Anything still queued belongs to the previous run.
        self.playback.poll_events();
        self.clear_current();
        if was_playing {
            self.publish();
            self.playback
                .start(Arc::clone(&self.tempo), Arc::clone(&self.pattern));
        }
    }

    fn tempo(&self) -> f64 {
        self.tempo.lock().map(|t| *t).unwrap_or(DEFAULT_TEMPO)
    }

    fn set_tempo(&mut self, tempo: f64) {
        if let Ok(mut shared) = self.tempo.lock() {
            *shared = tempo.clamp(MIN_TEMPO, MAX_TEMPO);
        }
    }

    fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn track_mut(&mut self, track: usize) -> Option<&mut Track> {
        // Edits through the reference reach playback on the next sync.
        self.tracks.get_mut(track)
    }

    fn add_track(&mut self) {
        if self.tracks.len() >= MAX_TRACKS {
            tracing::debug!("track limit reached");
            return;
        }
        let channel = self.tracks.len() as u8;
        self.tracks.push(Track::new(channel, DEFAULT_STEPS));
        self.publish();
    }

    fn remove_track(&mut self) {
        if self.tracks.len() <= MIN_TRACKS {
            tracing::debug!("cannot remove the only track");
            return;
        }
        self.tracks.pop();
        self.publish();
    }

    fn toggle_track(&mut self, track: usize) {
        if let Some(t) = self.tracks.get_mut(track) {
            t.toggle();
            self.publish();
        }
    }

    fn add_step(&mut self, track: usize) {
        let Some(t) = self.tracks.get_mut(track) else {
            return;
        };
        if t.steps.len() >= MAX_STEPS {
            tracing::debug!(track, "step limit reached");
            return;
        }
        t.push_step();
        self.publish();
    }

    fn remove_step(&mut self, track: usize) {
        let Some(t) = self.tracks.get_mut(track) else {
            return;
        };
        if t.steps.len() <= MIN_STEPS {
            tracing::debug!(track, "cannot remove the only step");
            return;
        }
        t.pop_step();
        self.publish();
    }

    fn toggle_step(&mut self, track: usize, step: usize) {
        let Some(s) = self.tracks.get_mut(track).and_then(|t| t.steps.get_mut(step)) else {
            return;
        };
        s.active = !s.active;
        self.publish();
    }

    fn sync(&mut self) {
        for event in self.playback.poll_events() {
            match event {
                PlaybackEvent::StepAdvanced { track, step } => {
                    if let Some(t) = self.tracks.get_mut(track) {
                        t.set_current(Some(step));
                    }
                }
                PlaybackEvent::Stopped => self.clear_current(),
            }
        }
        // Parameter edits land on `tracks` directly.
        self.publish();
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.playback.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequencer_creation() {
        let seq = Sequencer::new(3, 16);
        assert_eq!(seq.tracks().len(), 3);
        assert!(seq.tracks().iter().all(|t| t.steps().len() == 16));
        assert_eq!(seq.tracks()[2].channel, 2);
        assert!(!seq.is_playing());
    }

    #[test]
    fn test_creation_clamps_counts() {
        let seq = Sequencer::new(0, 1000);
        assert_eq!(seq.tracks().len(), MIN_TRACKS);
        assert_eq!(seq.tracks()[0].steps().len(), MAX_STEPS);
    }

    #[test]
    fn test_step_toggle() {
        let mut seq = Sequencer::new(1, 4);
        assert!(!seq.tracks()[0].steps()[2].is_active());
        seq.toggle_step(0, 2);
        assert!(seq.tracks()[0].steps()[2].is_active());
        seq.toggle_step(0, 2);
        assert!(!seq.tracks()[0].steps()[2].is_active());
    }

    #[test]
    fn test_out_of_range_requests_are_ignored() {
        let mut seq = Sequencer::new(2, 4);
        seq.toggle_step(0, 4);
        seq.toggle_step(5, 0);
        seq.toggle_track(9);
        seq.add_step(7);
        seq.remove_step(7);
        assert_eq!(seq.tracks().len(), 2);
        assert!(seq.tracks().iter().all(|t| t.is_active()));
        assert!(seq.tracks()[0].steps().iter().all(|s| !s.is_active()));
    }

    #[test]
    fn test_track_capacity() {
        let mut seq = Sequencer::new(MAX_TRACKS, 16);
        seq.add_track();
        assert_eq!(seq.tracks().len(), MAX_TRACKS);

        let mut seq = Sequencer::new(1, 16);
        seq.remove_track();
        assert_eq!(seq.tracks().len(), 1);
    }

    #[test]
    fn test_step_capacity() {
        let mut seq = Sequencer::new(1, 1);
        seq.remove_step(0);
        assert_eq!(seq.tracks()[0].steps().len(), 1);

        seq.add_step(0);
        assert_eq!(seq.tracks()[0].steps().len(), 2);
        assert_eq!(seq.tracks()[0].steps()[1].position(), 1);
    }

    #[test]
    fn test_new_steps_inherit_track_defaults() {
        let mut seq = Sequencer::new(1, 1);
        seq.track_mut(0).unwrap().defaults.velocity = 42;
        seq.add_step(0);
        assert_eq!(seq.tracks()[0].steps()[1].velocity(), 42);
    }

    #[test]
    fn test_tempo_is_clamped() {
        let mut seq = Sequencer::new(1, 16);
        assert_eq!(seq.tempo(), DEFAULT_TEMPO);
        seq.set_tempo(1000.0);
        assert_eq!(seq.tempo(), MAX_TEMPO);
        seq.set_tempo(-3.0);
        assert_eq!(seq.tempo(), MIN_TEMPO);
    }

    #[test]
    fn test_mutations_reach_playback_pattern() {
        let mut seq = Sequencer::new(1, 4);
        seq.toggle_step(0, 1);
        let shared = seq.pattern.lock().unwrap();
        assert!(shared[0].steps()[1].is_active());
    }

    #[test]
    fn test_sync_folds_playback_events() {
        let mut seq = Sequencer::new(2, 4);
        seq.playback
            .push_event(PlaybackEvent::StepAdvanced { track: 0, step: 1 });
        seq.playback
            .push_event(PlaybackEvent::StepAdvanced { track: 1, step: 3 });
        seq.playback
            .push_event(PlaybackEvent::StepAdvanced { track: 0, step: 2 });
        seq.playback
            .push_event(PlaybackEvent::StepAdvanced { track: 7, step: 0 });
        seq.sync();

        let current = |seq: &Sequencer, track: usize| -> Vec<usize> {
            seq.tracks()[track]
                .steps()
                .iter()
                .filter(|s| s.is_current_step())
                .map(|s| s.position())
                .collect()
        };
        assert_eq!(current(&seq, 0), vec![2]);
        assert_eq!(current(&seq, 1), vec![3]);

        seq.playback.push_event(PlaybackEvent::Stopped);
        seq.sync();
        assert!(current(&seq, 0).is_empty());
        assert!(current(&seq, 1).is_empty());
    }

    #[test]
    fn test_reset_while_playing_keeps_first_step() {
        let mut seq = Sequencer::new(1, 4);
        seq.set_tempo(MAX_TEMPO);
        seq.toggle_play();
        std::thread::sleep(std::time::Duration::from_millis(100));
        seq.reset();
        assert!(seq.is_playing());

        // One step lasts 62.5 ms at this tempo.
        std::thread::sleep(std::time::Duration::from_millis(20));
        seq.sync();
        assert!(seq.tracks()[0].steps()[0].is_current_step());
        seq.toggle_play();
        assert!(!seq.is_playing());
    }

    #[test]
    fn test_reset_clears_current_step() {
        let mut seq = Sequencer::new(1, 4);
        seq.tracks[0].set_current(Some(2));
        assert!(seq.tracks()[0].steps()[2].is_current_step());
        seq.reset();
        assert!(seq.tracks()[0].steps().iter().all(|s| !s.is_current_step()));
    }
}
