//! Playback engine - coordinates timing and triggers
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;

use super::{Track, PULSES_PER_STEP};
use crate::error::Result;
use crate::midi::Note;

const PULSES_PER_QUARTER: f64 = 24.0;

/// Destination for the notes the clock thread plays.
pub trait NoteSink {
    fn note_on(&mut self, channel: u8, note: Note, velocity: u8) -> Result<()>;
    fn note_off(&mut self, channel: u8, note: Note) -> Result<()>;
}

type Sinks = Arc<Mutex<Vec<Box<dyn NoteSink + Send>>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    StepAdvanced { track: usize, step: usize },
    Stopped,
}

pub struct PlaybackEngine {
    sender: Sender<PlaybackEvent>,
    receiver: Receiver<PlaybackEvent>,
    is_running: Arc<AtomicBool>,
    sinks: Sinks,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        let (sender, receiver) = channel();

        Self {
            sender,
            receiver,
            is_running: Arc::new(AtomicBool::new(false)),
            sinks: Arc::new(Mutex::new(Vec::new())),
            handle: None,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn NoteSink + Send>) {
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.push(sink);
        }
    }

    pub fn start(&mut self, tempo: Arc<Mutex<f64>>, pattern: Arc<Mutex<Vec<Track>>>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return;
        }

        let clock = Clock {
            tempo,
            pattern,
            sinks: Arc::clone(&self.sinks),
            sender: self.sender.clone(),
            is_running: Arc::clone(&self.is_running),
            positions: Vec::new(),
            pending: Vec::new(),
        };
        self.handle = Some(thread::spawn(move || clock.run()));
    }

    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("playback thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn push_event(&self, event: PlaybackEvent) {
        let _ = self.sender.send(event);
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// A sounding note waiting for its note off.
struct PendingOff {
    pulses_left: u32,
    channel: u8,
    note: Note,
}

struct Clock {
    tempo: Arc<Mutex<f64>>,
    pattern: Arc<Mutex<Vec<Track>>>,
    sinks: Sinks,
    sender: Sender<PlaybackEvent>,
    is_running: Arc<AtomicBool>,
    positions: Vec<usize>,
    pending: Vec<PendingOff>,
}

impl Clock {
    fn run(mut self) {
        let mut pulse: u64 = 0;
        let mut next_pulse = Instant::now();

        while self.is_running.load(Ordering::SeqCst) {
            let now = Instant::now();

            if now >= next_pulse {
                self.release_due();
                if pulse % u64::from(PULSES_PER_STEP) == 0 {
                    self.advance();
                }
                pulse += 1;
                next_pulse += self.pulse_duration();
            }

            thread::sleep(Duration::from_millis(1));
        }

        self.release_all();
        let _ = self.sender.send(PlaybackEvent::Stopped);
    }

    fn pulse_duration(&self) -> Duration {
        let bpm = self.tempo.lock().map(|t| *t).unwrap_or(120.0);
        Duration::from_secs_f64(60.0 / bpm / PULSES_PER_QUARTER)
    }

    /// Play the step under each track's cursor, then move the cursors on.
    fn advance(&mut self) {
        let pattern = match self.pattern.lock() {
            Ok(pattern) => pattern.clone(),
            Err(_) => return,
        };
        self.positions.resize(pattern.len(), 0);

        let mut rng = rand::thread_rng();
        for (index, track) in pattern.iter().enumerate() {
            let len = track.steps().len();
            if len == 0 {
                continue;
            }
            let position = self.positions[index] % len;
            let step = &track.steps()[position];

            let _ = self.sender.send(PlaybackEvent::StepAdvanced {
                track: index,
                step: position,
            });

            if track.is_active()
                && step.is_active()
                && rng.gen_range(0..100) < u32::from(step.probability())
            {
                for &note in step.chord() {
                    self.emit(|sink| sink.note_on(track.channel, note, step.velocity()));
                    self.pending.push(PendingOff {
                        pulses_left: u32::from(step.length()),
                        channel: track.channel,
                        note,
                    });
                }
            }

            self.positions[index] = (position + 1) % len;
        }
    }

    fn release_due(&mut self) {
        let mut due = Vec::new();
        self.pending.retain_mut(|off| {
            off.pulses_left = off.pulses_left.saturating_sub(1);
            if off.pulses_left == 0 {
                due.push((off.channel, off.note));
                false
            } else {
                true
            }
        });
        for (channel, note) in due {
            self.emit(|sink| sink.note_off(channel, note));
        }
    }

    fn release_all(&mut self) {
        for off in std::mem::take(&mut self.pending) {
            self.emit(|sink| sink.note_off(off.channel, off.note));
        }
    }

    fn emit<F>(&self, mut send: F)
    where
        F: FnMut(&mut dyn NoteSink) -> Result<()>,
    {
        let Ok(mut sinks) = self.sinks.lock() else {
            return;
        };
        for sink in sinks.iter_mut() {
            if let Err(e) = send(sink.as_mut()) {
                tracing::warn!(error = %e, "note output failed");
            }
        }
    }
}
