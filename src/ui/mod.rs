//! Terminal control surface: keystrokes in, sequencer mutations and a
//! rendered grid out.
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use ratatui::backend::Backend;
use ratatui::Terminal;

use crate::error::Result;
use crate::sequencer::Engine;

pub mod keymap;
pub mod params;
pub mod step;
pub mod theme;
pub mod view;

use keymap::{Action, KeyMap};
use params::Parameter;

pub const STEPS_PER_PAGE: usize = 16;
pub const STEPS_PER_LINE: usize = 8;

const TEMPO_STEP: f64 = 1.0;
const TEMPO_FINE_STEP: f64 = 0.1;

/// How shared key rows are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// The step keys select tracks.
    #[default]
    Track,
    /// The step keys toggle steps of the active track.
    Record,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Track => Mode::Record,
            Mode::Record => Mode::Track,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Track => "TRACK",
            Mode::Record => "REC",
        }
    }
}

/// Cursor and selection state of the surface. Only the dispatcher writes it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewState {
    pub mode: Mode,
    pub active_track: usize,
    pub active_track_page: usize,
    pub active_param: usize,
    /// Edit cursor, independent of the playback position.
    pub active_step: Option<usize>,
    pub width: u16,
    pub height: u16,
    pub help_expanded: bool,
}

/// Number of pages needed to show `steps` steps; never zero.
pub fn page_count(steps: usize) -> usize {
    steps.div_ceil(STEPS_PER_PAGE).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize(u16, u16),
    Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    None,
    Render,
    Quit,
}

pub struct App<E: Engine> {
    engine: E,
    parameters: Vec<Parameter>,
    keymap: KeyMap,
    view: ViewState,
}

impl<E: Engine> App<E> {
    pub fn new(engine: E, keymap: KeyMap) -> Self {
        Self {
            engine,
            parameters: params::parameters(),
            keymap,
            view: ViewState::default(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Process one event to completion.
    pub fn update(&mut self, event: AppEvent) -> Command {
        match event {
            AppEvent::Resize(width, height) => {
                self.view.width = width;
                self.view.height = height;
                Command::Render
            }
            AppEvent::Tick => {
                self.engine.sync();
                Command::Render
            }
            AppEvent::Key(key) => match self.keymap.resolve(&key) {
                Some(action) => self.dispatch(action),
                None => Command::None,
            },
        }
    }

    fn dispatch(&mut self, action: Action) -> Command {
        tracing::debug!(?action, mode = ?self.view.mode, "dispatch");
        match (self.view.mode, action) {
            (_, Action::TogglePlay) => self.engine.toggle_play(),
            (_, Action::Mode) => self.view.mode = self.view.mode.toggled(),

            (Mode::Track, Action::Add) => self.engine.add_track(),
            (Mode::Record, Action::Add) => self.engine.add_step(self.view.active_track),
            (Mode::Track, Action::Remove) => self.remove_track(),
            (Mode::Record, Action::Remove) => self.remove_step(),

            (Mode::Track, Action::StepSelect(ordinal)) => self.select_track(ordinal),
            (Mode::Record, Action::StepSelect(ordinal)) => self.toggle_step(ordinal),
            (Mode::Track, Action::StepToggle(ordinal)) => self.engine.toggle_track(ordinal),
            (Mode::Record, Action::StepToggle(_)) => {}
            (_, Action::TrackSelect(ordinal)) => self.select_track(ordinal),
            (_, Action::TrackToggle(ordinal)) => self.engine.toggle_track(ordinal),

            (_, Action::TrackPageUp) => {
                let pages = self.track_page_count();
                self.view.active_track_page = (self.view.active_track_page + 1) % pages;
            }
            (_, Action::TrackPageDown) => {
                let pages = self.track_page_count();
                self.view.active_track_page = match self.view.active_track_page {
                    0 => pages - 1,
                    page => page - 1,
                };
            }

            (_, Action::TempoUp) => self.shift_tempo(TEMPO_STEP),
            (_, Action::TempoDown) => self.shift_tempo(-TEMPO_STEP),
            (_, Action::TempoFineUp) => self.shift_tempo(TEMPO_FINE_STEP),
            (_, Action::TempoFineDown) => self.shift_tempo(-TEMPO_FINE_STEP),

            (_, Action::ParamSelect(ordinal)) => {
                if ordinal < self.parameters.len() {
                    self.view.active_param = ordinal;
                }
            }
            (_, Action::ParamSelectLeft) => {
                self.view.active_param = self.view.active_param.saturating_sub(1);
            }
            (_, Action::ParamSelectRight) => {
                if self.view.active_param + 1 < self.parameters.len() {
                    self.view.active_param += 1;
                }
            }
            (_, Action::ParamValueUp) => self.update_param(1),
            (_, Action::ParamValueDown) => self.update_param(-1),

            (_, Action::Help) => self.view.help_expanded = !self.view.help_expanded,
            (_, Action::Quit) => {
                // Halt before reset.
                if self.engine.is_playing() {
                    self.engine.toggle_play();
                }
                self.engine.reset();
                return Command::Quit;
            }
        }
        Command::None
    }

    fn track_page_count(&self) -> usize {
        self.engine
            .tracks()
            .get(self.view.active_track)
            .map_or(1, |track| page_count(track.steps().len()))
    }

    fn select_track(&mut self, ordinal: usize) {
        if ordinal >= self.engine.tracks().len() {
            return;
        }
        self.view.active_track = ordinal;
        let pages = self.track_page_count();
        self.view.active_track_page = self.view.active_track_page.min(pages - 1);
    }

    fn toggle_step(&mut self, ordinal: usize) {
        let step = ordinal + self.view.active_track_page * STEPS_PER_PAGE;
        self.engine.toggle_step(self.view.active_track, step);
        let exists = self
            .engine
            .tracks()
            .get(self.view.active_track)
            .is_some_and(|track| step < track.steps().len());
        if exists {
            self.view.active_step = Some(step);
        }
    }

    fn remove_track(&mut self) {
        let last = self.engine.tracks().len().saturating_sub(1);
        if self.view.active_track > 0 && self.view.active_track == last {
            self.select_track(self.view.active_track - 1);
        }
        self.engine.remove_track();
    }

    fn remove_step(&mut self) {
        let Some(track) = self.engine.tracks().get(self.view.active_track) else {
            return;
        };
        let remaining_in_page = (track.steps().len().saturating_sub(1)) % STEPS_PER_PAGE;
        if self.view.active_track_page > 0 && remaining_in_page == 0 {
            self.view.active_track_page -= 1;
        }
        self.engine.remove_step(self.view.active_track);
    }

    fn shift_tempo(&mut self, delta: f64) {
        let tempo = self.engine.tempo();
        self.engine.set_tempo(tempo + delta);
    }

    fn update_param(&mut self, delta: i32) {
        if let Some(param) = self.parameters.get(self.view.active_param) {
            param.update(&mut self.engine, self.view.active_track, delta);
        }
    }
}

/// Drive `app` until it asks to quit: key and resize events as they
/// arrive, one tick (sync + frame) every `refresh`.
pub fn run<B: Backend, E: Engine>(
    terminal: &mut Terminal<B>,
    app: &mut App<E>,
    refresh: Duration,
) -> Result<()> {
    let size = terminal.size()?;
    let command = app.update(AppEvent::Resize(size.width, size.height));
    apply(terminal, app, command)?;

    let mut next_tick = Instant::now();
    loop {
        let timeout = next_tick.saturating_duration_since(Instant::now());
        if event::poll(timeout)? {
            let command = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    app.update(AppEvent::Key(key))
                }
                Event::Resize(width, height) => app.update(AppEvent::Resize(width, height)),
                _ => Command::None,
            };
            if !apply(terminal, app, command)? {
                return Ok(());
            }
        }

        if Instant::now() >= next_tick {
            let command = app.update(AppEvent::Tick);
            apply(terminal, app, command)?;
            next_tick = Instant::now() + refresh;
        }
    }
}

/// Carry out what `App::update` asked for. False once the app quits.
fn apply<B: Backend, E: Engine>(
    terminal: &mut Terminal<B>,
    app: &App<E>,
    command: Command,
) -> Result<bool> {
    match command {
        Command::None => Ok(true),
        Command::Render => {
            terminal.draw(|frame| view::render(frame, app))?;
            Ok(true)
        }
        Command::Quit => {
            tracing::info!("quit requested");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::{Sequencer, Track};
    use crossterm::event::{KeyCode, KeyModifiers};

    /// Wraps a real sequencer, records every transport and structural
    /// call, and fakes the transport so no clock thread starts.
    struct RecordingEngine {
        inner: Sequencer,
        playing: bool,
        calls: Vec<&'static str>,
    }

    impl RecordingEngine {
        fn new(tracks: usize, steps: usize) -> Self {
            Self {
                inner: Sequencer::new(tracks, steps),
                playing: false,
                calls: Vec::new(),
            }
        }

        fn count(&self, call: &str) -> usize {
            self.calls.iter().filter(|c| **c == call).count()
        }
    }

    impl Engine for RecordingEngine {
        fn is_playing(&self) -> bool {
            self.playing
        }

        fn toggle_play(&mut self) {
            self.calls.push("toggle_play");
            self.playing = !self.playing;
        }

        fn reset(&mut self) {
            self.calls.push("reset");
        }

        fn tempo(&self) -> f64 {
            self.inner.tempo()
        }

        fn set_tempo(&mut self, tempo: f64) {
            self.calls.push("set_tempo");
            self.inner.set_tempo(tempo);
        }

        fn tracks(&self) -> &[Track] {
            self.inner.tracks()
        }

        fn track_mut(&mut self, track: usize) -> Option<&mut Track> {
            self.inner.track_mut(track)
        }

        fn add_track(&mut self) {
            self.calls.push("add_track");
            self.inner.add_track();
        }

        fn remove_track(&mut self) {
            self.calls.push("remove_track");
            self.inner.remove_track();
        }

        fn toggle_track(&mut self, track: usize) {
            self.calls.push("toggle_track");
            self.inner.toggle_track(track);
        }

        fn add_step(&mut self, track: usize) {
            self.calls.push("add_step");
            self.inner.add_step(track);
        }

        fn remove_step(&mut self, track: usize) {
            self.calls.push("remove_step");
            self.inner.remove_step(track);
        }

        fn toggle_step(&mut self, track: usize, step: usize) {
            self.calls.push("toggle_step");
            self.inner.toggle_step(track, step);
        }
    }

    fn app(tracks: usize, steps: usize) -> App<RecordingEngine> {
        App::new(RecordingEngine::new(tracks, steps), KeyMap::new().unwrap())
    }

    fn press(app: &mut App<RecordingEngine>, code: KeyCode) -> Command {
        app.update(AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)))
    }

    fn char_key(app: &mut App<RecordingEngine>, ch: char) -> Command {
        press(app, KeyCode::Char(ch))
    }

    #[test]
    fn test_mode_toggle_is_an_involution() {
        let mut app = app(3, 16);
        char_key(&mut app, 'z');
        let before = app.view().clone();
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.view().mode, Mode::Record);
        press(&mut app, KeyCode::Tab);
        assert_eq!(*app.view(), before);
        assert!(app.engine().calls.is_empty());
    }

    #[test]
    fn test_step_row_selects_existing_tracks_only() {
        let mut app = app(3, 16);
        char_key(&mut app, 'e');
        assert_eq!(app.view().active_track, 2);
        char_key(&mut app, 'r');
        assert_eq!(app.view().active_track, 2);
    }

    #[test]
    fn test_record_mode_toggles_step_on_current_page() {
        let mut app = app(1, 32);
        press(&mut app, KeyCode::Tab);
        char_key(&mut app, 'p');
        char_key(&mut app, 'z');
        let track = &app.engine().tracks()[0];
        assert!(track.steps()[17].is_active());
        assert!(!track.steps()[1].is_active());
        assert_eq!(app.view().active_step, Some(17));
    }

    #[test]
    fn test_record_mode_step_beyond_track_leaves_cursor() {
        let mut app = app(1, 4);
        press(&mut app, KeyCode::Tab);
        char_key(&mut app, 'k');
        assert_eq!(app.engine().count("toggle_step"), 1);
        assert_eq!(app.view().active_step, None);
    }

    #[test]
    fn test_toggle_rows_address_tracks() {
        let mut app = app(3, 16);
        char_key(&mut app, '2');
        assert!(!app.engine().tracks()[1].is_active());

        press(&mut app, KeyCode::Tab);
        char_key(&mut app, '2');
        assert!(app.engine().tracks()[1].is_active());

        // Shifted step row is inert while recording.
        char_key(&mut app, 'A');
        assert!(app.engine().tracks()[0].is_active());
        press(&mut app, KeyCode::Tab);
        char_key(&mut app, 'A');
        assert!(!app.engine().tracks()[0].is_active());
    }

    #[test]
    fn test_track_select_row_works_in_both_modes() {
        let mut app = app(3, 16);
        press(&mut app, KeyCode::Tab);
        char_key(&mut app, 'é');
        assert_eq!(app.view().active_track, 1);
        char_key(&mut app, 'à');
        assert_eq!(app.view().active_track, 1);
    }

    #[test]
    fn test_switching_track_clamps_page() {
        let mut app = app(2, 16);
        char_key(&mut app, 'z');
        for _ in 0..16 {
            app.engine.add_step(1);
        }
        char_key(&mut app, 'p');
        assert_eq!(app.view().active_track_page, 1);
        char_key(&mut app, 'a');
        assert_eq!(app.view().active_track_page, 0);
    }

    #[test]
    fn test_add_depends_on_mode() {
        let mut app = app(1, 16);
        char_key(&mut app, '=');
        assert_eq!(app.engine().tracks().len(), 2);
        press(&mut app, KeyCode::Tab);
        char_key(&mut app, '=');
        assert_eq!(app.engine().tracks()[0].steps().len(), 17);
    }

    #[test]
    fn test_remove_last_active_track_moves_cursor_first() {
        let mut app = app(3, 16);
        char_key(&mut app, 'e');
        char_key(&mut app, ')');
        assert_eq!(app.view().active_track, 1);
        assert_eq!(app.engine().count("remove_track"), 1);
        assert_eq!(app.engine().tracks().len(), 2);
    }

    #[test]
    fn test_remove_track_keeps_cursor_below_last() {
        let mut app = app(3, 16);
        char_key(&mut app, 'z');
        char_key(&mut app, ')');
        assert_eq!(app.view().active_track, 1);

        let mut app = self::app(1, 16);
        char_key(&mut app, ')');
        assert_eq!(app.view().active_track, 0);
        assert_eq!(app.engine().count("remove_track"), 1);
    }

    #[test]
    fn test_remove_step_emptying_page_moves_page_back() {
        let mut app = app(1, 17);
        press(&mut app, KeyCode::Tab);
        char_key(&mut app, 'p');
        assert_eq!(app.view().active_track_page, 1);
        char_key(&mut app, ')');
        assert_eq!(app.view().active_track_page, 0);
        assert_eq!(app.engine().count("remove_step"), 1);
        assert_eq!(app.engine().tracks()[0].steps().len(), 16);
    }

    #[test]
    fn test_remove_step_on_first_page_keeps_page() {
        let mut app = app(1, 17);
        press(&mut app, KeyCode::Tab);
        char_key(&mut app, ')');
        assert_eq!(app.view().active_track_page, 0);

        let mut app = self::app(1, 20);
        press(&mut app, KeyCode::Tab);
        char_key(&mut app, 'p');
        char_key(&mut app, ')');
        assert_eq!(app.view().active_track_page, 1);
    }

    #[test]
    fn test_track_pages_wrap_both_ways() {
        for steps in [1, 16, 17, 48, 128] {
            let mut app = app(1, steps);
            let pages = page_count(steps);
            for start in 0..pages {
                app.view.active_track_page = start;
                char_key(&mut app, 'p');
                char_key(&mut app, 'm');
                assert_eq!(app.view().active_track_page, start);
                char_key(&mut app, 'm');
                char_key(&mut app, 'p');
                assert_eq!(app.view().active_track_page, start);
            }
            app.view.active_track_page = 0;
            char_key(&mut app, 'm');
            assert_eq!(app.view().active_track_page, pages - 1);
        }
    }

    #[test]
    fn test_tempo_keys() {
        let mut app = app(1, 16);
        press(&mut app, KeyCode::PageUp);
        assert_eq!(app.engine().tempo(), 121.0);
        app.update(AppEvent::Key(KeyEvent::new(
            KeyCode::PageDown,
            KeyModifiers::ALT,
        )));
        assert!((app.engine().tempo() - 120.9).abs() < 1e-9);
        press(&mut app, KeyCode::PageDown);
        assert!((app.engine().tempo() - 119.9).abs() < 1e-9);
    }

    #[test]
    fn test_param_select_and_update() {
        let mut app = app(2, 16);
        char_key(&mut app, 'z');
        char_key(&mut app, 'x');
        assert_eq!(app.view().active_param, 1);
        press(&mut app, KeyCode::Up);
        press(&mut app, KeyCode::Up);
        press(&mut app, KeyCode::Down);
        assert_eq!(app.engine().tracks()[1].defaults.velocity, 101);
        assert_eq!(app.engine().tracks()[0].defaults.velocity, 100);
    }

    #[test]
    fn test_param_select_beyond_list_is_ignored() {
        let mut app = app(1, 16);
        char_key(&mut app, 'x');
        char_key(&mut app, '!');
        assert_eq!(app.view().active_param, 1);

        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Left);
        assert_eq!(app.view().active_param, 0);
        for _ in 0..10 {
            press(&mut app, KeyCode::Right);
        }
        assert_eq!(app.view().active_param, app.parameters().len() - 1);
    }

    #[test]
    fn test_help_toggle() {
        let mut app = app(1, 16);
        char_key(&mut app, '?');
        assert!(app.view().help_expanded);
        char_key(&mut app, '?');
        assert!(!app.view().help_expanded);
    }

    #[test]
    fn test_quit_while_playing_halts_before_reset() {
        let mut app = app(1, 16);
        char_key(&mut app, ' ');
        app.engine.calls.clear();

        assert_eq!(press(&mut app, KeyCode::Esc), Command::Quit);
        assert_eq!(app.engine().calls, ["toggle_play", "reset"]);
        assert!(!app.engine().is_playing());
    }

    #[test]
    fn test_quit_while_stopped_only_resets() {
        let mut app = app(1, 16);
        let quit = app.update(AppEvent::Key(KeyEvent::new(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL,
        )));
        assert_eq!(quit, Command::Quit);
        assert_eq!(app.engine().calls, ["reset"]);
    }

    #[test]
    fn test_resize_and_tick_leave_indices_alone() {
        let mut app = app(3, 32);
        char_key(&mut app, 'e');
        char_key(&mut app, 'p');
        let before = app.view().clone();

        assert_eq!(app.update(AppEvent::Resize(200, 60)), Command::Render);
        assert_eq!(app.update(AppEvent::Tick), Command::Render);
        assert_eq!((app.view().width, app.view().height), (200, 60));
        assert_eq!(app.view().active_track, before.active_track);
        assert_eq!(app.view().active_track_page, before.active_track_page);
    }

    #[test]
    fn test_unbound_key_does_nothing() {
        let mut app = app(1, 16);
        let before = app.view().clone();
        assert_eq!(char_key(&mut app, 'o'), Command::None);
        assert_eq!(*app.view(), before);
        assert!(app.engine().calls.is_empty());
    }

    #[test]
    fn test_resize_redraws_and_quit_stops() {
        use ratatui::backend::TestBackend;

        let mut app = app(1, 16);
        let mut terminal = Terminal::new(TestBackend::new(160, 40)).unwrap();
        let command = app.update(AppEvent::Resize(160, 40));
        assert!(apply(&mut terminal, &app, command).unwrap());
        let buffer = terminal.backend().buffer();
        let header: String = (0..buffer.area.width)
            .map(|x| buffer[(x, 0u16)].symbol().to_string())
            .collect();
        assert!(header.contains("SQNC"));

        let command = press(&mut app, KeyCode::Esc);
        assert!(!apply(&mut terminal, &app, command).unwrap());
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0), 1);
        assert_eq!(page_count(16), 1);
        assert_eq!(page_count(17), 2);
        assert_eq!(page_count(128), 8);
    }
}
