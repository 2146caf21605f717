//! Key chords recognized by the control surface.
//!
//! Four rows are multiplexed: the same physical row is declared twice
//! (plain and shifted) and both resolve to one ordinal space. Ordinals
//! follow the physical order of the keys on an AZERTY keyboard, not the
//! printed symbols.
use std::collections::HashMap;
use std::fmt;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use thiserror::Error;

use super::STEPS_PER_PAGE;

pub const TRACK_KEYS: usize = 10;
pub const PARAM_KEYS: usize = 10;

const STEP_SELECT_KEYS: [&str; STEPS_PER_PAGE] = [
    "a", "z", "e", "r", "t", "y", "u", "i", "q", "s", "d", "f", "g", "h", "j", "k",
];
const STEP_TOGGLE_KEYS: [&str; STEPS_PER_PAGE] = [
    "A", "Z", "E", "R", "T", "Y", "U", "I", "Q", "S", "D", "F", "G", "H", "J", "K",
];
const TRACK_SELECT_KEYS: [&str; TRACK_KEYS] =
    ["&", "é", "\"", "'", "(", "-", "è", "_", "ç", "à"];
const TRACK_TOGGLE_KEYS: [&str; TRACK_KEYS] = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "0"];
const PARAM_SELECT_KEYS: [&str; PARAM_KEYS] = ["w", "x", "c", "v", "b", "n", ",", ";", ":", "!"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeymapError {
    #[error("invalid key token '{token}': {reason}")]
    InvalidKey { token: String, reason: String },
    #[error("key '{key}' is bound twice in '{binding}'")]
    DuplicateKey { key: String, binding: String },
}

/// One chord, normalized so a terminal event and a declared token compare
/// equal. Shift never takes part in a char chord: the char carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyStroke {
    code: KeyCode,
    modifiers: KeyModifiers,
}

impl KeyStroke {
    pub fn from_event(event: &KeyEvent) -> Self {
        Self::normalized(event.code, event.modifiers)
    }

    fn normalized(code: KeyCode, modifiers: KeyModifiers) -> Self {
        let mut modifiers =
            modifiers & (KeyModifiers::SHIFT | KeyModifiers::CONTROL | KeyModifiers::ALT);
        if matches!(code, KeyCode::Char(_) | KeyCode::BackTab) {
            modifiers.remove(KeyModifiers::SHIFT);
        }
        Self { code, modifiers }
    }

    pub fn parse(token: &str) -> Result<Self, KeymapError> {
        let invalid = |reason: &str| KeymapError::InvalidKey {
            token: token.to_owned(),
            reason: reason.to_owned(),
        };
        if token.is_empty() {
            return Err(invalid("token is empty"));
        }

        let parts: Vec<&str> = token.split('+').collect();
        let (key_part, modifier_parts) = match parts.split_last() {
            Some((key, mods)) if !key.is_empty() => (*key, mods),
            _ => return Err(invalid("missing key after modifier")),
        };

        let mut modifiers = KeyModifiers::NONE;
        for modifier in modifier_parts {
            match modifier.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
                "alt" => modifiers |= KeyModifiers::ALT,
                "shift" => modifiers |= KeyModifiers::SHIFT,
                other => return Err(invalid(&format!("unknown modifier '{other}'"))),
            }
        }

        let code = match key_part.to_ascii_lowercase().as_str() {
            "space" => KeyCode::Char(' '),
            "tab" => KeyCode::Tab,
            "backtab" => KeyCode::BackTab,
            "enter" => KeyCode::Enter,
            "esc" | "escape" => KeyCode::Esc,
            "backspace" => KeyCode::Backspace,
            "up" => KeyCode::Up,
            "down" => KeyCode::Down,
            "left" => KeyCode::Left,
            "right" => KeyCode::Right,
            "pgup" => KeyCode::PageUp,
            "pgdown" => KeyCode::PageDown,
            "home" => KeyCode::Home,
            "end" => KeyCode::End,
            _ => {
                let mut chars = key_part.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => KeyCode::Char(ch),
                    _ => return Err(invalid("keys must be single chars or named keys")),
                }
            }
        };

        Ok(Self::normalized(code, modifiers))
    }
}

impl fmt::Display for KeyStroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            f.write_str("ctrl+")?;
        }
        if self.modifiers.contains(KeyModifiers::ALT) {
            f.write_str("alt+")?;
        }
        if self.modifiers.contains(KeyModifiers::SHIFT) {
            f.write_str("shift+")?;
        }
        match self.code {
            KeyCode::Char(' ') => f.write_str("space"),
            KeyCode::Char(ch) => write!(f, "{ch}"),
            KeyCode::PageUp => f.write_str("pgup"),
            KeyCode::PageDown => f.write_str("pgdown"),
            KeyCode::Up => f.write_str("↑"),
            KeyCode::Down => f.write_str("↓"),
            KeyCode::Left => f.write_str("←"),
            KeyCode::Right => f.write_str("→"),
            other => write!(f, "{}", format!("{other:?}").to_ascii_lowercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Help {
    pub key: String,
    pub desc: &'static str,
}

/// A set of chords that trigger one action. Multiplexed bindings also
/// carry the ordinal of every chord in declaration order.
#[derive(Debug, Clone)]
pub struct KeyBinding {
    keys: Vec<KeyStroke>,
    index: HashMap<KeyStroke, usize>,
    help: Help,
}

impl KeyBinding {
    fn new(tokens: &[&str], help_key: &str, desc: &'static str) -> Result<Self, KeymapError> {
        let keys = tokens
            .iter()
            .map(|token| KeyStroke::parse(token))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            keys,
            index: HashMap::new(),
            help: Help {
                key: help_key.to_owned(),
                desc,
            },
        })
    }

    fn indexed<const N: usize>(
        tokens: &[&str; N],
        desc: &'static str,
    ) -> Result<Self, KeymapError> {
        let mut binding = Self::new(tokens, &tokens.join("/"), desc)?;
        for (ordinal, key) in binding.keys.iter().enumerate() {
            if binding.index.insert(*key, ordinal).is_some() {
                return Err(KeymapError::DuplicateKey {
                    key: key.to_string(),
                    binding: desc.to_owned(),
                });
            }
        }
        Ok(binding)
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.keys.contains(&KeyStroke::from_event(event))
    }

    /// Ordinal of the chord within a multiplexed row.
    pub fn ordinal(&self, event: &KeyEvent) -> Option<usize> {
        self.index.get(&KeyStroke::from_event(event)).copied()
    }

    pub fn help(&self) -> &Help {
        &self.help
    }
}

/// What a recognized chord asks for, before the mode is taken into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    TogglePlay,
    Mode,
    Add,
    Remove,
    StepSelect(usize),
    StepToggle(usize),
    TrackSelect(usize),
    TrackToggle(usize),
    TrackPageUp,
    TrackPageDown,
    TempoUp,
    TempoDown,
    TempoFineUp,
    TempoFineDown,
    ParamSelect(usize),
    ParamSelectLeft,
    ParamSelectRight,
    ParamValueUp,
    ParamValueDown,
    Help,
    Quit,
}

#[derive(Debug, Clone)]
pub struct KeyMap {
    pub toggle_play: KeyBinding,
    pub mode: KeyBinding,
    pub add: KeyBinding,
    pub remove: KeyBinding,
    pub step_select: KeyBinding,
    pub step_toggle: KeyBinding,
    pub track_select: KeyBinding,
    pub track_toggle: KeyBinding,
    pub track_page_up: KeyBinding,
    pub track_page_down: KeyBinding,
    pub tempo_up: KeyBinding,
    pub tempo_down: KeyBinding,
    pub tempo_fine_up: KeyBinding,
    pub tempo_fine_down: KeyBinding,
    pub param_select: KeyBinding,
    pub param_select_left: KeyBinding,
    pub param_select_right: KeyBinding,
    pub param_value_up: KeyBinding,
    pub param_value_down: KeyBinding,
    pub help: KeyBinding,
    pub quit: KeyBinding,
}

impl KeyMap {
    pub fn new() -> crate::Result<Self> {
        Ok(Self {
            toggle_play: KeyBinding::new(&["space"], "space", "toggle play")?,
            mode: KeyBinding::new(&["tab"], "tab", "toggle mode (track, record)")?,
            add: KeyBinding::new(&["="], "=", "add track|step")?,
            remove: KeyBinding::new(&[")"], ")", "remove track|step")?,
            step_select: KeyBinding::indexed(&STEP_SELECT_KEYS, "select track|step 1 to 16")?,
            step_toggle: KeyBinding::indexed(&STEP_TOGGLE_KEYS, "toggle track 1 to 16")?,
            track_select: KeyBinding::indexed(&TRACK_SELECT_KEYS, "select track 1 to 10")?,
            track_toggle: KeyBinding::indexed(&TRACK_TOGGLE_KEYS, "toggle track 1 to 10")?,
            track_page_up: KeyBinding::new(&["p"], "p", "track page up")?,
            track_page_down: KeyBinding::new(&["m"], "m", "track page down")?,
            tempo_up: KeyBinding::new(&["pgup"], "page up", "tempo up (1 bpm)")?,
            tempo_down: KeyBinding::new(&["pgdown"], "page down", "tempo down (1 bpm)")?,
            tempo_fine_up: KeyBinding::new(&["alt+pgup"], "alt+page up", "tempo up (0.1 bpm)")?,
            tempo_fine_down: KeyBinding::new(
                &["alt+pgdown"],
                "alt+page down",
                "tempo down (0.1 bpm)",
            )?,
            param_select: KeyBinding::indexed(&PARAM_SELECT_KEYS, "select parameter")?,
            param_select_left: KeyBinding::new(&["left"], "←", "previous parameter")?,
            param_select_right: KeyBinding::new(&["right"], "→", "next parameter")?,
            param_value_up: KeyBinding::new(&["up"], "↑", "increase parameter value")?,
            param_value_down: KeyBinding::new(&["down"], "↓", "decrease parameter value")?,
            help: KeyBinding::new(&["?"], "?", "toggle help")?,
            quit: KeyBinding::new(&["ctrl+c", "esc"], "ctrl+c/esc", "quit")?,
        })
    }

    /// First action whose binding contains the chord, in declaration order.
    pub fn resolve(&self, event: &KeyEvent) -> Option<Action> {
        let simple = [
            (&self.toggle_play, Action::TogglePlay),
            (&self.mode, Action::Mode),
            (&self.add, Action::Add),
            (&self.remove, Action::Remove),
        ];
        if let Some((_, action)) = simple.iter().find(|(b, _)| b.matches(event)) {
            return Some(*action);
        }

        let rows: [(&KeyBinding, fn(usize) -> Action); 4] = [
            (&self.step_select, Action::StepSelect),
            (&self.step_toggle, Action::StepToggle),
            (&self.track_select, Action::TrackSelect),
            (&self.track_toggle, Action::TrackToggle),
        ];
        if let Some(action) = rows
            .iter()
            .find_map(|(b, make)| b.ordinal(event).map(make))
        {
            return Some(action);
        }

        let rest = [
            (&self.track_page_up, Action::TrackPageUp),
            (&self.track_page_down, Action::TrackPageDown),
            (&self.tempo_up, Action::TempoUp),
            (&self.tempo_down, Action::TempoDown),
            (&self.tempo_fine_up, Action::TempoFineUp),
            (&self.tempo_fine_down, Action::TempoFineDown),
        ];
        if let Some((_, action)) = rest.iter().find(|(b, _)| b.matches(event)) {
            return Some(*action);
        }

        if let Some(ordinal) = self.param_select.ordinal(event) {
            return Some(Action::ParamSelect(ordinal));
        }

        let tail = [
            (&self.param_select_left, Action::ParamSelectLeft),
            (&self.param_select_right, Action::ParamSelectRight),
            (&self.param_value_up, Action::ParamValueUp),
            (&self.param_value_down, Action::ParamValueDown),
            (&self.help, Action::Help),
            (&self.quit, Action::Quit),
        ];
        tail.iter()
            .find(|(b, _)| b.matches(event))
            .map(|(_, action)| *action)
    }

    pub fn short_help(&self) -> Vec<&KeyBinding> {
        vec![&self.help, &self.quit]
    }

    pub fn full_help(&self) -> Vec<Vec<&KeyBinding>> {
        vec![
            vec![
                &self.toggle_play,
                &self.mode,
                &self.add,
                &self.remove,
                &self.tempo_up,
                &self.tempo_down,
                &self.tempo_fine_up,
                &self.tempo_fine_down,
            ],
            vec![
                &self.step_select,
                &self.step_toggle,
                &self.track_select,
                &self.track_toggle,
                &self.track_page_up,
                &self.track_page_down,
            ],
            vec![
                &self.param_select,
                &self.param_select_left,
                &self.param_select_right,
                &self.param_value_up,
                &self.param_value_down,
                &self.help,
                &self.quit,
            ],
        ]
    }
}
