//! Colour palette for the control surface.
use ratatui::style::Color;

pub const PRIMARY: Color = Color::Rgb(100, 200, 100);
pub const SECONDARY_TEXT: Color = Color::Rgb(230, 230, 230);
pub const MUTED_TEXT: Color = Color::Rgb(110, 110, 110);

pub const CURRENT: Color = Color::Rgb(100, 200, 100);
pub const CURRENT_DIMMED: Color = Color::Rgb(50, 100, 50);
pub const ACTIVE: Color = Color::Rgb(60, 60, 200);
pub const ACTIVE_DIMMED: Color = Color::Rgb(35, 35, 110);
pub const INACTIVE: Color = Color::Rgb(40, 40, 40);
pub const INACTIVE_DIMMED: Color = Color::Rgb(25, 25, 25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPalette {
    pub current: Color,
    pub active: Color,
    pub inactive: Color,
}

/// Muted tracks render every step dimmed.
pub fn step_palette(track_active: bool) -> StepPalette {
    if track_active {
        StepPalette {
            current: CURRENT,
            active: ACTIVE,
            inactive: INACTIVE,
        }
    } else {
        StepPalette {
            current: CURRENT_DIMMED,
            active: ACTIVE_DIMMED,
            inactive: INACTIVE_DIMMED,
        }
    }
}
