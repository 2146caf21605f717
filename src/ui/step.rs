//! Step cells: sizing, variant selection, content and velocity bar.
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Padding, Paragraph};
use ratatui::Frame;

use super::theme::{self, StepPalette};
use super::{ViewState, STEPS_PER_LINE, STEPS_PER_PAGE};
use crate::sequencer::{Step, Track, PULSES_PER_STEP};

pub const MIN_STEP_WIDTH: u16 = 15;
pub const MIN_STEP_HEIGHT: u16 = MIN_STEP_WIDTH / 2;

const ACTIVE_STEP_MARKER: &str = "♦";
const VELOCITY_GLYPH: &str = "█";
/// Columns a slot adds to the cell: the velocity bar (or blank) and a gap.
const SLOT_MARGIN_X: u16 = 2;
/// Blank line above every cell.
const SLOT_MARGIN_Y: u16 = 1;

/// Cell size for a terminal `width` columns wide. Never below the minimum,
/// even if the row then overflows the terminal.
pub fn step_size(width: u16) -> (u16, u16) {
    let cell_width = i32::from(width) / STEPS_PER_LINE as i32 - 2;
    let cell_height = cell_width / 2 - 1;
    if cell_width < i32::from(MIN_STEP_WIDTH) || cell_height < i32::from(MIN_STEP_HEIGHT) {
        return (MIN_STEP_WIDTH, MIN_STEP_HEIGHT);
    }
    (cell_width as u16, cell_height as u16)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepVariant {
    Current,
    Active,
    Inactive,
}

pub fn step_variant(is_playing: bool, step: &Step) -> StepVariant {
    if is_playing && step.is_current_step() {
        StepVariant::Current
    } else if step.is_active() {
        StepVariant::Active
    } else {
        StepVariant::Inactive
    }
}

/// Blank rows above the velocity bar of a cell `height` rows tall.
pub fn velocity_blank_rows(velocity: u8, height: u16) -> u16 {
    let missing = u32::from(127 - velocity.min(127));
    (missing * u32::from(height) / 127) as u16
}

/// Text lines of a cell. Inactive steps show only their number.
pub fn step_content(step: &Step, active_step: Option<usize>, total_steps: usize) -> Vec<String> {
    let number = step.position() + 1;
    if !step.is_active() {
        return vec![number.to_string()];
    }
    let marker = if active_step == Some(step.position()) {
        ACTIVE_STEP_MARKER
    } else {
        ""
    };
    let note = step
        .chord()
        .first()
        .map(|note| note.display())
        .unwrap_or_default();
    vec![
        format!("{number}{marker}"),
        note,
        format!(
            "{:.1}/{}  {}%",
            f64::from(step.length()) / f64::from(PULSES_PER_STEP),
            total_steps,
            step.probability()
        ),
    ]
}

/// Rows of the grid showing the active page of `track`.
pub fn grid_height(width: u16, track: &Track, page: usize) -> u16 {
    let (_, cell_height) = step_size(width);
    let visible = track
        .steps()
        .len()
        .saturating_sub(page * STEPS_PER_PAGE)
        .min(STEPS_PER_PAGE);
    let lines = visible.div_ceil(STEPS_PER_LINE) as u16;
    lines.saturating_mul(cell_height + SLOT_MARGIN_Y)
}

/// Draw the active page of `track` with its top-left corner at `origin`.
/// Cells falling outside the frame are clipped.
pub fn render_grid(
    frame: &mut Frame,
    origin: Rect,
    track: &Track,
    view: &ViewState,
    is_playing: bool,
) {
    let size = step_size(view.width);
    let total_steps = super::page_count(track.steps().len()) * STEPS_PER_PAGE;
    let palette = theme::step_palette(track.is_active());

    let page = track
        .steps()
        .iter()
        .skip(view.active_track_page * STEPS_PER_PAGE)
        .take(STEPS_PER_PAGE);
    for (i, step) in page.enumerate() {
        let column = (i % STEPS_PER_LINE) as u32;
        let line = (i / STEPS_PER_LINE) as u32;
        let x = u32::from(origin.x) + column * u32::from(size.0 + SLOT_MARGIN_X);
        let y = u32::from(origin.y)
            + line * u32::from(size.1 + SLOT_MARGIN_Y)
            + u32::from(SLOT_MARGIN_Y);
        let (Ok(x), Ok(y)) = (u16::try_from(x), u16::try_from(y)) else {
            continue;
        };

        let cell = StepCell {
            step,
            variant: step_variant(is_playing, step),
            content: step_content(step, view.active_step, total_steps),
            palette,
        };
        cell.render(frame, Rect::new(x, y, size.0, size.1));
    }
}

struct StepCell<'a> {
    step: &'a Step,
    variant: StepVariant,
    content: Vec<String>,
    palette: StepPalette,
}

impl StepCell<'_> {
    fn render(self, frame: &mut Frame, cell: Rect) {
        let area = frame.area();
        let background = match self.variant {
            StepVariant::Current => self.palette.current,
            StepVariant::Active => self.palette.active,
            StepVariant::Inactive => self.palette.inactive,
        };

        let clipped = cell.intersection(area);
        if !clipped.is_empty() {
            let text: Vec<Line> = self.content.into_iter().map(Line::from).collect();
            let paragraph = Paragraph::new(text)
                .style(
                    Style::default()
                        .bg(background)
                        .fg(theme::SECONDARY_TEXT)
                        .add_modifier(Modifier::BOLD),
                )
                .block(Block::default().padding(Padding::new(2, 1, 1, 1)));
            frame.render_widget(paragraph, clipped);
        }

        if self.variant == StepVariant::Active {
            let blank = velocity_blank_rows(self.step.velocity(), cell.height);
            let bar = Rect::new(
                cell.x.saturating_add(cell.width),
                cell.y.saturating_add(blank),
                1,
                cell.height - blank,
            )
            .intersection(area);
            if !bar.is_empty() {
                let lines: Vec<Line> =
                    (0..bar.height).map(|_| Line::from(VELOCITY_GLYPH)).collect();
                frame.render_widget(
                    Paragraph::new(lines).style(Style::default().fg(background)),
                    bar,
                );
            }
        }
    }
}
