//! Frame composition: transport, step grid, parameters, filler, help.
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use super::keymap::{KeyBinding, KeyMap};
use super::params::Parameter;
use super::{page_count, step, theme, App, ViewState};
use crate::sequencer::{Engine, Track};

const TITLE: &str = "SQNC";
const HELP_SEPARATOR: &str = " • ";
const HELP_COLUMN_GAP: &str = "    ";

/// Lines of empty space between content and help so the frame fills the
/// terminal exactly; zero once content reaches the bottom.
pub fn filler_height(terminal_height: u16, content_height: u16) -> u16 {
    terminal_height.saturating_sub(content_height)
}

pub fn render<E: Engine>(frame: &mut Frame, app: &App<E>) {
    let area = frame.area();
    let engine = app.engine();
    let view = app.view();
    let track = engine.tracks().get(view.active_track);

    let transport = transport_lines(engine, view);
    let params = track
        .map(|track| param_lines(app.parameters(), track, view.active_param))
        .unwrap_or_default();
    let help = help_lines(app.keymap(), view.help_expanded);
    let grid_height = track
        .map(|track| step::grid_height(view.width, track, view.active_track_page))
        .unwrap_or(0);

    let content_height = (transport.len() as u16)
        .saturating_add(grid_height)
        .saturating_add(params.len() as u16)
        .saturating_add(help.len() as u16);
    let filler = filler_height(area.height, content_height);

    let mut y = area.y;
    y = draw_lines(frame, y, transport);
    if let Some(track) = track {
        step::render_grid(
            frame,
            Rect::new(area.x, y, area.width, grid_height),
            track,
            view,
            engine.is_playing(),
        );
    }
    y = y.saturating_add(grid_height);
    y = draw_lines(frame, y, params);
    y = y.saturating_add(filler);
    draw_lines(frame, y, help);
}

/// Draw `lines` full width starting at row `y`, clipped to the frame.
/// Returns the row after the block.
fn draw_lines(frame: &mut Frame, y: u16, lines: Vec<Line<'static>>) -> u16 {
    let area = frame.area();
    let height = lines.len() as u16;
    let target = Rect::new(area.x, y, area.width, height).intersection(area);
    if !target.is_empty() {
        frame.render_widget(Paragraph::new(lines), target);
    }
    y.saturating_add(height)
}

fn transport_lines<E: Engine>(engine: &E, view: &ViewState) -> Vec<Line<'static>> {
    let status = if engine.is_playing() { "▶" } else { "■" };
    let pages = engine
        .tracks()
        .get(view.active_track)
        .map_or(1, |track| page_count(track.steps().len()));

    let header = Line::from(vec![
        Span::styled(
            format!(" {TITLE} "),
            Style::default()
                .fg(theme::PRIMARY)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" {status} {:.1} bpm  ", engine.tempo())),
        Span::styled(
            view.mode.label(),
            Style::default().add_modifier(Modifier::REVERSED),
        ),
        Span::raw(format!(
            "  track {}  page {}/{}",
            view.active_track + 1,
            view.active_track_page + 1,
            pages
        )),
    ]);

    let tracks: Vec<Span> = engine
        .tracks()
        .iter()
        .enumerate()
        .map(|(i, track)| track_badge(i, track, i == view.active_track))
        .collect();

    vec![header, Line::from(tracks)]
}

fn track_badge(index: usize, track: &Track, selected: bool) -> Span<'static> {
    let mut style = Style::default().fg(if track.is_active() {
        theme::SECONDARY_TEXT
    } else {
        theme::MUTED_TEXT
    });
    if selected {
        style = style.bg(theme::step_palette(track.is_active()).active);
    }
    Span::styled(format!(" {:>2} ", index + 1), style)
}

fn param_lines(parameters: &[Parameter], track: &Track, active: usize) -> Vec<Line<'static>> {
    let mut spans = vec![Span::raw(" ")];
    for (i, param) in parameters.iter().enumerate() {
        let style = if i == active {
            Style::default()
                .fg(theme::PRIMARY)
                .add_modifier(Modifier::BOLD | Modifier::REVERSED)
        } else {
            Style::default().fg(theme::SECONDARY_TEXT)
        };
        spans.push(Span::styled(
            format!(" {} {} ", param.name(), param.display(track)),
            style,
        ));
        spans.push(Span::raw(" "));
    }
    vec![Line::default(), Line::from(spans)]
}

fn help_lines(keymap: &KeyMap, expanded: bool) -> Vec<Line<'static>> {
    let style = Style::default().fg(theme::MUTED_TEXT);
    if !expanded {
        let text = keymap
            .short_help()
            .into_iter()
            .map(help_entry)
            .collect::<Vec<_>>()
            .join(HELP_SEPARATOR);
        return vec![Line::from(Span::styled(format!(" {text}"), style))];
    }

    // One column per group, one binding per row.
    let columns: Vec<Vec<String>> = keymap
        .full_help()
        .into_iter()
        .map(|group| group.into_iter().map(help_entry).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .map(|column| column.iter().map(|e| e.chars().count()).max().unwrap_or(0))
        .collect();
    let rows = columns.iter().map(Vec::len).max().unwrap_or(0);

    (0..rows)
        .map(|row| {
            let text = columns
                .iter()
                .zip(&widths)
                .map(|(column, width)| {
                    let entry = column.get(row).map(String::as_str).unwrap_or("");
                    format!("{entry:<width$}", width = *width)
                })
                .collect::<Vec<_>>()
                .join(HELP_COLUMN_GAP);
            Line::from(Span::styled(format!(" {}", text.trim_end()), style))
        })
        .collect()
}

fn help_entry(binding: &KeyBinding) -> String {
    format!("{} {}", binding.help().key, binding.help().desc)
}
