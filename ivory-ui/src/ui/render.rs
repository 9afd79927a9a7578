//! Key strip and status line.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph},
    Frame,
};

use ivory_audio::engine::visuals::KeyboardState;
use ivory_types::{PedalState, PIANO_HIGHEST, PIANO_LOWEST};

const KEY_COUNT: u16 = (PIANO_HIGHEST - PIANO_LOWEST + 1) as u16;

const WHITE_KEY: Color = Color::Rgb(220, 220, 210);
const BLACK_KEY: Color = Color::Rgb(30, 30, 30);
const PRESSED_KEY: Color = Color::Yellow;

const HELP: &str = "a..; play  z/x octave  tab layout  space pedal  esc panic  q quit";

/// Everything the renderer shows besides the key strip.
pub struct StatusView<'a> {
    pub keys: &'a KeyboardState,
    pub pedal: PedalState,
    pub active_notes: usize,
    pub sustained_notes: usize,
    pub cutoff_hz: Option<f32>,
    pub midi_port: Option<&'a str>,
    pub backend: &'a str,
    pub keyboard_label: String,
    pub message: Option<&'a str>,
}

fn is_black(midi_note: u8) -> bool {
    matches!(midi_note % 12, 1 | 3 | 6 | 8 | 10)
}

/// First and last key that fit in `width` columns, centred when narrower than 88.
fn visible_range(width: u16) -> (u8, u8) {
    if width >= KEY_COUNT {
        return (PIANO_LOWEST, PIANO_HIGHEST);
    }
    let first = PIANO_LOWEST + ((KEY_COUNT - width) / 2) as u8;
    (first, first + width.saturating_sub(1) as u8)
}

fn key_row(keys: &KeyboardState, first: u8, last: u8) -> Line<'static> {
    let spans: Vec<Span> = (first..=last)
        .map(|note| {
            let bg = if keys.is_pressed(note) {
                PRESSED_KEY
            } else if is_black(note) {
                BLACK_KEY
            } else {
                WHITE_KEY
            };
            Span::styled(" ", Style::default().bg(bg))
        })
        .collect();
    Line::from(spans)
}

fn octave_labels(first: u8, last: u8) -> Line<'static> {
    let mut text = String::new();
    let mut note = first;
    while note <= last {
        if note % 12 == 0 {
            let label = format!("C{}", note / 12 - 1);
            let room = (last - note + 1) as usize;
            text.push_str(&label[..label.len().min(room)]);
            note = note.saturating_add(label.len() as u8);
        } else {
            text.push(' ');
            note += 1;
        }
    }
    Line::styled(text, Style::default().fg(Color::DarkGray))
}

fn status_line(view: &StatusView) -> Line<'static> {
    let pedal = match view.pedal {
        PedalState::Down => Span::styled(
            "pedal down",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        PedalState::Up => Span::raw("pedal up"),
    };
    let cutoff = view
        .cutoff_hz
        .map(|hz| format!("{:.0} Hz", hz))
        .unwrap_or_else(|| "-".to_string());
    Line::from(vec![
        Span::styled(view.keyboard_label.clone(), Style::default().fg(Color::Black).bg(Color::Cyan)),
        Span::raw(" "),
        pedal,
        Span::raw(format!(
            "  notes {} ({} sustained)  filter {}  midi {}  out {}",
            view.active_notes,
            view.sustained_notes,
            cutoff,
            view.midi_port.unwrap_or("none"),
            view.backend,
        )),
    ])
}

pub fn render(frame: &mut Frame, view: &StatusView) {
    let block = Block::bordered().title(" ivory ");
    let inner = block.inner(frame.area());
    frame.render_widget(block, frame.area());

    let rows = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .split(inner);

    let (first, last) = visible_range(inner.width);
    let strip_width = (last - first + 1) as u16;
    let strip = Rect {
        x: inner.x + inner.width.saturating_sub(strip_width) / 2,
        width: strip_width.min(inner.width),
        ..rows[0]
    };
    let labels = Rect { y: rows[1].y, height: rows[1].height, ..strip };

    let key_line = key_row(view.keys, first, last);
    frame.render_widget(Paragraph::new(vec![key_line.clone(), key_line]), strip);
    frame.render_widget(Paragraph::new(octave_labels(first, last)), labels);

    frame.render_widget(Paragraph::new(status_line(view)), rows[3]);
    if let Some(message) = view.message {
        frame.render_widget(
            Paragraph::new(Line::styled(message.to_string(), Style::default().fg(Color::Red))),
            rows[4],
        );
    }
    frame.render_widget(
        Paragraph::new(Line::styled(HELP, Style::default().fg(Color::DarkGray))),
        rows[5],
    );
}
