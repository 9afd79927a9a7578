use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::{
    event::{
        self, Event, KeyCode as CrosstermKeyCode, KeyEvent, KeyEventKind, KeyModifiers,
        KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use ratatui::{backend::CrosstermBackend, Frame, Terminal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    Tab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Press,
    Repeat,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub kind: KeyKind,
    pub ctrl: bool,
}

/// Crossterm terminal in raw mode on the alternate screen.
pub struct TerminalHost {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    keyboard_enhancement_enabled: bool,
}

impl TerminalHost {
    /// Create a new host (does not start terminal mode)
    pub fn new() -> io::Result<Self> {
        let backend = CrosstermBackend::new(io::stdout());
        let terminal = Terminal::new(backend)?;
        Ok(Self {
            terminal,
            keyboard_enhancement_enabled: false,
        })
    }

    /// Enter raw mode and the alternate screen
    pub fn start(&mut self) -> io::Result<()> {
        enable_raw_mode()?;

        // Check terminal support BEFORE entering alternate screen
        let supports_enhancement = matches!(supports_keyboard_enhancement(), Ok(true));

        execute!(io::stdout(), EnterAlternateScreen)?;

        // Kitty keyboard protocol gives us real key-release events
        if supports_enhancement
            && execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                        | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                )
            )
            .is_ok()
        {
            self.keyboard_enhancement_enabled = true;
        }

        self.terminal.clear()?;
        Ok(())
    }

    /// Leave raw mode and the alternate screen
    pub fn stop(&mut self) -> io::Result<()> {
        // Pop keyboard enhancement flags BEFORE leaving alternate screen
        if self.keyboard_enhancement_enabled {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
            self.keyboard_enhancement_enabled = false;
        }

        disable_raw_mode()?;
        execute!(io::stdout(), LeaveAlternateScreen)?;
        Ok(())
    }

    /// Whether the Kitty keyboard protocol was successfully enabled.
    pub fn keyboard_enhancement_enabled(&self) -> bool {
        self.keyboard_enhancement_enabled
    }

    pub fn draw<F: FnOnce(&mut Frame)>(&mut self, f: F) -> io::Result<()> {
        self.terminal.draw(f)?;
        Ok(())
    }

    /// Wait up to `timeout` for the next key event we care about.
    pub fn poll_key(&mut self, timeout: Duration) -> io::Result<Option<KeyInput>> {
        let mut t = timeout;
        loop {
            if !event::poll(t)? {
                return Ok(None);
            }
            if let Event::Key(key_event) = event::read()? {
                if let Some(input) = convert_key_event(key_event) {
                    return Ok(Some(input));
                }
            }
            // Discarded event (resize, focus, unmapped key): drain with zero timeout
            t = Duration::ZERO;
        }
    }
}

fn convert_key_event(event: KeyEvent) -> Option<KeyInput> {
    let key = match event.code {
        CrosstermKeyCode::Char(c) => Key::Char(c),
        CrosstermKeyCode::Esc => Key::Escape,
        CrosstermKeyCode::Tab => Key::Tab,
        _ => return None,
    };
    let kind = match event.kind {
        KeyEventKind::Press => KeyKind::Press,
        KeyEventKind::Repeat => KeyKind::Repeat,
        KeyEventKind::Release => KeyKind::Release,
    };
    Some(KeyInput {
        key,
        kind,
        ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
    })
}
