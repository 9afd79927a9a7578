use std::collections::HashMap;
use std::time::{Duration, Instant};

use ivory_types::KeyboardLayout;

/// Translate a key character from the configured layout to QWERTY physical position.
pub fn translate_key(c: char, layout: KeyboardLayout) -> char {
    match layout {
        KeyboardLayout::Qwerty => c,
        KeyboardLayout::Colemak => colemak_to_qwerty(c),
    }
}

fn colemak_to_qwerty(c: char) -> char {
    match c {
        // top row
        'f' => 'e', 'p' => 'r', 'g' => 't', 'j' => 'y',
        'l' => 'u', 'u' => 'i', 'y' => 'o', ';' => 'p',
        // home row
        'r' => 's', 's' => 'd', 't' => 'f', 'd' => 'g',
        'n' => 'j', 'e' => 'k', 'i' => 'l', 'o' => ';',
        // bottom row
        'k' => 'n',
        other => other,
    }
}

/// Which pitch the home-row `a` key plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PianoLayout {
    C,
    A,
}

/// Computer-keyboard piano: key-to-pitch mapping plus held-key tracking.
///
/// Terminals without key-release events only report auto-repeat, so a key
/// counts as released once no event arrived for `release_timeout`. With the
/// kitty protocol the timeout is switched off and real releases are used.
pub struct PianoKeyboard {
    octave: i8,
    layout: PianoLayout,
    active_keys: HashMap<char, (u8, Instant)>, // char -> (pitch, last_event_time)
    release_timeout: Option<Duration>,
}

impl PianoKeyboard {
    pub fn new() -> Self {
        Self {
            octave: 4,
            layout: PianoLayout::C,
            active_keys: HashMap::new(),
            release_timeout: Some(Duration::from_millis(150)),
        }
    }

    #[cfg(test)]
    pub fn octave(&self) -> i8 {
        self.octave
    }

    #[cfg(test)]
    pub fn layout(&self) -> PianoLayout {
        self.layout
    }

    pub fn toggle_layout(&mut self) {
        self.layout = match self.layout {
            PianoLayout::C => PianoLayout::A,
            PianoLayout::A => PianoLayout::C,
        };
    }

    /// `None` disables timeout-based release (real key-release events available).
    pub fn set_release_timeout(&mut self, timeout: Option<Duration>) {
        self.release_timeout = timeout;
    }

    /// Decrease octave. Returns true if changed.
    pub fn octave_down(&mut self) -> bool {
        if self.octave > 0 {
            self.octave -= 1;
            true
        } else {
            false
        }
    }

    /// Increase octave. Returns true if changed.
    pub fn octave_up(&mut self) -> bool {
        if self.octave < 8 {
            self.octave += 1;
            true
        } else {
            false
        }
    }

    /// Status label for rendering, e.g. "PIANO C4".
    pub fn status_label(&self) -> String {
        match self.layout {
            PianoLayout::C => format!(" PIANO C{} ", self.octave),
            PianoLayout::A => format!(" PIANO A{} ", self.octave),
        }
    }

    /// Convert a keyboard character to a MIDI pitch using current octave and layout.
    pub fn key_to_pitch(&self, key: char) -> Option<u8> {
        let (offset, base) = match self.layout {
            PianoLayout::C => (Self::key_to_offset_c(key)?, (self.octave as i16 + 1) * 12),
            PianoLayout::A => (Self::key_to_offset_a(key)?, (self.octave as i16 + 1) * 12 - 3),
        };
        Some((base + offset as i16).clamp(0, 127) as u8)
    }

    // ── Held-key tracking ──────────────────────────────────────────

    /// Returns Some(pitch) if this is a NEW key press, None on auto-repeat.
    pub fn key_pressed(&mut self, c: char, pitch: u8, now: Instant) -> Option<u8> {
        if let Some((_, last)) = self.active_keys.get_mut(&c) {
            *last = now;
            return None;
        }
        self.active_keys.insert(c, (pitch, now));
        Some(pitch)
    }

    /// Explicit release. Returns the pitch that key started, if it was held.
    pub fn key_released(&mut self, c: char) -> Option<u8> {
        self.active_keys.remove(&c).map(|(pitch, _)| pitch)
    }

    /// Keys whose last event is older than the release timeout.
    pub fn check_releases(&mut self, now: Instant) -> Vec<(char, u8)> {
        let Some(timeout) = self.release_timeout else {
            return Vec::new();
        };
        let mut to_release = Vec::new();
        self.active_keys.retain(|&c, (pitch, last_time)| {
            if now.duration_since(*last_time) > timeout {
                to_release.push((c, *pitch));
                false
            } else {
                true
            }
        });
        to_release
    }

    /// Release all active keys, returns their pitches
    pub fn release_all(&mut self) -> Vec<u8> {
        self.active_keys.drain().map(|(_, (p, _))| p).collect()
    }

    #[cfg(test)]
    pub fn has_active_keys(&self) -> bool {
        !self.active_keys.is_empty()
    }

    /// Map a keyboard character to a MIDI note offset for C layout.
    fn key_to_offset_c(key: char) -> Option<u8> {
        match key {
            'a' => Some(0),   // C
            's' => Some(2),   // D
            'd' => Some(4),   // E
            'f' => Some(5),   // F
            'g' => Some(7),   // G
            'h' => Some(9),   // A
            'j' => Some(11),  // B
            'w' => Some(1),   // C#
            'e' => Some(3),   // D#
            't' => Some(6),   // F#
            'y' => Some(8),   // G#
            'u' => Some(10),  // A#
            'k' => Some(12),  // C (octave up)
            'l' => Some(14),  // D
            ';' => Some(16),  // E
            'o' => Some(13),  // C#
            'p' => Some(15),  // D#
            _ => None,
        }
    }

    /// Map a keyboard character to a MIDI note offset for A layout.
    fn key_to_offset_a(key: char) -> Option<u8> {
        match key {
            'a' => Some(0),   // A
            's' => Some(2),   // B
            'd' => Some(3),   // C
            'f' => Some(5),   // D
            'g' => Some(7),   // E
            'h' => Some(8),   // F
            'j' => Some(10),  // G
            'w' => Some(1),   // A#
            'e' => Some(4),   // C#
            't' => Some(6),   // D#
            'y' => Some(9),   // F#
            'u' => Some(11),  // G#
            'k' => Some(12),  // A (octave up)
            'l' => Some(14),  // B
            ';' => Some(15),  // C
            'o' => Some(13),  // A#
            'p' => Some(16),  // C#
            _ => None,
        }
    }
}

impl Default for PianoKeyboard {
    fn default() -> Self {
        Self::new()
    }
}
