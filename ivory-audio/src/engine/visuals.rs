//! Pressed/unpressed key display state.
//!
//! The engine reports key presses through [`KeyVisuals`]; the terminal host
//! reads a shared [`KeyboardState`] when it renders.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ivory_types::MIDI_MAX;

pub trait KeyVisuals: Send {
    fn set_key(&self, midi_note: u8, pressed: bool);
    fn release_all_keys(&self);
}

/// Lock-free bitmap of all 128 MIDI keys.
#[derive(Debug, Default)]
pub struct KeyboardState {
    bits: [AtomicU64; 2],
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(midi_note: u8) -> (usize, u64) {
        let note = midi_note.min(MIDI_MAX);
        ((note / 64) as usize, 1u64 << (note % 64))
    }

    pub fn is_pressed(&self, midi_note: u8) -> bool {
        let (word, mask) = Self::slot(midi_note);
        self.bits[word].load(Ordering::Relaxed) & mask != 0
    }

    pub fn pressed_count(&self) -> usize {
        self.bits
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }

    pub fn pressed_keys(&self) -> Vec<u8> {
        (0..=MIDI_MAX).filter(|&n| self.is_pressed(n)).collect()
    }
}

impl KeyVisuals for Arc<KeyboardState> {
    fn set_key(&self, midi_note: u8, pressed: bool) {
        let (word, mask) = KeyboardState::slot(midi_note);
        if pressed {
            self.bits[word].fetch_or(mask, Ordering::Relaxed);
        } else {
            self.bits[word].fetch_and(!mask, Ordering::Relaxed);
        }
    }

    fn release_all_keys(&self) {
        for word in &self.bits {
            word.store(0, Ordering::Relaxed);
        }
    }
}

/// Discards all key updates.
pub struct NullVisuals;

impl KeyVisuals for NullVisuals {
    fn set_key(&self, _: u8, _: bool) {}
    fn release_all_keys(&self) {}
}
