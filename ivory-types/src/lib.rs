//! # ivory-types
//!
//! Shared type definitions for the ivory piano workspace.
//! This crate holds the data model read by the engine (`ivory-audio`), the
//! config and MIDI layer (`ivory-core`) and the terminal host (`ivory-ui`).

mod envelope;
mod note;
pub mod settings;

pub use envelope::EnvConfig;
pub use note::{AutomationKind, NoteParameters, PedalState, Timbre, TransientKind};
pub use settings::*;

/// Highest valid MIDI data byte (note number, velocity, controller value).
pub const MIDI_MAX: u8 = 127;

/// Controller number of the sustain (damper) pedal.
pub const SUSTAIN_CONTROLLER: u8 = 64;

/// Lowest and highest keys of an 88-key piano (A0 and C8).
pub const PIANO_LOWEST: u8 = 21;
pub const PIANO_HIGHEST: u8 = 108;

/// Clamp a MIDI data byte into 0..=127. Out-of-range input is clamped, never rejected.
pub fn clamp_midi(value: u8) -> u8 {
    value.min(MIDI_MAX)
}

/// Equal-tempered frequency of a MIDI note relative to the given A4 tuning.
pub fn midi_to_frequency(note: u8, tuning_a4: f32) -> f32 {
    tuning_a4 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

/// Physical layout of the computer keyboard used as a piano.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyboardLayout {
    #[default]
    Qwerty,
    Colemak,
}

/// Opaque handle to one voice in the external synthesis engine.
///
/// A fresh id is allocated for every note-on, so a retriggered pitch never
/// shares a handle with the instance it replaced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct VoiceId(u32);

impl VoiceId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}
