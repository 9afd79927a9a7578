//! The only path from the lifecycle engine to sound and visuals.
//!
//! Every call is fire-and-forget: backend failures are logged at warn and
//! swallowed, so a voice the synth server already stole never disturbs the
//! engine's own bookkeeping.

use std::time::Duration;

use ivory_types::{EnvConfig, NoteParameters, TransientKind, VoiceId};

use super::backend::{NullBackend, VoiceBackend, VoiceSpec};
use super::visuals::{KeyVisuals, NullVisuals};

pub struct OutputAdapter {
    voices: Box<dyn VoiceBackend>,
    keys: Box<dyn KeyVisuals>,
}

impl OutputAdapter {
    pub fn new(voices: Box<dyn VoiceBackend>, keys: Box<dyn KeyVisuals>) -> Self {
        Self { voices, keys }
    }

    /// Silent adapter for headless runs.
    pub fn null() -> Self {
        Self::new(Box::new(NullBackend), Box::new(NullVisuals))
    }

    pub fn attack_voice(
        &self,
        voice: VoiceId,
        midi_note: u8,
        frequency: f32,
        params: &NoteParameters,
    ) {
        let spec = VoiceSpec {
            voice,
            midi_note,
            frequency,
            timbre: params.timbre,
            envelope: EnvConfig {
                attack: params.attack,
                decay: params.decay,
                sustain: params.sustain,
                release: params.release,
            },
            amplitude: params.amplitude,
        };
        if let Err(e) = self.voices.attack_voice(&spec) {
            log::warn!(target: "audio::output", "attack {} (note {}) failed: {}", voice, midi_note, e);
        }
    }

    pub fn release_voice(&self, voice: VoiceId) {
        if let Err(e) = self.voices.release_voice(voice) {
            log::warn!(target: "audio::output", "release {} ignored: {}", voice, e);
        }
    }

    pub fn ramp_filter(&self, target_hz: f32, time_constant: f32) {
        if let Err(e) = self.voices.ramp_filter(target_hz, time_constant) {
            log::warn!(target: "audio::output", "filter ramp to {:.0}Hz failed: {}", target_hz, e);
        }
    }

    pub fn start_transient(&self, voice: VoiceId, kind: TransientKind, level: f32, duration: Duration) {
        if let Err(e) = self.voices.start_transient(voice, kind, level, duration) {
            log::warn!(target: "audio::output", "{:?} transient on {} failed: {}", kind, voice, e);
        }
    }

    pub fn stop_transient(&self, voice: VoiceId, kind: TransientKind) {
        if let Err(e) = self.voices.stop_transient(voice, kind) {
            log::warn!(target: "audio::output", "stop {:?} transient on {} ignored: {}", kind, voice, e);
        }
    }

    pub fn set_pitch_offset(&self, voice: VoiceId, cents: f32) {
        if let Err(e) = self.voices.set_pitch_offset(voice, cents) {
            log::warn!(target: "audio::output", "pitch offset on {} failed: {}", voice, e);
        }
    }

    pub fn set_key_pressed(&self, midi_note: u8) {
        self.keys.set_key(midi_note, true);
    }

    pub fn set_key_released(&self, midi_note: u8) {
        self.keys.set_key(midi_note, false);
    }

    /// Release every voice on the server and clear every key, tracked or not.
    pub fn release_everything(&self) {
        if let Err(e) = self.voices.release_all() {
            log::warn!(target: "audio::output", "release-all failed: {}", e);
        }
        self.keys.release_all_keys();
    }
}
