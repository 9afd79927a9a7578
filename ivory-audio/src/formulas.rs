//! Pure numeric formulas used by the resolver, the scheduler and the filter
//! aggregator.
//!
//! The engine only ever calls these through the [`Formulas`] trait, so a
//! different piano model can be swapped in without touching lifecycle code.
//! Every method has a provided body; [`StandardFormulas`] uses them as-is.

use ivory_types::{
    DynamicFilter, PitchDrift, ReleaseTransient, SustainPedal, Timbre, TwoStageDecay,
    VelocityAttack, VelocityTimbre, MIDI_MAX,
};

/// Fundamental of A0, the lowest piano key.
const LOWEST_KEY_HZ: f32 = 27.5;
/// Fundamental of C8, the highest piano key.
const HIGHEST_KEY_HZ: f32 = 4186.009;
/// Reference frequency for pitch-scaled decay times (A4).
const DECAY_REFERENCE_HZ: f32 = 440.0;
/// Reference frequency for loudness compensation.
const LOUDNESS_REFERENCE_HZ: f32 = 1000.0;

fn velocity_fraction(velocity: u8) -> f32 {
    velocity.min(MIDI_MAX) as f32 / MIDI_MAX as f32
}

/// Position of `frequency` across the keyboard: 0.0 at A0, 1.0 at C8.
pub fn keyboard_position(frequency: f32) -> f32 {
    if frequency <= 0.0 {
        return 0.0;
    }
    let span = (HIGHEST_KEY_HZ / LOWEST_KEY_HZ).log2();
    ((frequency / LOWEST_KEY_HZ).log2() / span).clamp(0.0, 1.0)
}

pub trait Formulas: Send {
    /// Velocity power curve, `(v / 127)^k`, in 0..=1.
    fn velocity_amplitude(&self, velocity: u8, exponent: f32) -> f32 {
        velocity_fraction(velocity).powf(exponent.max(0.01)).clamp(0.0, 1.0)
    }

    /// Gain multiplier that lifts notes far from 1 kHz, where the ear is least sensitive.
    fn loudness_compensation(&self, frequency: f32) -> f32 {
        if frequency <= 0.0 {
            return 1.0;
        }
        let octaves = (frequency / LOUDNESS_REFERENCE_HZ).log2().abs();
        1.0 + 0.06 * octaves
    }

    /// Attack time for a velocity; strictly decreasing as velocity rises.
    fn velocity_attack(&self, velocity: u8, params: &VelocityAttack) -> f32 {
        let t = velocity_fraction(velocity);
        params.slowest + (params.fastest - params.slowest) * t
    }

    /// First-stage decay time; louder strikes decay faster.
    fn fast_decay(&self, velocity: u8, params: &TwoStageDecay) -> f32 {
        let t = velocity_fraction(velocity);
        params.fast_decay_soft + (params.fast_decay_loud - params.fast_decay_soft) * t
    }

    /// Step function of velocity onto the three waveform classes.
    fn velocity_timbre(&self, velocity: u8, params: &VelocityTimbre) -> Timbre {
        if velocity < params.soft_below {
            Timbre::Soft
        } else if velocity >= params.loud_from {
            Timbre::Loud
        } else {
            Timbre::Medium
        }
    }

    /// Keytracked starting cutoff scaled by velocity.
    fn initial_cutoff(&self, frequency: f32, velocity: u8, params: &DynamicFilter) -> f32 {
        let scale = params.min_velocity_scale
            + (1.0 - params.min_velocity_scale) * velocity_fraction(velocity);
        params.clamp_cutoff(frequency * params.keytrack_ratio * scale)
    }

    /// Lowest brightness a decaying note settles to.
    fn filter_floor(&self, frequency: f32, params: &DynamicFilter) -> f32 {
        params.clamp_cutoff(frequency * params.floor_ratio)
    }

    /// Brightness decay time constant; higher notes darken faster.
    fn filter_decay_time(&self, frequency: f32, params: &DynamicFilter) -> f32 {
        if frequency <= 0.0 {
            return params.base_decay_secs;
        }
        (params.base_decay_secs * (DECAY_REFERENCE_HZ / frequency).sqrt()).max(0.01)
    }

    /// How long a pedal-held note rings before it is let go; lower notes last longer.
    fn sustain_duration(&self, frequency: f32, params: &SustainPedal) -> f32 {
        let pos = keyboard_position(frequency);
        (params.longest_secs + (params.shortest_secs - params.longest_secs) * pos).max(0.0)
    }

    /// Length of the damper thump, in seconds; lower notes thump longer.
    fn release_transient_duration(&self, frequency: f32, params: &ReleaseTransient) -> f32 {
        let pos = keyboard_position(frequency);
        ((params.longest_ms + (params.shortest_ms - params.longest_ms) * pos) / 1000.0).max(0.0)
    }

    /// Pitch offset in cents.
    ///
    /// Settle-in from an initial offset, vibrato fading in during the sustain,
    /// and a downward droop once the key is released.
    fn pitch_offset_cents(
        &self,
        since_attack: f32,
        since_release: Option<f32>,
        params: &PitchDrift,
    ) -> f32 {
        let t = since_attack.max(0.0);
        let settle = if params.settle_secs > 0.0 {
            params.settle_cents * (-t / params.settle_secs).exp()
        } else {
            0.0
        };

        let onset = if params.vibrato_onset_secs > 0.0 {
            (t / params.vibrato_onset_secs).min(1.0)
        } else {
            1.0
        };
        let vibrato = params.vibrato_depth_cents
            * onset
            * (std::f32::consts::TAU * params.vibrato_rate_hz * t).sin();

        let droop = match since_release {
            Some(r) if params.release_drift_secs > 0.0 => {
                -params.release_drift_cents * (1.0 - (-r.max(0.0) / params.release_drift_secs).exp())
            }
            Some(_) => -params.release_drift_cents,
            None => 0.0,
        };

        settle + vibrato + droop
    }
}

/// The default piano model.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFormulas;

impl Formulas for StandardFormulas {}
