//! Settings snapshot + strike to concrete per-note synthesis parameters.
//!
//! Pure: no clock, no registry, no output. Identical inputs give
//! bit-identical output.

use ivory_types::{clamp_midi, GlobalSettings, NoteParameters};

use crate::formulas::Formulas;

/// Resolve the envelope, amplitude, timbre and starting filter cutoff for one strike.
///
/// Each stage only applies when its section is enabled; otherwise the base
/// envelope / velocity value passes through unmodified.
pub fn resolve_note_parameters(
    velocity: u8,
    frequency: f32,
    midi_note: u8,
    settings: &GlobalSettings,
    formulas: &dyn Formulas,
) -> NoteParameters {
    let velocity = clamp_midi(velocity);
    let base = settings.envelope;

    let attack = if settings.velocity_attack.enabled {
        formulas.velocity_attack(velocity, &settings.velocity_attack)
    } else {
        base.attack
    };

    let (decay, sustain) = if settings.two_stage_decay.enabled {
        (
            formulas.fast_decay(velocity, &settings.two_stage_decay),
            base.sustain * settings.two_stage_decay.amplitude_ratio,
        )
    } else {
        (base.decay, base.sustain)
    };

    let mut amplitude = formulas.velocity_amplitude(velocity, settings.velocity_curve.exponent);
    if settings.velocity_curve.loudness_compensation {
        amplitude *= formulas.loudness_compensation(frequency);
    }
    let amplitude = amplitude.clamp(0.0, 1.0);

    // Velocity timbre takes precedence over the fixed default whenever it is enabled.
    let timbre = if settings.velocity_timbre.enabled {
        formulas.velocity_timbre(velocity, &settings.velocity_timbre)
    } else {
        settings.default_timbre
    };

    let initial_filter_cutoff =
        formulas.initial_cutoff(frequency, velocity, &settings.dynamic_filter);

    log::trace!(
        target: "audio::resolver",
        "note {} vel {}: amp {:.3} timbre {} cutoff {:.0}Hz",
        midi_note,
        velocity,
        amplitude,
        timbre.name(),
        initial_filter_cutoff
    );

    NoteParameters {
        attack: attack.max(0.0),
        decay: decay.max(0.0),
        sustain: sustain.clamp(0.0, 1.0),
        release: base.release.max(0.0),
        amplitude,
        timbre,
        initial_filter_cutoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulas::StandardFormulas;
    use ivory_types::{midi_to_frequency, Timbre};

    fn resolve(velocity: u8, note: u8, settings: &GlobalSettings) -> NoteParameters {
        let freq = midi_to_frequency(note, settings.tuning_a4);
        resolve_note_parameters(velocity, freq, note, settings, &StandardFormulas)
    }

    #[test]
    fn disabled_features_pass_base_envelope_through() {
        let mut settings = GlobalSettings::default();
        settings.velocity_attack.enabled = false;
        settings.two_stage_decay.enabled = false;
        let p = resolve(90, 60, &settings);
        assert_eq!(p.attack, settings.envelope.attack);
        assert_eq!(p.decay, settings.envelope.decay);
        assert_eq!(p.sustain, settings.envelope.sustain);
        assert_eq!(p.release, settings.envelope.release);
    }

    #[test]
    fn velocity_attack_overrides_base() {
        let mut settings = GlobalSettings::default();
        settings.velocity_attack.enabled = true;
        let loud = resolve(127, 60, &settings);
        let soft = resolve(10, 60, &settings);
        assert!(loud.attack < soft.attack);
        assert_ne!(loud.attack, settings.envelope.attack);
    }

    #[test]
    fn two_stage_decay_scales_sustain() {
        let mut settings = GlobalSettings::default();
        settings.two_stage_decay.enabled = true;
        let p = resolve(100, 60, &settings);
        let expected = settings.envelope.sustain * settings.two_stage_decay.amplitude_ratio;
        assert!((p.sustain - expected).abs() < 1e-6);
        assert!(resolve(127, 60, &settings).decay < resolve(20, 60, &settings).decay);
    }

    #[test]
    fn amplitude_stays_in_unit_range_with_compensation() {
        let mut settings = GlobalSettings::default();
        settings.velocity_curve.loudness_compensation = true;
        for note in [21u8, 60, 108] {
            let p = resolve(127, note, &settings);
            assert!((0.0..=1.0).contains(&p.amplitude));
        }
        let compensated = resolve(40, 21, &settings).amplitude;
        settings.velocity_curve.loudness_compensation = false;
        assert!(compensated > resolve(40, 21, &settings).amplitude);
    }

    #[test]
    fn timbre_precedence() {
        let mut settings = GlobalSettings::default();
        settings.default_timbre = Timbre::Soft;
        settings.velocity_timbre.enabled = true;
        assert_eq!(resolve(127, 60, &settings).timbre, Timbre::Loud);

        settings.velocity_timbre.enabled = false;
        assert_eq!(resolve(127, 60, &settings).timbre, Timbre::Soft);
    }

    #[test]
    fn out_of_range_velocity_is_clamped() {
        let settings = GlobalSettings::default();
        assert_eq!(resolve(200, 60, &settings), resolve(127, 60, &settings));
    }

    #[test]
    fn deterministic_bit_for_bit() {
        let mut settings = GlobalSettings::default();
        settings.velocity_attack.enabled = true;
        settings.two_stage_decay.enabled = true;
        settings.velocity_curve.loudness_compensation = true;
        let a = resolve(77, 43, &settings);
        let b = resolve(77, 43, &settings);
        assert_eq!(a.attack.to_bits(), b.attack.to_bits());
        assert_eq!(a.decay.to_bits(), b.decay.to_bits());
        assert_eq!(a.sustain.to_bits(), b.sustain.to_bits());
        assert_eq!(a.amplitude.to_bits(), b.amplitude.to_bits());
        assert_eq!(a.initial_filter_cutoff.to_bits(), b.initial_filter_cutoff.to_bits());
        assert_eq!(a.timbre, b.timbre);
    }
}
