//! Global settings snapshot consumed read-only by the engine.
//!
//! Every section carries its own `enabled` flag (where it can be switched
//! off) and the numeric parameters of the formulas it drives. All sections
//! are `#[serde(default)]` so a partial TOML table only overrides the keys
//! it names.

use serde::{Deserialize, Serialize};

use crate::{EnvConfig, Timbre};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    /// Reference pitch of A4 in Hz.
    pub tuning_a4: f32,
    /// Timbre used when velocity-timbre is disabled.
    pub default_timbre: Timbre,
    pub envelope: EnvConfig,
    pub velocity_curve: VelocityCurve,
    pub velocity_attack: VelocityAttack,
    pub two_stage_decay: TwoStageDecay,
    pub velocity_timbre: VelocityTimbre,
    pub dynamic_filter: DynamicFilter,
    pub sustain_pedal: SustainPedal,
    pub attack_noise: AttackNoise,
    pub release_transient: ReleaseTransient,
    pub pitch_drift: PitchDrift,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            tuning_a4: 440.0,
            default_timbre: Timbre::Medium,
            envelope: EnvConfig::default(),
            velocity_curve: VelocityCurve::default(),
            velocity_attack: VelocityAttack::default(),
            two_stage_decay: TwoStageDecay::default(),
            velocity_timbre: VelocityTimbre::default(),
            dynamic_filter: DynamicFilter::default(),
            sustain_pedal: SustainPedal::default(),
            attack_noise: AttackNoise::default(),
            release_transient: ReleaseTransient::default(),
            pitch_drift: PitchDrift::default(),
        }
    }
}

/// Longest time any timed setting may ask for, seconds.
pub const MAX_SETTING_SECS: f32 = 3600.0;

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Finite, non-negative and at most `max`; NaN and infinities take `fallback`.
fn bounded(value: f32, fallback: f32, max: f32) -> f32 {
    finite_or(value, fallback).clamp(0.0, max)
}

impl GlobalSettings {
    /// Bring every value into a range the engine can act on: non-finite
    /// numbers fall back to their defaults, inverted bounds are swapped and
    /// durations are capped at [`MAX_SETTING_SECS`]. Returns true if anything changed.
    pub fn sanitize(&mut self) -> bool {
        let before = self.clone();
        let d = GlobalSettings::default();

        self.tuning_a4 = finite_or(self.tuning_a4, d.tuning_a4);
        if self.tuning_a4 <= 0.0 {
            self.tuning_a4 = d.tuning_a4;
        }

        let env = &mut self.envelope;
        env.attack = bounded(env.attack, d.envelope.attack, MAX_SETTING_SECS);
        env.decay = bounded(env.decay, d.envelope.decay, MAX_SETTING_SECS);
        env.sustain = bounded(env.sustain, d.envelope.sustain, 1.0);
        env.release = bounded(env.release, d.envelope.release, MAX_SETTING_SECS);

        let curve = &mut self.velocity_curve;
        curve.exponent = finite_or(curve.exponent, d.velocity_curve.exponent).max(0.01);

        let attack = &mut self.velocity_attack;
        attack.fastest = bounded(attack.fastest, d.velocity_attack.fastest, MAX_SETTING_SECS);
        attack.slowest = bounded(attack.slowest, d.velocity_attack.slowest, MAX_SETTING_SECS);

        let decay = &mut self.two_stage_decay;
        let td = d.two_stage_decay;
        decay.fast_decay_loud = bounded(decay.fast_decay_loud, td.fast_decay_loud, MAX_SETTING_SECS);
        decay.fast_decay_soft = bounded(decay.fast_decay_soft, td.fast_decay_soft, MAX_SETTING_SECS);
        decay.amplitude_ratio = bounded(decay.amplitude_ratio, td.amplitude_ratio, 1.0);

        let timbre = &mut self.velocity_timbre;
        if timbre.soft_below > timbre.loud_from {
            std::mem::swap(&mut timbre.soft_below, &mut timbre.loud_from);
        }

        let filter = &mut self.dynamic_filter;
        let fd = d.dynamic_filter;
        filter.keytrack_ratio = bounded(filter.keytrack_ratio, fd.keytrack_ratio, f32::MAX);
        filter.min_velocity_scale = bounded(filter.min_velocity_scale, fd.min_velocity_scale, 1.0);
        filter.floor_ratio = bounded(filter.floor_ratio, fd.floor_ratio, f32::MAX);
        filter.base_decay_secs = bounded(filter.base_decay_secs, fd.base_decay_secs, MAX_SETTING_SECS);
        filter.open_cutoff_hz = bounded(filter.open_cutoff_hz, fd.open_cutoff_hz, f32::MAX);
        filter.min_cutoff_hz = bounded(filter.min_cutoff_hz, fd.min_cutoff_hz, f32::MAX);
        filter.max_cutoff_hz = bounded(filter.max_cutoff_hz, fd.max_cutoff_hz, f32::MAX);
        if filter.min_cutoff_hz > filter.max_cutoff_hz {
            std::mem::swap(&mut filter.min_cutoff_hz, &mut filter.max_cutoff_hz);
        }
        filter.ramp_time_constant =
            bounded(filter.ramp_time_constant, fd.ramp_time_constant, MAX_SETTING_SECS);
        filter.open_time_constant =
            bounded(filter.open_time_constant, fd.open_time_constant, MAX_SETTING_SECS);
        filter.update_every_frames = filter.update_every_frames.max(1);

        let pedal = &mut self.sustain_pedal;
        let pd = d.sustain_pedal;
        pedal.shortest_secs = bounded(pedal.shortest_secs, pd.shortest_secs, MAX_SETTING_SECS);
        pedal.longest_secs = bounded(pedal.longest_secs, pd.longest_secs, MAX_SETTING_SECS);

        let noise = &mut self.attack_noise;
        noise.duration_ms = bounded(noise.duration_ms, d.attack_noise.duration_ms, MAX_SETTING_SECS * 1000.0);
        noise.level = bounded(noise.level, d.attack_noise.level, 1.0);

        let release = &mut self.release_transient;
        let rd = d.release_transient;
        release.shortest_ms = bounded(release.shortest_ms, rd.shortest_ms, MAX_SETTING_SECS * 1000.0);
        release.longest_ms = bounded(release.longest_ms, rd.longest_ms, MAX_SETTING_SECS * 1000.0);
        release.level = bounded(release.level, rd.level, 1.0);

        let drift = &mut self.pitch_drift;
        let dd = d.pitch_drift;
        drift.settle_cents = finite_or(drift.settle_cents, dd.settle_cents);
        drift.settle_secs = bounded(drift.settle_secs, dd.settle_secs, MAX_SETTING_SECS);
        drift.vibrato_rate_hz = bounded(drift.vibrato_rate_hz, dd.vibrato_rate_hz, 1000.0);
        drift.vibrato_depth_cents = finite_or(drift.vibrato_depth_cents, dd.vibrato_depth_cents);
        drift.vibrato_onset_secs = bounded(drift.vibrato_onset_secs, dd.vibrato_onset_secs, MAX_SETTING_SECS);
        drift.release_drift_cents = finite_or(drift.release_drift_cents, dd.release_drift_cents);
        drift.release_drift_secs = bounded(drift.release_drift_secs, dd.release_drift_secs, MAX_SETTING_SECS);
        drift.update_interval_ms = bounded(drift.update_interval_ms, dd.update_interval_ms, 1000.0).max(1.0);

        *self != before
    }
}

/// Velocity to amplitude mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityCurve {
    /// Power-curve exponent `k` (amplitude = (v/127)^k). 1.5..=2.5 is typical.
    pub exponent: f32,
    /// Scale amplitude by an equal-loudness style multiplier of frequency.
    pub loudness_compensation: bool,
}

impl Default for VelocityCurve {
    fn default() -> Self {
        Self {
            exponent: 2.0,
            loudness_compensation: false,
        }
    }
}

/// Louder strikes reach full level faster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityAttack {
    pub enabled: bool,
    /// Attack time at velocity 127, seconds.
    pub fastest: f32,
    /// Attack time at velocity 1, seconds.
    pub slowest: f32,
}

impl Default for VelocityAttack {
    fn default() -> Self {
        Self {
            enabled: false,
            fastest: 0.001,
            slowest: 0.02,
        }
    }
}

/// Fast "prompt sound" decay followed by a slower aftersound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoStageDecay {
    pub enabled: bool,
    /// First-stage decay at velocity 127, seconds.
    pub fast_decay_loud: f32,
    /// First-stage decay at velocity 1, seconds.
    pub fast_decay_soft: f32,
    /// Level of the aftersound relative to the base sustain level.
    pub amplitude_ratio: f32,
}

impl Default for TwoStageDecay {
    fn default() -> Self {
        Self {
            enabled: false,
            fast_decay_loud: 0.15,
            fast_decay_soft: 0.6,
            amplitude_ratio: 0.35,
        }
    }
}

/// Waveform class selected by velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityTimbre {
    pub enabled: bool,
    /// Velocities below this use the soft class.
    pub soft_below: u8,
    /// Velocities at or above this use the loud class.
    pub loud_from: u8,
}

impl Default for VelocityTimbre {
    fn default() -> Self {
        Self {
            enabled: true,
            soft_below: 50,
            loud_from: 100,
        }
    }
}

/// Shared post-filter that follows the brightest decaying note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicFilter {
    pub enabled: bool,
    /// Initial cutoff as a multiple of the fundamental, before velocity scaling.
    pub keytrack_ratio: f32,
    /// Velocity multiplier at velocity 0; velocity 127 gives 1.0.
    pub min_velocity_scale: f32,
    /// Brightness floor as a multiple of the fundamental.
    pub floor_ratio: f32,
    /// Decay time constant of a note at A4, seconds. Scales with pitch.
    pub base_decay_secs: f32,
    /// Cutoff the filter returns to when nothing is sounding.
    pub open_cutoff_hz: f32,
    /// Lower and upper bounds applied to every computed cutoff.
    pub min_cutoff_hz: f32,
    pub max_cutoff_hz: f32,
    /// Time constant of the ramp while notes are sounding, seconds.
    pub ramp_time_constant: f32,
    /// Time constant of the ramp back to fully open, seconds.
    pub open_time_constant: f32,
    /// Run the aggregator every N host frames.
    pub update_every_frames: u32,
}

impl Default for DynamicFilter {
    fn default() -> Self {
        Self {
            enabled: true,
            keytrack_ratio: 12.0,
            min_velocity_scale: 0.3,
            floor_ratio: 2.0,
            base_decay_secs: 1.5,
            open_cutoff_hz: 20_000.0,
            min_cutoff_hz: 40.0,
            max_cutoff_hz: 20_000.0,
            ramp_time_constant: 0.03,
            open_time_constant: 0.25,
            update_every_frames: 3,
        }
    }
}

impl DynamicFilter {
    /// Clamp into `min_cutoff_hz..=max_cutoff_hz`, tolerating inverted or NaN bounds.
    pub fn clamp_cutoff(&self, hz: f32) -> f32 {
        let (a, b) = (self.min_cutoff_hz, self.max_cutoff_hz);
        let lo = if a.is_nan() { 0.0 } else { a };
        let hi = if b.is_nan() { f32::INFINITY } else { b };
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        if hz.is_nan() {
            return lo;
        }
        hz.clamp(lo, hi)
    }
}

/// Damper pedal behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SustainPedal {
    /// Controller values at or above this count as pedal down.
    pub threshold: u8,
    /// Natural sustain of the highest key (C8), seconds.
    pub shortest_secs: f32,
    /// Natural sustain of the lowest key (A0), seconds.
    pub longest_secs: f32,
}

impl Default for SustainPedal {
    fn default() -> Self {
        Self {
            threshold: 64,
            shortest_secs: 3.0,
            longest_secs: 25.0,
        }
    }
}

/// Hammer noise layered over the first milliseconds of a note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackNoise {
    pub enabled: bool,
    pub duration_ms: f32,
    /// Level relative to the note amplitude.
    pub level: f32,
}

impl Default for AttackNoise {
    fn default() -> Self {
        Self {
            enabled: false,
            duration_ms: 30.0,
            level: 0.12,
        }
    }
}

/// Damper thump sounded when a key is let go.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseTransient {
    pub enabled: bool,
    /// Duration for the highest key, milliseconds.
    pub shortest_ms: f32,
    /// Duration for the lowest key, milliseconds.
    pub longest_ms: f32,
    pub level: f32,
}

impl Default for ReleaseTransient {
    fn default() -> Self {
        Self {
            enabled: true,
            shortest_ms: 40.0,
            longest_ms: 250.0,
            level: 0.05,
        }
    }
}

/// Pitch settle-in, vibrato and release droop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchDrift {
    pub enabled: bool,
    /// Initial offset at the hammer strike, cents (positive = sharp).
    pub settle_cents: f32,
    /// Time constant of the settle-in, seconds.
    pub settle_secs: f32,
    pub vibrato_rate_hz: f32,
    pub vibrato_depth_cents: f32,
    /// Time for the vibrato to fade in after the strike, seconds.
    pub vibrato_onset_secs: f32,
    /// Total downward drift after release, cents.
    pub release_drift_cents: f32,
    /// Time constant of the release drift, seconds.
    pub release_drift_secs: f32,
    /// Interval between pitch updates, milliseconds.
    pub update_interval_ms: f32,
}

impl Default for PitchDrift {
    fn default() -> Self {
        Self {
            enabled: false,
            settle_cents: 3.0,
            settle_secs: 0.25,
            vibrato_rate_hz: 5.0,
            vibrato_depth_cents: 1.5,
            vibrato_onset_secs: 0.6,
            release_drift_cents: 4.0,
            release_drift_secs: 0.5,
            update_interval_ms: 16.0,
        }
    }
}
