//! Shared post-filter that follows the brightest sounding note.
//!
//! The synth server has one filter after the voice group, so per-note damping
//! is approximated by ramping that filter to the highest of all per-note
//! brightness targets.

use std::time::Instant;

use ivory_types::DynamicFilter;

use super::output::OutputAdapter;
use super::registry::{NoteRegistry, NoteState};
use crate::formulas::Formulas;

/// Current brightness demand of one note: exponential decay from its initial
/// cutoff toward a pitch-dependent floor.
pub fn note_brightness(
    note: &NoteState,
    now: Instant,
    params: &DynamicFilter,
    formulas: &dyn Formulas,
) -> f32 {
    let floor = formulas.filter_floor(note.frequency, params);
    let start = note.params.initial_filter_cutoff.max(floor);
    let tau = formulas.filter_decay_time(note.frequency, params);
    let elapsed = now.saturating_duration_since(note.attack_timestamp).as_secs_f32();
    params.clamp_cutoff(floor + (start - floor) * (-elapsed / tau).exp())
}

#[derive(Debug, Default)]
pub struct FilterAggregator {
    frame: u64,
    last_target: Option<f32>,
}

impl FilterAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent cutoff sent to the filter.
    pub fn last_target(&self) -> Option<f32> {
        self.last_target
    }

    /// Called once per host frame; does work only every `update_every_frames` frames.
    pub fn on_frame(
        &mut self,
        now: Instant,
        registry: &NoteRegistry,
        params: &DynamicFilter,
        formulas: &dyn Formulas,
        output: &OutputAdapter,
    ) -> Option<f32> {
        let every = u64::from(params.update_every_frames.max(1));
        let frame = self.frame;
        self.frame = self.frame.wrapping_add(1);
        if frame % every != 0 {
            return None;
        }
        Some(self.tick(now, registry, params, formulas, output))
    }

    /// Compute and send one filter target immediately.
    pub fn tick(
        &mut self,
        now: Instant,
        registry: &NoteRegistry,
        params: &DynamicFilter,
        formulas: &dyn Formulas,
        output: &OutputAdapter,
    ) -> f32 {
        let demand = if params.enabled {
            registry
                .snapshot_active()
                .into_iter()
                .map(|n| note_brightness(n, now, params, formulas))
                .fold(None, |acc: Option<f32>, b| Some(acc.map_or(b, |a| a.max(b))))
        } else {
            None
        };

        let (target, time_constant) = match demand {
            Some(target) => (target, params.ramp_time_constant),
            None => (params.open_cutoff_hz, params.open_time_constant),
        };
        log::trace!(target: "audio::filter", "cutoff -> {:.0}Hz", target);
        output.ramp_filter(target, time_constant);
        self.last_target = Some(target);
        target
    }
}
