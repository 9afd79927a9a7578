pub mod automation;
pub mod backend;
pub mod filter;
mod lifecycle;
pub mod osc_backend;
pub mod output;
pub mod pedal;
pub mod registry;
pub mod visuals;

use std::time::{Duration, Instant};

use ivory_types::{GlobalSettings, PedalState, MAX_SETTING_SECS};

use crate::formulas::{Formulas, StandardFormulas};
use automation::AutomationScheduler;
use filter::FilterAggregator;
use pedal::PedalCoordinator;
use registry::{NoteRegistry, NoteState};

pub use output::OutputAdapter;

/// Convert a seconds value from settings into a `Duration`. Negative and
/// NaN values become zero, anything longer is capped at [`MAX_SETTING_SECS`].
pub(crate) fn secs(value: f32) -> Duration {
    let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, MAX_SETTING_SECS) };
    Duration::from_secs_f32(value)
}

/// Single-threaded note lifecycle engine.
///
/// Every entry point runs to completion before the next one starts. The host
/// passes a settings snapshot and the current time to each call; the engine
/// never reads a clock itself.
pub struct PianoEngine {
    registry: NoteRegistry,
    scheduler: AutomationScheduler,
    pedal: PedalCoordinator,
    filter: FilterAggregator,
    output: OutputAdapter,
    formulas: Box<dyn Formulas>,
}

impl PianoEngine {
    pub fn new(output: OutputAdapter) -> Self {
        Self::with_formulas(output, Box::new(StandardFormulas))
    }

    pub fn with_formulas(output: OutputAdapter, formulas: Box<dyn Formulas>) -> Self {
        Self {
            registry: NoteRegistry::new(),
            scheduler: AutomationScheduler::new(),
            pedal: PedalCoordinator::new(),
            filter: FilterAggregator::new(),
            output,
            formulas,
        }
    }

    /// Host frame callback: drives the dynamic filter on its throttled cadence.
    ///
    /// Returns the cutoff sent this frame, if the aggregator ran.
    pub fn on_frame(&mut self, settings: &GlobalSettings, now: Instant) -> Option<f32> {
        self.filter.on_frame(
            now,
            &self.registry,
            &settings.dynamic_filter,
            self.formulas.as_ref(),
            &self.output,
        )
    }

    /// Release every note, voice and key, and cancel every automation.
    ///
    /// Also silences voices the registry does not know about.
    pub fn panic(&mut self) {
        let released = self.registry.finalize_all(&mut self.scheduler, &self.output);
        let orphans = self.scheduler.clear();
        if orphans > 0 {
            log::warn!(
                target: "audio::automation",
                "panic dropped {} automations with no owning note",
                orphans
            );
        }
        self.output.release_everything();
        log::info!(target: "audio::registry", "panic: released {} notes", released);
    }

    pub fn active_notes(&self) -> Vec<&NoteState> {
        self.registry.snapshot_active()
    }

    pub fn note(&self, midi_note: u8) -> Option<&NoteState> {
        self.registry.get(midi_note)
    }

    pub fn pedal_state(&self) -> PedalState {
        self.pedal.state()
    }

    pub fn pending_automations(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn pending_automations_for(&self, midi_note: u8) -> usize {
        self.scheduler.pending_for(midi_note)
    }

    pub fn last_filter_cutoff(&self) -> Option<f32> {
        self.filter.last_target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secs_rejects_bad_values() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f32::NAN), Duration::ZERO);
        assert_eq!(secs(0.25), Duration::from_millis(250));
    }

    #[test]
    fn secs_caps_huge_values() {
        let cap = Duration::from_secs_f32(MAX_SETTING_SECS);
        assert_eq!(secs(1e19), cap);
        assert_eq!(secs(f32::INFINITY), cap);
    }

    #[test]
    fn fresh_engine_is_idle() {
        let engine = PianoEngine::new(OutputAdapter::null());
        assert!(engine.active_notes().is_empty());
        assert_eq!(engine.pedal_state(), PedalState::Up);
        assert_eq!(engine.pending_automations(), 0);
        assert_eq!(engine.last_filter_cutoff(), None);
    }
}
