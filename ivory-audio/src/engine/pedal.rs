use ivory_types::{clamp_midi, AutomationKind, PedalState};

use super::automation::AutomationScheduler;
use super::output::OutputAdapter;
use super::registry::NoteRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PedalTransition {
    Pressed,
    Released,
    Unchanged,
}

/// Damper pedal state machine, initially up.
#[derive(Debug, Default)]
pub struct PedalCoordinator {
    state: PedalState,
}

impl PedalCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PedalState {
        self.state
    }

    pub fn is_down(&self) -> bool {
        self.state == PedalState::Down
    }

    /// Apply a sustain controller value. Values at or above `threshold` mean down.
    pub fn on_control_change(&mut self, value: u8, threshold: u8) -> PedalTransition {
        let next = if clamp_midi(value) >= threshold {
            PedalState::Down
        } else {
            PedalState::Up
        };
        let transition = match (self.state, next) {
            (PedalState::Up, PedalState::Down) => PedalTransition::Pressed,
            (PedalState::Down, PedalState::Up) => PedalTransition::Released,
            _ => PedalTransition::Unchanged,
        };
        self.state = next;
        if transition != PedalTransition::Unchanged {
            log::debug!(target: "audio::pedal", "pedal {:?} (value {})", next, value);
        }
        transition
    }

    /// Finalize every pedal-sustained note and return how many there were.
    /// Physically held notes are untouched.
    ///
    /// Works over a snapshot taken before the first finalize.
    pub fn release_sustained(
        &self,
        registry: &mut NoteRegistry,
        scheduler: &mut AutomationScheduler,
        output: &OutputAdapter,
    ) -> usize {
        let sustained = registry.sustained_notes();
        for &note in &sustained {
            registry.cancel_automation(note, AutomationKind::SustainDecay, scheduler, output);
            registry.finalize(note, scheduler, output);
        }
        sustained.len()
    }
}
