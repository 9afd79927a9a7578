#![allow(dead_code)]
//! Test harness for ivory-audio integration tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ivory_audio::engine::backend::{SharedTestBackend, TestBackend};
use ivory_audio::engine::visuals::KeyboardState;
use ivory_audio::{OutputAdapter, PianoEngine};
use ivory_types::{GlobalSettings, SUSTAIN_CONTROLLER};

/// An engine wired to a recording backend and a key bitmap, with a manual clock.
pub struct Rig {
    pub engine: PianoEngine,
    pub backend: Arc<TestBackend>,
    pub keys: Arc<KeyboardState>,
    pub settings: GlobalSettings,
    pub start: Instant,
    pub now: Instant,
}

impl Rig {
    pub fn new(settings: GlobalSettings) -> Self {
        let backend = Arc::new(TestBackend::new());
        let keys = Arc::new(KeyboardState::new());
        let output = OutputAdapter::new(
            Box::new(SharedTestBackend(Arc::clone(&backend))),
            Box::new(Arc::clone(&keys)),
        );
        let start = Instant::now();
        Self {
            engine: PianoEngine::new(output),
            backend,
            keys,
            settings,
            start,
            now: start,
        }
    }

    /// Default settings with every optional feature switched on.
    pub fn all_features() -> Self {
        let mut settings = GlobalSettings::default();
        settings.velocity_attack.enabled = true;
        settings.two_stage_decay.enabled = true;
        settings.attack_noise.enabled = true;
        settings.release_transient.enabled = true;
        settings.pitch_drift.enabled = true;
        Self::new(settings)
    }

    pub fn note_on(&mut self, note: u8, velocity: u8) {
        self.engine.note_on(note, velocity, &self.settings, self.now);
    }

    pub fn note_off(&mut self, note: u8) {
        self.engine.note_off(note, &self.settings, self.now);
    }

    pub fn pedal_down(&mut self) {
        self.engine.control_change(SUSTAIN_CONTROLLER, 127, &self.settings);
    }

    pub fn pedal_up(&mut self) {
        self.engine.control_change(SUSTAIN_CONTROLLER, 0, &self.settings);
    }

    /// Move the clock forward, firing automations in 5 ms steps.
    pub fn advance(&mut self, by: Duration) {
        let end = self.now + by;
        let step = Duration::from_millis(5);
        while self.now < end {
            self.now = (self.now + step).min(end);
            self.engine.advance_automations(&self.settings, self.now);
        }
    }

    /// Assert the lifecycle invariants that must hold between any two events.
    pub fn check_invariants(&self) {
        let notes = self.engine.active_notes();
        let mut seen = std::collections::HashSet::new();
        for n in &notes {
            assert!(seen.insert(n.midi_note), "duplicate entry for note {}", n.midi_note);
            assert!(
                !(n.physically_held && n.sustained_by_pedal),
                "note {} both held and sustained",
                n.midi_note
            );
            if n.physically_held {
                assert!(self.keys.is_pressed(n.midi_note), "held note {} not shown", n.midi_note);
            }
        }
        let owned: usize = notes.iter().map(|n| n.active_automations().len()).sum();
        assert_eq!(
            owned,
            self.engine.pending_automations(),
            "scheduler and registry disagree on live automations"
        );
    }
}
