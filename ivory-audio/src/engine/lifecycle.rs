use std::time::Instant;

use ivory_types::{
    clamp_midi, midi_to_frequency, AutomationKind, GlobalSettings, PedalState, TransientKind,
    SUSTAIN_CONTROLLER,
};

use super::automation::{AutomationHandle, AutomationSpec};
use super::pedal::PedalTransition;
use super::{secs, PianoEngine};
use crate::resolver::resolve_note_parameters;

impl PianoEngine {
    /// Strike a key. Velocity 0 is a note-off.
    pub fn note_on(&mut self, midi_note: u8, velocity: u8, settings: &GlobalSettings, now: Instant) {
        let midi_note = clamp_midi(midi_note);
        let velocity = clamp_midi(velocity);
        if velocity == 0 {
            self.note_off(midi_note, settings, now);
            return;
        }

        let frequency = midi_to_frequency(midi_note, settings.tuning_a4);
        let params =
            resolve_note_parameters(velocity, frequency, midi_note, settings, self.formulas.as_ref());

        // Retires any sounding instance of this pitch before the new voice is attacked.
        let voice = self
            .registry
            .begin_note(midi_note, velocity, frequency, params, now, &mut self.scheduler, &self.output)
            .voice_id;
        self.output.attack_voice(voice, midi_note, frequency, &params);
        self.output.set_key_pressed(midi_note);

        if settings.attack_noise.enabled {
            let duration = secs(settings.attack_noise.duration_ms / 1000.0);
            self.output.start_transient(
                voice,
                TransientKind::AttackNoise,
                settings.attack_noise.level * params.amplitude,
                duration,
            );
            self.start_automation(
                midi_note,
                AutomationSpec::one_shot(AutomationKind::AttackNoise, duration),
                now,
            );
        }

        if settings.pitch_drift.enabled {
            let interval = secs(settings.pitch_drift.update_interval_ms / 1000.0);
            self.output.set_pitch_offset(
                voice,
                self.formulas.pitch_offset_cents(0.0, None, &settings.pitch_drift),
            );
            self.start_automation(
                midi_note,
                AutomationSpec::periodic(AutomationKind::PitchDrift, interval),
                now,
            );
        }

        log::debug!(
            target: "audio::registry",
            "note on {} vel {} -> {} ({})",
            midi_note,
            velocity,
            voice,
            params.timbre.name()
        );
    }

    /// Let go of a key. With the pedal down the note keeps sounding until its
    /// sustain decay expires or the pedal comes up.
    pub fn note_off(&mut self, midi_note: u8, settings: &GlobalSettings, now: Instant) {
        let midi_note = clamp_midi(midi_note);
        if !self.registry.mark_physically_released(midi_note, now) {
            log::trace!(target: "audio::registry", "note off {} ignored: not held", midi_note);
            return;
        }
        self.output.set_key_released(midi_note);
        self.registry.cancel_automation(
            midi_note,
            AutomationKind::AttackNoise,
            &mut self.scheduler,
            &self.output,
        );

        let Some(note) = self.registry.get(midi_note) else {
            return;
        };
        let (voice, frequency) = (note.voice_id, note.frequency);

        let transient = settings.release_transient.enabled;
        if transient {
            let duration = secs(
                self.formulas
                    .release_transient_duration(frequency, &settings.release_transient),
            );
            self.output.start_transient(
                voice,
                TransientKind::Release,
                settings.release_transient.level,
                duration,
            );
            self.start_automation(
                midi_note,
                AutomationSpec::one_shot(AutomationKind::ReleaseTransient, duration),
                now,
            );
        }

        if self.pedal.is_down() {
            self.registry.mark_sustained(midi_note, PedalState::Down);
            let duration = secs(self.formulas.sustain_duration(frequency, &settings.sustain_pedal));
            self.start_automation(
                midi_note,
                AutomationSpec::one_shot(AutomationKind::SustainDecay, duration),
                now,
            );
            log::debug!(
                target: "audio::pedal",
                "note {} sustained for {:.1}s",
                midi_note,
                duration.as_secs_f32()
            );
        } else {
            self.output.release_voice(voice);
            self.registry.mark_voice_released(midi_note);
            if !transient {
                self.registry.finalize(midi_note, &mut self.scheduler, &self.output);
            }
        }
    }

    /// Only the sustain controller is handled; anything else is ignored.
    /// Returns how many pedal-sustained notes a pedal release let go.
    pub fn control_change(&mut self, controller: u8, value: u8, settings: &GlobalSettings) -> usize {
        if clamp_midi(controller) != SUSTAIN_CONTROLLER {
            log::trace!(target: "audio::pedal", "ignoring controller {}", controller);
            return 0;
        }
        let transition = self
            .pedal
            .on_control_change(value, settings.sustain_pedal.threshold);
        if transition != PedalTransition::Released {
            return 0;
        }
        let released = self
            .pedal
            .release_sustained(&mut self.registry, &mut self.scheduler, &self.output);
        if released > 0 {
            log::debug!(target: "audio::pedal", "released {} sustained notes", released);
        }
        released
    }

    /// Run every automation due at `now`. Returns how many firings were applied.
    pub fn advance_automations(&mut self, settings: &GlobalSettings, now: Instant) -> usize {
        let mut fired = 0;
        while let Some(firing) = self.scheduler.next_due(now) {
            let handle = firing.handle;
            let note = handle.midi_note();
            let owned = self
                .registry
                .get(note)
                .is_some_and(|n| n.active_automations().contains(&handle));
            if !owned {
                log::warn!(
                    target: "audio::automation",
                    "{:?} fired for note {} that no longer owns it",
                    handle.kind(),
                    note
                );
                continue;
            }
            fired += 1;
            if firing.completed {
                self.registry.detach_automation(handle);
            }
            self.apply_firing(handle, firing.completed, settings, now);
        }
        fired
    }

    fn apply_firing(
        &mut self,
        handle: AutomationHandle,
        completed: bool,
        settings: &GlobalSettings,
        now: Instant,
    ) {
        let note = handle.midi_note();
        let Some(state) = self.registry.get(note) else {
            return;
        };
        let voice = state.voice_id;

        match handle.kind() {
            AutomationKind::PitchDrift => {
                let since_attack = now
                    .saturating_duration_since(state.attack_timestamp)
                    .as_secs_f32();
                let since_release = state
                    .release_timestamp
                    .map(|t| now.saturating_duration_since(t).as_secs_f32());
                let cents =
                    self.formulas
                        .pitch_offset_cents(since_attack, since_release, &settings.pitch_drift);
                self.output.set_pitch_offset(voice, cents);
            }
            AutomationKind::AttackNoise => {
                if completed {
                    self.output.stop_transient(voice, TransientKind::AttackNoise);
                }
            }
            AutomationKind::ReleaseTransient => {
                if completed {
                    self.output.stop_transient(voice, TransientKind::Release);
                    if !state.physically_held && !state.sustained_by_pedal {
                        self.registry.finalize(note, &mut self.scheduler, &self.output);
                    }
                }
            }
            AutomationKind::SustainDecay => {
                if completed {
                    log::debug!(target: "audio::pedal", "sustain expired for note {}", note);
                    self.registry.finalize(note, &mut self.scheduler, &self.output);
                }
            }
        }
    }

    fn start_automation(&mut self, midi_note: u8, spec: AutomationSpec, now: Instant) {
        let handle = self.scheduler.start(midi_note, spec, now);
        self.registry.attach_automation(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::{SharedTestBackend, TestBackend, TestOp};
    use crate::engine::visuals::KeyboardState;
    use crate::engine::OutputAdapter;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine() -> (PianoEngine, Arc<TestBackend>, Arc<KeyboardState>) {
        let backend = Arc::new(TestBackend::new());
        let keys = Arc::new(KeyboardState::new());
        let output = OutputAdapter::new(
            Box::new(SharedTestBackend(Arc::clone(&backend))),
            Box::new(Arc::clone(&keys)),
        );
        (PianoEngine::new(output), backend, keys)
    }

    #[test]
    fn zero_velocity_is_note_off() {
        let (mut engine, _, keys) = engine();
        let settings = GlobalSettings::default();
        let t0 = Instant::now();
        engine.note_on(60, 100, &settings, t0);
        engine.note_on(60, 0, &settings, t0);
        assert!(!keys.is_pressed(60));
        assert!(!engine.note(60).unwrap().physically_held);
    }

    #[test]
    fn attack_noise_is_cut_short_by_release() {
        let (mut engine, backend, _) = engine();
        let mut settings = GlobalSettings::default();
        settings.attack_noise.enabled = true;
        settings.release_transient.enabled = false;
        let t0 = Instant::now();
        engine.note_on(60, 100, &settings, t0);
        assert_eq!(engine.pending_automations(), 1);

        engine.note_off(60, &settings, t0 + Duration::from_millis(5));
        assert_eq!(engine.pending_automations(), 0);
        assert_eq!(
            backend.count(|op| matches!(
                op,
                TestOp::StopTransient { kind: TransientKind::AttackNoise, .. }
            )),
            1
        );
    }

    #[test]
    fn pitch_drift_updates_until_finalized() {
        let (mut engine, backend, _) = engine();
        let mut settings = GlobalSettings::default();
        settings.pitch_drift.enabled = true;
        settings.release_transient.enabled = false;
        let t0 = Instant::now();
        engine.note_on(60, 100, &settings, t0);

        let fired = engine.advance_automations(&settings, t0 + Duration::from_millis(100));
        assert!(fired >= 1);
        let offsets = backend.count(|op| matches!(op, TestOp::PitchOffset { .. }));
        assert!(offsets >= 2);

        engine.note_off(60, &settings, t0 + Duration::from_millis(120));
        assert!(engine.note(60).is_none());
        assert_eq!(engine.advance_automations(&settings, t0 + Duration::from_secs(5)), 0);
    }

    #[test]
    fn release_transient_finalizes_after_duration() {
        let (mut engine, backend, _) = engine();
        let settings = GlobalSettings::default();
        let t0 = Instant::now();
        engine.note_on(60, 100, &settings, t0);
        engine.note_off(60, &settings, t0 + Duration::from_millis(200));

        let note = engine.note(60).unwrap();
        assert!(note.voice_released());
        assert_eq!(backend.releases().len(), 1);

        engine.advance_automations(&settings, t0 + Duration::from_secs(2));
        assert!(engine.note(60).is_none());
        assert_eq!(backend.releases().len(), 1);
    }

    #[test]
    fn sustain_decay_expiry_finalizes() {
        let (mut engine, backend, _) = engine();
        let mut settings = GlobalSettings::default();
        settings.release_transient.enabled = false;
        let t0 = Instant::now();
        engine.control_change(SUSTAIN_CONTROLLER, 127, &settings);
        engine.note_on(108, 100, &settings, t0);
        engine.note_off(108, &settings, t0);
        assert!(engine.note(108).unwrap().sustained_by_pedal);
        assert!(backend.releases().is_empty());

        engine.advance_automations(&settings, t0 + Duration::from_secs(1));
        assert!(engine.note(108).is_some());
        let expiry = t0 + Duration::from_secs_f32(settings.sustain_pedal.shortest_secs + 0.1);
        engine.advance_automations(&settings, expiry);
        assert!(engine.note(108).is_none());
        assert_eq!(backend.releases().len(), 1);
    }

    #[test]
    fn other_controllers_are_ignored() {
        let (mut engine, _, _) = engine();
        let settings = GlobalSettings::default();
        assert_eq!(engine.control_change(1, 127, &settings), 0);
        assert_eq!(engine.pedal_state(), PedalState::Up);
        engine.control_change(SUSTAIN_CONTROLLER, 100, &settings);
        assert_eq!(engine.pedal_state(), PedalState::Down);
    }

    #[test]
    fn pedal_release_reports_notes_let_go() {
        let (mut engine, backend, _) = engine();
        let settings = GlobalSettings::default();
        let t0 = Instant::now();
        assert_eq!(engine.control_change(SUSTAIN_CONTROLLER, 127, &settings), 0);
        engine.note_on(60, 100, &settings, t0);
        engine.note_on(64, 100, &settings, t0);
        engine.note_on(67, 100, &settings, t0);
        engine.note_off(60, &settings, t0);
        engine.note_off(64, &settings, t0);

        assert_eq!(engine.control_change(SUSTAIN_CONTROLLER, 0, &settings), 2);
        assert_eq!(backend.releases().len(), 2);
        assert!(engine.note(67).unwrap().physically_held);
        assert_eq!(engine.control_change(SUSTAIN_CONTROLLER, 0, &settings), 0);
    }
}
