//! The authoritative map of sounding notes, one [`NoteState`] per MIDI pitch.
//!
//! Every mutation of note state goes through this type so the lifecycle
//! invariants are enforced in one place:
//!
//! - at most one entry per pitch; `begin_note` retires any previous instance
//!   before inserting the new one
//! - `physically_held` and `sustained_by_pedal` are never both true
//! - `finalize` is the only path that removes an entry, and it cancels every
//!   automation the note still owns
//!
//! Operations on an absent pitch are no-ops.

use std::collections::BTreeMap;
use std::time::Instant;

use ivory_types::{AutomationKind, NoteParameters, PedalState, VoiceId};

use super::automation::{AutomationHandle, AutomationScheduler};
use super::output::OutputAdapter;

#[derive(Debug, Clone)]
pub struct NoteState {
    pub midi_note: u8,
    pub voice_id: VoiceId,
    pub velocity: u8,
    pub frequency: f32,
    pub params: NoteParameters,
    pub attack_timestamp: Instant,
    /// Set on the first physical release and never reset.
    pub release_timestamp: Option<Instant>,
    pub physically_held: bool,
    pub sustained_by_pedal: bool,
    active_automations: Vec<AutomationHandle>,
    voice_released: bool,
}

impl NoteState {
    pub fn active_automations(&self) -> &[AutomationHandle] {
        &self.active_automations
    }

    pub fn automation(&self, kind: AutomationKind) -> Option<AutomationHandle> {
        self.active_automations.iter().copied().find(|h| h.kind() == kind)
    }

    /// The voice has been sent into its envelope release.
    pub fn voice_released(&self) -> bool {
        self.voice_released
    }
}

#[derive(Debug, Default)]
pub struct NoteRegistry {
    notes: BTreeMap<u8, NoteState>,
    next_voice: u32,
}

impl NoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly struck note, retiring any instance already sounding at this pitch.
    ///
    /// Does not attack the new voice; the caller wires output and automations
    /// onto the returned state.
    pub fn begin_note(
        &mut self,
        midi_note: u8,
        velocity: u8,
        frequency: f32,
        params: NoteParameters,
        now: Instant,
        scheduler: &mut AutomationScheduler,
        output: &OutputAdapter,
    ) -> &NoteState {
        if self.finalize(midi_note, scheduler, output) {
            log::debug!(target: "audio::registry", "retrigger note {}", midi_note);
        }

        let voice_id = VoiceId::new(self.next_voice);
        self.next_voice = self.next_voice.wrapping_add(1);

        let state = NoteState {
            midi_note,
            voice_id,
            velocity,
            frequency,
            params,
            attack_timestamp: now,
            release_timestamp: None,
            physically_held: true,
            sustained_by_pedal: false,
            active_automations: Vec::new(),
            voice_released: false,
        };
        self.notes.entry(midi_note).or_insert(state)
    }

    /// Returns true only on a held to released transition.
    pub fn mark_physically_released(&mut self, midi_note: u8, now: Instant) -> bool {
        let Some(note) = self.notes.get_mut(&midi_note) else {
            return false;
        };
        if !note.physically_held {
            return false;
        }
        note.physically_held = false;
        note.release_timestamp.get_or_insert(now);
        true
    }

    /// Hand a physically released note to the pedal. No-op unless the pedal is down.
    pub fn mark_sustained(&mut self, midi_note: u8, pedal: PedalState) -> bool {
        if pedal != PedalState::Down {
            return false;
        }
        match self.notes.get_mut(&midi_note) {
            Some(note) if !note.physically_held => {
                note.sustained_by_pedal = true;
                true
            }
            _ => false,
        }
    }

    pub fn mark_voice_released(&mut self, midi_note: u8) {
        if let Some(note) = self.notes.get_mut(&midi_note) {
            note.voice_released = true;
        }
    }

    pub fn attach_automation(&mut self, handle: AutomationHandle) {
        if let Some(note) = self.notes.get_mut(&handle.midi_note()) {
            note.active_automations.push(handle);
        }
    }

    /// Remove a handle that completed on its own. Returns false if the note no longer owns it.
    pub fn detach_automation(&mut self, handle: AutomationHandle) -> bool {
        let Some(note) = self.notes.get_mut(&handle.midi_note()) else {
            return false;
        };
        let before = note.active_automations.len();
        note.active_automations.retain(|h| *h != handle);
        note.active_automations.len() != before
    }

    /// Cancel one running automation of `kind` early, stopping its sound if it has one.
    pub fn cancel_automation(
        &mut self,
        midi_note: u8,
        kind: AutomationKind,
        scheduler: &mut AutomationScheduler,
        output: &OutputAdapter,
    ) -> bool {
        let Some(note) = self.notes.get_mut(&midi_note) else {
            return false;
        };
        let Some(pos) = note.active_automations.iter().position(|h| h.kind() == kind) else {
            return false;
        };
        let handle = note.active_automations.remove(pos);
        scheduler.cancel(handle);
        if let Some(transient) = kind.transient() {
            output.stop_transient(note.voice_id, transient);
        }
        true
    }

    /// Cancel all automations, release the voice and key, and remove the entry.
    ///
    /// Returns false (and does nothing) if the pitch has no entry.
    pub fn finalize(
        &mut self,
        midi_note: u8,
        scheduler: &mut AutomationScheduler,
        output: &OutputAdapter,
    ) -> bool {
        let Some(note) = self.notes.remove(&midi_note) else {
            return false;
        };
        for handle in &note.active_automations {
            scheduler.cancel(*handle);
            if let Some(transient) = handle.kind().transient() {
                output.stop_transient(note.voice_id, transient);
            }
        }
        if !note.voice_released {
            output.release_voice(note.voice_id);
        }
        if note.physically_held {
            output.set_key_released(midi_note);
        }
        log::trace!(target: "audio::registry", "finalize note {} ({})", midi_note, note.voice_id);
        true
    }

    /// Finalize every note. Returns how many were removed.
    pub fn finalize_all(&mut self, scheduler: &mut AutomationScheduler, output: &OutputAdapter) -> usize {
        let pitches: Vec<u8> = self.notes.keys().copied().collect();
        pitches
            .into_iter()
            .filter(|&n| self.finalize(n, scheduler, output))
            .count()
    }

    pub fn snapshot_active(&self) -> Vec<&NoteState> {
        self.notes.values().collect()
    }

    /// Pitches currently held only by the pedal, as an owned snapshot.
    pub fn sustained_notes(&self) -> Vec<u8> {
        self.notes
            .values()
            .filter(|n| n.sustained_by_pedal)
            .map(|n| n.midi_note)
            .collect()
    }

    pub fn get(&self, midi_note: u8) -> Option<&NoteState> {
        self.notes.get(&midi_note)
    }

    pub fn contains(&self, midi_note: u8) -> bool {
        self.notes.contains_key(&midi_note)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::automation::AutomationSpec;
    use crate::engine::backend::{NullBackend, SharedTestBackend, TestBackend, TestOp};
    use crate::engine::visuals::KeyboardState;
    use ivory_types::Timbre;
    use std::sync::Arc;
    use std::time::Duration;

    fn params() -> NoteParameters {
        NoteParameters {
            attack: 0.005,
            decay: 1.2,
            sustain: 0.25,
            release: 0.4,
            amplitude: 0.6,
            timbre: Timbre::Medium,
            initial_filter_cutoff: 3000.0,
        }
    }

    struct Fixture {
        registry: NoteRegistry,
        scheduler: AutomationScheduler,
        output: OutputAdapter,
        backend: Arc<TestBackend>,
        keys: Arc<KeyboardState>,
        now: Instant,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(TestBackend::new());
        let keys = Arc::new(KeyboardState::new());
        let output = OutputAdapter::new(
            Box::new(SharedTestBackend(Arc::clone(&backend))),
            Box::new(Arc::clone(&keys)),
        );
        Fixture {
            registry: NoteRegistry::new(),
            scheduler: AutomationScheduler::new(),
            output,
            backend,
            keys,
            now: Instant::now(),
        }
    }

    impl Fixture {
        fn begin(&mut self, note: u8) -> VoiceId {
            let voice = self
                .registry
                .begin_note(note, 100, 261.6, params(), self.now, &mut self.scheduler, &self.output)
                .voice_id;
            self.output.set_key_pressed(note);
            voice
        }
    }

    #[test]
    fn begin_note_starts_held() {
        let mut f = fixture();
        f.begin(60);
        let n = f.registry.get(60).unwrap();
        assert!(n.physically_held);
        assert!(!n.sustained_by_pedal);
        assert!(n.release_timestamp.is_none());
        assert_eq!(f.registry.len(), 1);
    }

    #[test]
    fn retrigger_retires_previous_instance() {
        let mut f = fixture();
        let first = f.begin(60);
        let handle = f.scheduler.start(
            60,
            AutomationSpec::periodic(AutomationKind::PitchDrift, Duration::from_millis(16)),
            f.now,
        );
        f.registry.attach_automation(handle);

        let second = f.begin(60);
        assert_ne!(first, second);
        assert_eq!(f.registry.len(), 1);
        assert!(!f.scheduler.is_active(handle));
        assert_eq!(f.backend.releases(), vec![first]);
        assert!(f.registry.get(60).unwrap().active_automations().is_empty());
    }

    #[test]
    fn release_timestamp_set_once() {
        let mut f = fixture();
        f.begin(60);
        let t1 = f.now + Duration::from_millis(100);
        assert!(f.registry.mark_physically_released(60, t1));
        assert!(!f.registry.mark_physically_released(60, t1 + Duration::from_secs(1)));
        assert_eq!(f.registry.get(60).unwrap().release_timestamp, Some(t1));
    }

    #[test]
    fn sustain_requires_pedal_and_release() {
        let mut f = fixture();
        f.begin(60);
        assert!(!f.registry.mark_sustained(60, PedalState::Down));
        f.registry.mark_physically_released(60, f.now);
        assert!(!f.registry.mark_sustained(60, PedalState::Up));
        assert!(f.registry.mark_sustained(60, PedalState::Down));
        let n = f.registry.get(60).unwrap();
        assert!(n.sustained_by_pedal && !n.physically_held);
        assert_eq!(f.registry.sustained_notes(), vec![60]);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut f = fixture();
        f.begin(60);
        assert!(f.registry.finalize(60, &mut f.scheduler, &f.output));
        let ops = f.backend.operations();
        assert!(!f.registry.finalize(60, &mut f.scheduler, &f.output));
        assert_eq!(f.backend.operations(), ops);
        assert!(!f.keys.is_pressed(60));
    }

    #[test]
    fn finalize_releases_key_only_when_held() {
        let mut f = fixture();
        f.begin(60);
        f.begin(64);
        f.registry.mark_physically_released(64, f.now);

        f.registry.finalize(60, &mut f.scheduler, &f.output);
        assert!(!f.keys.is_pressed(60));

        // Key 64 belongs to whoever drives the visuals after note-off
        f.registry.finalize(64, &mut f.scheduler, &f.output);
        assert!(f.keys.is_pressed(64));
    }

    #[test]
    fn finalize_stops_transients() {
        let mut f = fixture();
        let voice = f.begin(60);
        let h = f.scheduler.start(
            60,
            AutomationSpec::one_shot(AutomationKind::ReleaseTransient, Duration::from_millis(80)),
            f.now,
        );
        f.registry.attach_automation(h);
        f.registry.finalize(60, &mut f.scheduler, &f.output);
        assert_eq!(f.scheduler.pending(), 0);
        assert_eq!(
            f.backend.count(|op| matches!(op, TestOp::StopTransient { voice: v, .. } if *v == voice)),
            1
        );
    }

    #[test]
    fn released_voice_is_not_released_again() {
        let mut f = fixture();
        f.begin(60);
        f.registry.mark_voice_released(60);
        f.registry.finalize(60, &mut f.scheduler, &f.output);
        assert!(f.backend.releases().is_empty());
    }

    #[test]
    fn absent_notes_are_no_ops() {
        let mut registry = NoteRegistry::new();
        let mut scheduler = AutomationScheduler::new();
        let output = OutputAdapter::new(Box::new(NullBackend), Box::new(crate::engine::visuals::NullVisuals));
        assert!(!registry.mark_physically_released(10, Instant::now()));
        assert!(!registry.mark_sustained(10, PedalState::Down));
        assert!(!registry.cancel_automation(10, AutomationKind::AttackNoise, &mut scheduler, &output));
        assert!(!registry.finalize(10, &mut scheduler, &output));
        assert!(registry.is_empty());
    }
}
