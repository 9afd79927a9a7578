//! Host frame loop.
//!
//! Each frame: poll the terminal, turn piano keys into inputs on the bus,
//! drain the bus onto the engine, fire due automations, run the per-frame
//! filter update, then render.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ivory_audio::engine::backend::{NullBackend, VoiceBackend};
use ivory_audio::engine::osc_backend::OscBackend;
use ivory_audio::engine::visuals::KeyboardState;
use ivory_audio::{OutputAdapter, PianoEngine};
use ivory_core::{dispatch_all, Config, InputBus, MidiInputManager, PianoInput};
use ivory_types::{GlobalSettings, KeyboardLayout, PedalState, SUSTAIN_CONTROLLER};

use crate::ui::{self, Key, KeyInput, KeyKind, PianoKeyboard, StatusView, TerminalHost};

/// Command-line overrides applied on top of the loaded config.
#[derive(Debug, Default)]
pub struct Overrides {
    pub osc_server: Option<String>,
    pub midi_port: Option<String>,
}

pub struct Runtime {
    engine: PianoEngine,
    settings: GlobalSettings,
    bus: InputBus,
    keys: Arc<KeyboardState>,
    keyboard: PianoKeyboard,
    midi_input: Option<MidiInputManager>,
    layout: KeyboardLayout,
    velocity: u8,
    frame_period: Duration,
    backend_label: String,
    pedal_latched: bool,
    message: Option<String>,
}

impl Runtime {
    pub fn new(config: &Config, overrides: Overrides) -> Self {
        let mut message = None;

        let osc_server = overrides
            .osc_server
            .or_else(|| config.osc_server().map(str::to_string));
        let (voices, backend_label): (Box<dyn VoiceBackend>, String) = match osc_server {
            Some(addr) => match OscBackend::connect(&addr) {
                Ok(backend) => {
                    log::info!(target: "runtime", "sending voices to {}", addr);
                    (Box::new(backend), format!("osc {}", addr))
                }
                Err(e) => {
                    log::warn!(target: "runtime", "OSC backend unavailable: {}", e);
                    message = Some(format!("OSC {}: {}", addr, e));
                    (Box::new(NullBackend), "null".to_string())
                }
            },
            None => (Box::new(NullBackend), "null".to_string()),
        };

        let bus = InputBus::new();
        let mut midi_input = MidiInputManager::new();
        midi_input.refresh_ports();
        let midi_port = overrides
            .midi_port
            .or_else(|| config.midi_port().map(str::to_string));
        let connected = match midi_port {
            Some(name) => midi_input.connect_by_name(&name, bus.sender()),
            // Auto-connect first available port
            None if !midi_input.list_ports().is_empty() => midi_input.connect(0, bus.sender()),
            None => Ok(()),
        };
        if let Err(e) = connected {
            log::warn!(target: "midi", "{}", e);
            message.get_or_insert(e);
        }

        Self::with_parts(config, voices, backend_label, bus, Some(midi_input), message)
    }

    /// Runtime with the null voice backend and no MIDI input.
    #[cfg(test)]
    fn offline(config: &Config) -> Self {
        Self::with_parts(config, Box::new(NullBackend), "null".to_string(), InputBus::new(), None, None)
    }

    fn with_parts(
        config: &Config,
        voices: Box<dyn VoiceBackend>,
        backend_label: String,
        bus: InputBus,
        midi_input: Option<MidiInputManager>,
        message: Option<String>,
    ) -> Self {
        let keys = Arc::new(KeyboardState::new());
        let engine = PianoEngine::new(OutputAdapter::new(voices, Box::new(keys.clone())));
        Self {
            engine,
            settings: config.settings().clone(),
            bus,
            keys,
            keyboard: PianoKeyboard::new(),
            midi_input,
            layout: config.keyboard_layout(),
            velocity: config.velocity(),
            frame_period: Duration::from_secs(1) / config.frame_rate(),
            backend_label,
            pedal_latched: false,
            message,
        }
    }

    pub fn run(&mut self, term: &mut TerminalHost) -> std::io::Result<()> {
        if term.keyboard_enhancement_enabled() {
            self.keyboard.set_release_timeout(None);
        }
        log::info!(
            target: "runtime",
            "frame loop at {:?} per frame, key releases via {}",
            self.frame_period,
            if term.keyboard_enhancement_enabled() { "events" } else { "timeout" }
        );

        let mut next_frame = Instant::now();
        loop {
            // Skip missed frames rather than bursting to catch up
            next_frame = next_frame.max(Instant::now()) + self.frame_period;
            if self.process_events(term, next_frame)? {
                break;
            }
            self.step(Instant::now());
            term.draw(|f| ui::render(f, &self.status_view()))?;
        }

        self.engine.panic();
        Ok(())
    }

    /// Poll keys until the frame deadline. Returns true if the user quit.
    fn process_events(&mut self, term: &mut TerminalHost, deadline: Instant) -> std::io::Result<bool> {
        loop {
            let timeout = deadline.saturating_duration_since(Instant::now());
            let Some(input) = term.poll_key(timeout)? else {
                return Ok(false);
            };
            if self.handle_key(input, Instant::now()) {
                return Ok(true);
            }
            if timeout.is_zero() {
                return Ok(false);
            }
        }
    }

    /// Returns true on quit.
    fn handle_key(&mut self, input: KeyInput, now: Instant) -> bool {
        let c = match input.key {
            Key::Escape if input.kind == KeyKind::Press => {
                self.bus.push(PianoInput::Panic);
                return false;
            }
            Key::Tab if input.kind == KeyKind::Press => {
                self.keyboard.toggle_layout();
                return false;
            }
            Key::Char(c) => ui::translate_key(c, self.layout),
            _ => return false,
        };

        if input.kind == KeyKind::Release {
            if let Some(pitch) = self.keyboard.key_released(c) {
                self.bus.push(PianoInput::NoteOff { note: pitch });
            }
            return false;
        }

        match c {
            'c' if input.ctrl => return true,
            'q' if input.kind == KeyKind::Press => return true,
            ' ' if input.kind == KeyKind::Press => {
                self.pedal_latched = !self.pedal_latched;
                self.bus.push(PianoInput::ControlChange {
                    controller: SUSTAIN_CONTROLLER,
                    value: if self.pedal_latched { 127 } else { 0 },
                });
            }
            'z' if input.kind == KeyKind::Press => {
                self.keyboard.octave_down();
            }
            'x' if input.kind == KeyKind::Press => {
                self.keyboard.octave_up();
            }
            _ => {
                if let Some(pitch) = self.keyboard.key_to_pitch(c) {
                    if let Some(note) = self.keyboard.key_pressed(c, pitch, now) {
                        self.bus.push(PianoInput::NoteOn {
                            note,
                            velocity: self.velocity,
                        });
                    }
                }
            }
        }
        false
    }

    fn step(&mut self, now: Instant) {
        for (_, pitch) in self.keyboard.check_releases(now) {
            self.bus.push(PianoInput::NoteOff { note: pitch });
        }

        let inputs = self.bus.drain();
        if inputs.contains(&PianoInput::Panic) {
            self.keyboard.release_all();
        }
        dispatch_all(&mut self.engine, inputs, &self.settings, now);
        self.engine.on_frame(&self.settings, now);

        // MIDI may have moved the pedal since the last space press
        self.pedal_latched = self.engine.pedal_state() == PedalState::Down;
    }

    fn status_view(&self) -> StatusView<'_> {
        let notes = self.engine.active_notes();
        StatusView {
            keys: &self.keys,
            pedal: self.engine.pedal_state(),
            active_notes: notes.len(),
            sustained_notes: notes.iter().filter(|n| n.sustained_by_pedal).count(),
            cutoff_hz: self.engine.last_filter_cutoff(),
            midi_port: self.midi_input.as_ref().and_then(|m| m.connected_port_name()),
            backend: &self.backend_label,
            keyboard_label: self.keyboard.status_label(),
            message: self.message.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn runtime() -> Runtime {
        let config = Config::load_from(Path::new("/nonexistent/ivory/config.toml"));
        Runtime::offline(&config)
    }

    fn press(c: char) -> KeyInput {
        KeyInput { key: Key::Char(c), kind: KeyKind::Press, ctrl: false }
    }

    fn release(c: char) -> KeyInput {
        KeyInput { key: Key::Char(c), kind: KeyKind::Release, ctrl: false }
    }

    #[test]
    fn piano_key_plays_and_releases() {
        let mut rt = runtime();
        let t0 = Instant::now();
        assert!(!rt.handle_key(press('a'), t0));
        rt.step(t0);
        let note = rt.engine.note(60).unwrap();
        assert!(note.physically_held);
        assert_eq!(note.velocity, 96);
        assert!(rt.keys.is_pressed(60));

        rt.handle_key(release('a'), t0);
        rt.step(t0);
        assert!(!rt.keys.is_pressed(60));
        assert!(rt.engine.note(60).map_or(true, |n| !n.physically_held));
    }

    #[test]
    fn auto_repeat_does_not_retrigger() {
        let mut rt = runtime();
        let t0 = Instant::now();
        rt.handle_key(press('a'), t0);
        rt.step(t0);
        let voice = rt.engine.note(60).unwrap().voice_id;

        rt.handle_key(press('a'), t0 + Duration::from_millis(50));
        rt.step(t0 + Duration::from_millis(50));
        assert_eq!(rt.engine.note(60).unwrap().voice_id, voice);
    }

    #[test]
    fn silent_key_times_out_into_note_off() {
        let mut rt = runtime();
        let t0 = Instant::now();
        rt.handle_key(press('s'), t0);
        rt.step(t0);
        assert!(rt.keys.is_pressed(62));

        rt.step(t0 + Duration::from_millis(400));
        assert!(!rt.keys.is_pressed(62));
    }

    #[test]
    fn space_toggles_the_pedal() {
        let mut rt = runtime();
        let t0 = Instant::now();
        rt.handle_key(press(' '), t0);
        rt.step(t0);
        assert_eq!(rt.engine.pedal_state(), PedalState::Down);

        rt.handle_key(press(' '), t0);
        rt.step(t0);
        assert_eq!(rt.engine.pedal_state(), PedalState::Up);
    }

    #[test]
    fn octave_keys_shift_the_mapping() {
        let mut rt = runtime();
        let t0 = Instant::now();
        rt.handle_key(press('x'), t0);
        rt.handle_key(press('a'), t0);
        rt.step(t0);
        assert!(rt.engine.note(72).is_some());
    }

    #[test]
    fn escape_panics_and_forgets_held_keys() {
        let mut rt = runtime();
        let t0 = Instant::now();
        rt.handle_key(press('a'), t0);
        rt.handle_key(press('d'), t0);
        rt.step(t0);
        assert_eq!(rt.engine.active_notes().len(), 2);

        rt.handle_key(KeyInput { key: Key::Escape, kind: KeyKind::Press, ctrl: false }, t0);
        rt.step(t0);
        assert!(rt.engine.active_notes().is_empty());
        assert_eq!(rt.keys.pressed_count(), 0);

        // The same key starts a fresh note right away
        rt.handle_key(press('a'), t0);
        rt.step(t0);
        assert!(rt.engine.note(60).is_some());
    }

    #[test]
    fn offline_runtime_has_no_midi_port() {
        let rt = runtime();
        assert!(rt.midi_input.is_none());
        let view = rt.status_view();
        assert_eq!(view.midi_port, None);
        assert_eq!(view.backend, "null");
    }

    #[test]
    fn quit_keys() {
        let mut rt = runtime();
        let t0 = Instant::now();
        assert!(rt.handle_key(press('q'), t0));
        assert!(rt.handle_key(KeyInput { key: Key::Char('c'), kind: KeyKind::Press, ctrl: true }, t0));
    }
}
