use std::time::Instant;

use ivory_audio::PianoEngine;
use ivory_types::GlobalSettings;

use crate::input::PianoInput;

/// Route one input onto the engine. Each call runs to completion before the next.
pub fn dispatch_input(
    engine: &mut PianoEngine,
    input: PianoInput,
    settings: &GlobalSettings,
    now: Instant,
) {
    match input {
        PianoInput::NoteOn { note, velocity } => engine.note_on(note, velocity, settings, now),
        PianoInput::NoteOff { note } => engine.note_off(note, settings, now),
        PianoInput::ControlChange { controller, value } => {
            engine.control_change(controller, value, settings);
        }
        PianoInput::Panic => engine.panic(),
    }
}

/// Dispatch a batch in order, then fire any automations that fell due.
pub fn dispatch_all(
    engine: &mut PianoEngine,
    inputs: impl IntoIterator<Item = PianoInput>,
    settings: &GlobalSettings,
    now: Instant,
) -> usize {
    let mut count = 0;
    for input in inputs {
        dispatch_input(engine, input, settings, now);
        count += 1;
    }
    engine.advance_automations(settings, now);
    count
}
