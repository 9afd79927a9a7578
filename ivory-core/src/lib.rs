//! # ivory-core
//!
//! Everything between the outside world and the engine: configuration
//! (embedded defaults plus a user file), MIDI input, the input bus that
//! merges MIDI with computer-keyboard play, and dispatch onto `PianoEngine`.

pub mod config;
pub mod dispatch;
pub mod input;
pub mod midi;

pub use config::Config;
pub use dispatch::{dispatch_all, dispatch_input};
pub use input::{InputBus, InputSender, PianoInput};
pub use midi::MidiInputManager;
