pub mod piano_keyboard;
pub mod render;
pub mod terminal;

pub use piano_keyboard::{translate_key, PianoKeyboard};
pub use render::{render, StatusView};
pub use terminal::{Key, KeyInput, KeyKind, TerminalHost};
