//! # ivory-audio
//!
//! Note lifecycle engine for the ivory piano. Turns note-on, note-off and
//! control-change input into voice, filter and key-display calls, and keeps
//! every timed per-note process (envelope bursts, pedal decay, pitch drift)
//! individually cancellable.
//!
//! ## Module Overview
//!
//! - [`formulas`]: pluggable pure formulas (velocity curves, pitch-keyed durations)
//! - [`resolver`]: `resolve_note_parameters()`, settings snapshot to per-note parameters
//! - [`engine`]: `PianoEngine` plus the registry, scheduler, pedal, filter and output parts

pub mod engine;
pub mod formulas;
pub mod resolver;

pub use engine::{OutputAdapter, PianoEngine};
pub use formulas::{Formulas, StandardFormulas};
pub use resolver::resolve_note_parameters;
