use serde::{Deserialize, Serialize};

/// Oscillator timbre class handed to the synthesis engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timbre {
    Soft,
    #[default]
    Medium,
    Loud,
}

impl Timbre {
    pub fn name(self) -> &'static str {
        match self {
            Timbre::Soft => "soft",
            Timbre::Medium => "medium",
            Timbre::Loud => "loud",
        }
    }
}

/// Concrete synthesis parameters for one struck note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteParameters {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    /// Linear amplitude in 0..=1.
    pub amplitude: f32,
    pub timbre: Timbre,
    /// Cutoff in Hz the dynamic filter starts from for this note.
    pub initial_filter_cutoff: f32,
}

/// The timed processes that can be attached to a sounding note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AutomationKind {
    SustainDecay,
    AttackNoise,
    ReleaseTransient,
    PitchDrift,
}

impl AutomationKind {
    /// The secondary voice this automation sounds, if any.
    pub fn transient(self) -> Option<TransientKind> {
        match self {
            AutomationKind::AttackNoise => Some(TransientKind::AttackNoise),
            AutomationKind::ReleaseTransient => Some(TransientKind::Release),
            AutomationKind::SustainDecay | AutomationKind::PitchDrift => None,
        }
    }
}

/// Short secondary voices layered on top of the main voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientKind {
    AttackNoise,
    Release,
}

/// Sustain pedal position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PedalState {
    #[default]
    Up,
    Down,
}
